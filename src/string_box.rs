use std::{cell::RefCell, fmt, rc::Rc};

/// Shared, mutable byte string. Clones share the same backing buffer, so a
/// mutation through one handle is visible through every other handle.
/// Equality is by content, never by identity.
#[derive(Clone, Default)]
pub struct StringBox(Rc<RefCell<Vec<u8>>>);

impl StringBox {
    pub fn new(content: impl AsRef<[u8]>) -> Self {
        Self::from_bytes(content.as_ref().to_vec())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        StringBox(Rc::new(RefCell::new(bytes)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Writes `replacement` at byte `offset`. At (or past) the end this appends;
    /// otherwise it overwrites `[offset, offset + replacement.len())`, growing
    /// the string when the write runs past the current end.
    pub fn assign(&self, offset: usize, replacement: &[u8]) {
        let mut bytes = self.0.borrow_mut();
        if offset >= bytes.len() {
            bytes.extend_from_slice(replacement);
            return;
        }
        let end = (offset + replacement.len()).min(bytes.len());
        bytes.splice(offset..end, replacement.iter().copied());
    }

    pub fn push(&self, suffix: &[u8]) {
        self.0.borrow_mut().extend_from_slice(suffix);
    }

    pub fn push_box(&self, suffix: &StringBox) {
        // Pushing a box onto itself must not hold two borrows at once
        let tail = suffix.bytes();
        self.push(&tail);
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.borrow())
    }

    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.0.borrow().get(index).copied()
    }

    pub fn slice(&self, start: usize, end: usize) -> StringBox {
        let bytes = self.0.borrow();
        let end = end.min(bytes.len());
        let start = start.min(end);
        StringBox::new(&bytes[start..end])
    }

    /// Identity comparison, independent of content.
    pub fn ptr_eq(&self, other: &StringBox) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Materialises a snapshot of the current content.
    pub fn value(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl PartialEq for StringBox {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.borrow() == *other.0.borrow()
    }
}

impl PartialEq<str> for StringBox {
    fn eq(&self, other: &str) -> bool {
        self.0.borrow().as_slice() == other.as_bytes()
    }
}

impl PartialEq<&str> for StringBox {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl From<&str> for StringBox {
    fn from(s: &str) -> Self {
        StringBox::new(s)
    }
}

impl From<String> for StringBox {
    fn from(s: String) -> Self {
        StringBox::from_bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for StringBox {
    fn from(bytes: Vec<u8>) -> Self {
        StringBox::from_bytes(bytes)
    }
}

impl fmt::Display for StringBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0.borrow()))
    }
}

impl fmt::Debug for StringBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0.borrow()))
    }
}
