use std::{cell::RefCell, collections::HashSet, fmt, rc::Rc};

thread_local! {
    static ATOM_TABLE: RefCell<HashSet<Rc<str>>> = RefCell::new(HashSet::new());
}

/// Interned symbolic constant. Two atoms with the same name share one
/// allocation, so equality is a pointer comparison.
#[derive(Clone)]
pub struct Atom(Rc<str>);

impl Atom {
    pub fn new(name: &str) -> Self {
        ATOM_TABLE.with(|table| {
            let mut table = table.borrow_mut();
            if let Some(existing) = table.get(name) {
                return Atom(Rc::clone(existing));
            }
            let interned: Rc<str> = Rc::from(name);
            table.insert(Rc::clone(&interned));
            Atom(interned)
        })
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Atom) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Atom {}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
