use std::{collections::BTreeMap, fmt, rc::Rc, sync::LazyLock};

use regex::Regex;

use crate::{
    atom::Atom,
    error::{RtResult, RuntimeError},
    string_box::StringBox,
};

pub type Mapping = BTreeMap<String, Value>;

pub type NativeFn = dyn Fn(&[Value]) -> RtResult<Value>;

pub struct NativeFunction {
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> RtResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> RtResult<Value> {
        (self.func)(args)
    }
}

#[derive(Clone)]
pub enum Value {
    Empty,
    Null,
    Bool(bool),
    Number(f64),
    Atom(Atom),
    String(StringBox),
    List(Vec<Value>),
    Object(Mapping),
    Function(Rc<NativeFunction>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Int,
    Float,
    String,
    Bool,
    Atom,
    Empty,
    Function,
    List,
    Object,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Bool => "bool",
            Kind::Atom => "atom",
            Kind::Empty => "empty",
            Kind::Function => "function",
            Kind::List => "list",
            Kind::Object => "object",
        }
    }

    pub fn atom(self) -> Atom {
        Atom::new(self.name())
    }
}

impl Value {
    pub fn string(s: impl AsRef<[u8]>) -> Self {
        Value::String(StringBox::new(s))
    }

    pub fn atom(name: &str) -> Self {
        Value::Atom(Atom::new(name))
    }

    pub fn function(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> RtResult<Value> + 'static,
    ) -> Self {
        Value::Function(Rc::new(NativeFunction::new(name, func)))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> Kind {
        classify(self)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Conditionals in the runtime compare against `true` with `equals`, so
    /// `Empty` counts as true as well.
    pub fn is_true(&self) -> bool {
        equals(self, &Value::Bool(true))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            Value::String(s) => s.value().parse::<usize>().ok(),
            _ => None,
        }
    }

    pub fn call(&self, args: &[Value]) -> RtResult<Value> {
        match self {
            Value::Function(func) => func.call(args),
            other => Err(RuntimeError::NotCallable(other.to_string())),
        }
    }
}

/// Argument at `index`, or Null when the caller passed fewer arguments.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

pub fn classify(value: &Value) -> Kind {
    match value {
        Value::Empty => Kind::Empty,
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(n) => {
            // Integer-ness is derived from the value, there is no boxed int
            if n.is_finite() && n.fract() == 0.0 {
                Kind::Int
            } else {
                Kind::Float
            }
        }
        Value::Atom(_) => Kind::Atom,
        Value::String(_) => Kind::String,
        Value::List(_) => Kind::List,
        Value::Object(_) => Kind::Object,
        Value::Function(_) => Kind::Function,
    }
}

pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Empty, _) | (_, Value::Empty) => true,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,

        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => l == r,
        (Value::Atom(l), Value::Atom(r)) => l.ptr_eq(r),
        (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
        (Value::Bool(_) | Value::Number(_) | Value::Atom(_) | Value::Function(_), _)
        | (_, Value::Bool(_) | Value::Number(_) | Value::Atom(_) | Value::Function(_)) => false,

        (Value::String(l), Value::String(r)) => l == r,
        (Value::String(_), _) | (_, Value::String(_)) => false,

        (Value::List(l), Value::List(r)) => {
            if l.len() != r.len() {
                return false;
            }
            l.iter().zip(r.iter()).all(|(lv, rv)| equals(lv, rv))
        }
        (Value::Object(l), Value::Object(r)) => {
            if l.len() != r.len() {
                return false;
            }
            // Missing keys read as Null on either side
            let null = Value::Null;
            l.iter()
                .all(|(key, lv)| equals(lv, r.get(key).unwrap_or(&null)))
                && r.iter()
                    .filter(|(key, _)| !l.contains_key(*key))
                    .all(|(_, rv)| equals(&null, rv))
        }
        (Value::List(_), Value::Object(_)) | (Value::Object(_), Value::List(_)) => false,
    }
}

pub fn len(value: &Value) -> RtResult<usize> {
    match value {
        Value::String(s) => Ok(s.len()),
        Value::List(items) => Ok(items.len()),
        Value::Object(fields) => Ok(fields.len()),
        other => Err(RuntimeError::type_error(format!(
            "len() takes a string or composite value, but got {}",
            other
        ))),
    }
}

pub fn keys(value: &Value) -> RtResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok((0..items.len()).map(|i| Value::Number(i as f64)).collect()),
        Value::String(s) => Ok((0..s.len()).map(|i| Value::Number(i as f64)).collect()),
        Value::Object(fields) => Ok(fields.keys().map(|k| Value::string(k)).collect()),
        other => Err(RuntimeError::type_error(format!(
            "keys() takes a composite value, but got {}",
            other
        ))),
    }
}

pub fn object_key(key: &Value) -> String {
    match key {
        Value::Atom(atom) => atom.name().to_string(),
        other => other.to_string(),
    }
}

/// Property/index read. Never fails: absent entries read as Null.
pub fn access(target: &Value, key: &Value) -> Value {
    match target {
        Value::String(s) => key
            .as_index()
            .and_then(|i| s.byte_at(i))
            .map(|b| Value::string([b]))
            .unwrap_or(Value::Null),
        Value::List(items) => key
            .as_index()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::Object(fields) => fields.get(&object_key(key)).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Appends to a string (in place, visible to every holder of the box) or a list.
pub fn push(target: Value, item: Value) -> RtResult<Value> {
    match target {
        Value::String(s) => {
            match &item {
                Value::String(tail) => s.push_box(tail),
                other => s.push(other.to_string().as_bytes()),
            }
            Ok(Value::String(s))
        }
        Value::List(mut items) => {
            items.push(item);
            Ok(Value::List(items))
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot push onto {}",
            other
        ))),
    }
}

pub fn assign(target: Value, key: &Value, value: Value) -> RtResult<Value> {
    match target {
        Value::String(s) => {
            let offset = key.as_index().ok_or_else(|| {
                RuntimeError::type_error(format!("string offset must be an integer, got {}", key))
            })?;
            match &value {
                Value::String(replacement) => s.assign(offset, &replacement.bytes()),
                other => s.assign(offset, other.to_string().as_bytes()),
            }
            Ok(Value::String(s))
        }
        Value::Object(mut fields) => {
            if matches!(value, Value::Empty) {
                fields.remove(&object_key(key));
            } else {
                fields.insert(object_key(key), value);
            }
            Ok(Value::Object(fields))
        }
        Value::List(mut items) => {
            let index = key.as_index().ok_or_else(|| {
                RuntimeError::type_error(format!("list index must be an integer, got {}", key))
            })?;
            let value = if matches!(value, Value::Empty) {
                Value::Null
            } else {
                value
            };
            if index >= items.len() {
                items.resize(index, Value::Null);
                items.push(value);
            } else {
                items[index] = value;
            }
            Ok(Value::List(items))
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot assign into {}",
            other
        ))),
    }
}

static INT_LITERAL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[+-]?\d+$").ok());

static FLOAT_LITERAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").ok());

fn is_literal(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

pub fn to_int(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            let rounded = n.floor();
            if *n < 0.0 && n - rounded == 0.5 {
                return Value::Number(rounded + 1.0);
            }
            Value::Number(rounded)
        }
        Value::String(s) => {
            let text = s.value();
            if !is_literal(&INT_LITERAL, &text) {
                return Value::Null;
            }
            text.parse::<f64>().map(Value::Number).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

pub fn to_float(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(*n),
        Value::String(s) => {
            let text = s.value();
            if !is_literal(&FLOAT_LITERAL, &text) {
                return Value::Null;
            }
            text.parse::<f64>().map(Value::Number).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

pub fn to_atom(value: &Value) -> Value {
    match value {
        Value::Atom(_) => value.clone(),
        Value::String(s) => Value::atom(&s.value()),
        other => Value::atom(&other.to_string()),
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

fn nested(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.value().replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Atom(atom) => format!(":{}", atom.name()),
        other => other.to_string(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "_"),
            Value::Null => write!(f, "?"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Atom(atom) => write!(f, "{}", atom.name()),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(nested).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Object(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, nested(value)))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Function(func) => write!(f, "fn {}", func.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "_"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Atom(atom) => write!(f, "{:?}", atom),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => write!(f, "{:?}", items),
            Value::Object(fields) => write!(f, "{:?}", fields),
            Value::Function(func) => write!(f, "<fn {}>", func.name),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(StringBox::from(s))
    }
}

impl From<StringBox> for Value {
    fn from(s: StringBox) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(n as f64)
            }
        }
    };
}

impl_from_integer!(u8);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(usize);

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Atom(atom)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Mapping> for Value {
    fn from(fields: Mapping) -> Self {
        Value::Object(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    #[test]
    fn empty_equals_everything() {
        let samples = vec![
            Value::Null,
            Value::from(0),
            Value::from(""),
            list(vec![]),
            Value::object(Vec::<(String, Value)>::new()),
            Value::atom("x"),
        ];
        for sample in samples {
            assert!(equals(&Value::Empty, &sample));
            assert!(equals(&sample, &Value::Empty));
        }
        assert!(equals(&Value::Empty, &Value::Empty));
    }

    #[test]
    fn null_only_equals_null() {
        assert!(equals(&Value::Null, &Value::Null));
        assert!(!equals(&Value::Null, &Value::from(false)));
        assert!(!equals(&Value::from(0), &Value::Null));
    }

    #[test]
    fn strings_compare_by_content() {
        let a = Value::from("abc");
        let b = Value::from(String::from("abc"));
        assert!(equals(&a, &b));
        assert!(!equals(&a, &Value::from("abd")));
        assert!(!equals(&Value::from("1"), &Value::from(1)));
    }

    #[test]
    fn mutation_changes_equality() {
        let boxed = StringBox::from("ab");
        let a = Value::String(boxed.clone());
        let b = Value::from("abc");
        assert!(!equals(&a, &b));
        boxed.push(b"c");
        assert!(equals(&a, &b));
    }

    #[test]
    fn composites_compare_structurally() {
        let a = list(vec![Value::from(1), list(vec![Value::from("x")])]);
        let b = list(vec![Value::from(1), list(vec![Value::from("x")])]);
        assert!(equals(&a, &b));
        let shorter = list(vec![Value::from(1)]);
        assert!(!equals(&a, &shorter));

        let o1 = Value::object([("name", Value::from("Ann")), ("age", Value::from(30))]);
        let o2 = Value::object([("age", Value::from(30)), ("name", Value::from("Ann"))]);
        assert!(equals(&o1, &o2));
    }

    #[test]
    fn lists_never_equal_objects() {
        let empty_list = list(vec![]);
        let empty_object = Value::object(Vec::<(String, Value)>::new());
        assert!(!equals(&empty_list, &empty_object));
        assert!(!equals(&empty_object, &empty_list));
    }

    #[test]
    fn empty_acts_as_wildcard_inside_lists() {
        let pattern = list(vec![
            Value::from("github.com"),
            Value::Empty,
            Value::Empty,
            Value::from("blob"),
        ]);
        let parts = list(vec![
            Value::from("github.com"),
            Value::from("user"),
            Value::from("repo"),
            Value::from("blob"),
        ]);
        assert!(equals(&parts, &pattern));
    }

    #[test]
    fn functions_compare_by_identity() {
        let f = Value::function("f", |_| Ok(Value::Null));
        let g = Value::function("f", |_| Ok(Value::Null));
        assert!(equals(&f, &f.clone()));
        assert!(!equals(&f, &g));
    }

    #[test]
    fn atoms_are_interned() {
        assert!(equals(&Value::atom("x"), &Value::atom("x")));
        assert!(!equals(&Value::atom("x"), &Value::from("x")));
    }

    #[test]
    fn classify_is_total() {
        assert_eq!(classify(&Value::Null), Kind::Null);
        assert_eq!(classify(&Value::Empty), Kind::Empty);
        assert_eq!(classify(&Value::from(3)), Kind::Int);
        assert_eq!(classify(&Value::from(3.0)), Kind::Int);
        assert_eq!(classify(&Value::from(3.5)), Kind::Float);
        assert_eq!(classify(&Value::Number(f64::NAN)), Kind::Float);
        assert_eq!(classify(&Value::from("s")), Kind::String);
        assert_eq!(classify(&Value::from(true)), Kind::Bool);
        assert_eq!(classify(&Value::atom("a")), Kind::Atom);
        assert_eq!(classify(&list(vec![])), Kind::List);
        assert_eq!(classify(&Value::function("f", |_| Ok(Value::Null))), Kind::Function);
        assert_eq!(Kind::Object.atom(), Atom::new("object"));
    }

    #[test]
    fn len_and_keys_reject_scalars() {
        assert_eq!(len(&Value::from("héllo")).ok(), Some(6));
        assert!(matches!(len(&Value::from(1)), Err(RuntimeError::Type(_))));
        assert!(matches!(keys(&Value::atom("a")), Err(RuntimeError::Type(_))));
        assert!(matches!(keys(&Value::Null), Err(RuntimeError::Type(_))));
        let obj = Value::object([("b", Value::from(1)), ("a", Value::from(2))]);
        let names: Vec<String> = keys(&obj)
            .unwrap_or_default()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn int_conversion_rounding() {
        assert_eq!(to_int(&Value::from(2.7)), Value::from(2));
        assert_eq!(to_int(&Value::from(-2.7)), Value::from(-3));
        assert_eq!(to_int(&Value::from(-2.5)), Value::from(-2));
        assert_eq!(to_int(&Value::from(2.5)), Value::from(2));
    }

    #[test]
    fn numeric_parsing_is_soft() {
        assert_eq!(to_int(&Value::from("42")), Value::from(42));
        assert_eq!(to_int(&Value::from("-7")), Value::from(-7));
        assert!(to_int(&Value::from("4.2")).is_null());
        assert!(to_int(&Value::from("12abc")).is_null());
        assert_eq!(to_float(&Value::from("4.25")), Value::from(4.25));
        assert_eq!(to_float(&Value::from("1e3")), Value::from(1000));
        assert!(to_float(&Value::from("3.5kg")).is_null());
        assert!(to_float(&Value::from("inf")).is_null());
        assert!(to_int(&Value::from(true)).is_null());
    }

    #[test]
    fn access_reads_absent_as_null() {
        let s = Value::from("abc");
        assert_eq!(access(&s, &Value::from(1)), Value::from("b"));
        assert!(access(&s, &Value::from(9)).is_null());
        let xs = list(vec![Value::from(10), Value::from(20)]);
        assert_eq!(access(&xs, &Value::from(1)), Value::from(20));
        assert!(access(&xs, &Value::from(-1)).is_null());
        let obj = Value::object([("name", Value::from("Ann"))]);
        assert_eq!(access(&obj, &Value::atom("name")), Value::from("Ann"));
        assert!(access(&Value::from(5), &Value::from(0)).is_null());
    }

    #[test]
    fn assign_into_each_container() -> RtResult<()> {
        let boxed = StringBox::from("hello");
        let result = assign(Value::String(boxed.clone()), &Value::from(0), Value::from("J"))?;
        assert_eq!(result, Value::from("Jello"));
        assert_eq!(boxed, "Jello");

        let obj = assign(Value::object([("a", Value::from(1))]), &Value::atom("b"), Value::from(2))?;
        assert_eq!(obj, Value::object([("a", Value::from(1)), ("b", Value::from(2))]));
        let obj = assign(obj, &Value::from("a"), Value::Empty)?;
        assert_eq!(len(&obj)?, 1);

        let xs = assign(list(vec![Value::from(1)]), &Value::from(2), Value::from(3))?;
        assert_eq!(xs, list(vec![Value::from(1), Value::Null, Value::from(3)]));
        Ok(())
    }

    #[test]
    fn display_matches_runtime_conventions() {
        let value = Value::object([
            ("b", list(vec![Value::from("x"), Value::atom("ok"), Value::from(1.5)])),
            ("a", Value::Null),
        ]);
        assert_eq!(value.to_string(), "{a: ?, b: ['x', :ok, 1.5]}");
        assert_eq!(Value::from(30).to_string(), "30");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::Empty.to_string(), "_");
    }

    #[test]
    fn calling_a_non_function_fails() {
        let err = Value::from(1).call(&[]);
        assert!(matches!(err, Err(RuntimeError::NotCallable(_))));
    }
}
