pub mod collections;
pub mod format;
pub mod strings;

use std::rc::Rc;

use crate::{
    builtins::Host,
    error::{RtResult, RuntimeError},
    registry::ModuleRegistry,
    string_box::StringBox,
    value::{access, arg, Kind, Mapping, Value},
};

/// Registers the lazy `std`, `str` and `fmt` module factories.
pub fn register_all(registry: &ModuleRegistry, host: &Rc<Host>) {
    let std_host = Rc::clone(host);
    registry.register("std", move |_| Ok(collections::exports(&std_host)));
    registry.register("str", strings::exports);
    registry.register("fmt", format::exports);
}

pub(crate) fn export(
    exports: &mut Mapping,
    name: &str,
    func: impl Fn(&[Value]) -> RtResult<Value> + 'static,
) {
    exports.insert(name.to_string(), Value::function(name, func));
}

/// Copies `names` out of another module's exports, failing if one is missing.
pub(crate) fn reexport(exports: &mut Mapping, from: &Mapping, module: &str, names: &[&str]) -> RtResult<()> {
    for name in names {
        let item = from.get(*name).cloned().ok_or_else(|| {
            RuntimeError::type_error(format!("module {} has no export {}", module, name))
        })?;
        exports.insert(name.to_string(), item);
    }
    Ok(())
}

/// Fresh container of the same kind as `xs`.
pub(crate) fn empty_like(xs: &Value) -> Value {
    match xs {
        Value::String(_) => Value::String(StringBox::default()),
        Value::List(_) => Value::List(Vec::new()),
        Value::Object(_) => Value::Object(Mapping::new()),
        _ => Value::Null,
    }
}

/// Atoms, strings and integers become property/index accessors.
pub(crate) fn as_predicate(pred: &Value) -> Value {
    match pred.kind() {
        Kind::Atom | Kind::String | Kind::Int => {
            let key = pred.clone();
            Value::function(format!("accessor {}", key), move |args| {
                Ok(access(&arg(args, 0), &key))
            })
        }
        _ => pred.clone(),
    }
}

pub(crate) fn number_or(name: &str, value: &Value, fallback: f64) -> RtResult<f64> {
    match value {
        Value::Null => Ok(fallback),
        Value::Number(n) => Ok(*n),
        other => Err(RuntimeError::type_error(format!(
            "{}() takes a number, but got {}",
            name, other
        ))),
    }
}

pub(crate) fn text(name: &str, value: &Value) -> RtResult<StringBox> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(RuntimeError::type_error(format!(
            "{}() takes a string, but got {}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_from_keys() -> RtResult<()> {
        let person = Value::object([("name", Value::from("Ann"))]);
        assert_eq!(as_predicate(&Value::atom("name")).call(&[person.clone()])?, Value::from("Ann"));
        assert_eq!(as_predicate(&Value::from("name")).call(&[person])?, Value::from("Ann"));
        let pair = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(as_predicate(&Value::from(1)).call(&[pair])?, Value::from("b"));
        Ok(())
    }

    #[test]
    fn empty_like_keeps_kind() {
        assert_eq!(empty_like(&Value::from("abc")).kind(), Kind::String);
        assert_eq!(empty_like(&Value::List(vec![Value::from(1)])).kind(), Kind::List);
        assert!(empty_like(&Value::from(1)).is_null());
    }
}
