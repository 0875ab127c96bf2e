use super::{export, reexport, text};
use crate::{
    builtins::to_display,
    error::RtResult,
    registry::ModuleRegistry,
    string_box::StringBox,
    trampoline::{resolve_trampoline, trampoline, Bounce},
    value::{access, arg, to_int, Mapping, Value},
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Literal,
    SawOpenBrace,
    InsideKey,
    AwaitingCloseBrace,
}

struct Scan {
    state: State,
    key: Vec<u8>,
    out: Vec<u8>,
}

fn interpolate(key: &[u8], values: &[Value]) -> Vec<u8> {
    if key.is_empty() {
        return Vec::new();
    }
    let key = Value::String(StringBox::new(key));
    let (keyed, positional) = match values.split_first() {
        Some((first @ Value::Object(_), rest)) => (first.clone(), rest),
        Some((first, _)) => (first.clone(), values),
        None => (Value::Object(Mapping::new()), values),
    };
    let found = match to_int(&key) {
        Value::Null => access(&keyed, &key),
        index => access(&Value::List(positional.to_vec()), &index),
    };
    if found.is_null() {
        return Vec::new();
    }
    match to_display(&found) {
        Value::String(s) => s.bytes(),
        other => other.to_string().into_bytes(),
    }
}

/// Renders `{{ key }}` placeholders. A numeric key picks a positional value,
/// any other key is looked up in the first value. When that first value is
/// an object, positions count from the value after it. Missing values and
/// empty keys render as nothing.
pub fn format(template: &StringBox, values: &[Value]) -> RtResult<Value> {
    let raw = template.bytes();
    let start = Scan {
        state: State::Literal,
        key: Vec::new(),
        out: Vec::new(),
    };
    resolve_trampoline(
        |(mut scan, i): (Scan, usize)| {
            let Some(&c) = raw.get(i) else {
                if scan.state == State::SawOpenBrace {
                    scan.out.push(b'{');
                }
                return Ok(Bounce::Done(Value::String(StringBox::from_bytes(scan.out))));
            };
            match (scan.state, c) {
                (State::Literal, b'{') => scan.state = State::SawOpenBrace,
                (State::Literal, _) => scan.out.push(c),
                (State::SawOpenBrace, b'{') => scan.state = State::InsideKey,
                (State::SawOpenBrace, _) => {
                    scan.out.extend_from_slice(&[b'{', c]);
                    scan.state = State::Literal;
                }
                (State::InsideKey, b'}') => {
                    let rendered = interpolate(&scan.key, values);
                    scan.out.extend(rendered);
                    scan.key.clear();
                    scan.state = State::AwaitingCloseBrace;
                }
                (State::InsideKey, b' ' | b'\t') => {}
                (State::InsideKey, _) => scan.key.push(c),
                (State::AwaitingCloseBrace, b'}') => scan.state = State::Literal,
                (State::AwaitingCloseBrace, _) => {}
            }
            Ok(trampoline((scan, i + 1)))
        },
        (start, 0),
    )
}

pub fn exports(registry: &ModuleRegistry) -> RtResult<Mapping> {
    let std = registry.import("std")?;
    let mut exports = Mapping::new();
    reexport(&mut exports, &std, "std", &["default", "println"])?;

    export(&mut exports, "format", |args| {
        format(&text("format", &arg(args, 0))?, args.get(1..).unwrap_or(&[]))
    });
    let println = std.get("println").cloned().unwrap_or(Value::Null);
    export(&mut exports, "printf", move |args| {
        let line = format(&text("printf", &arg(args, 0))?, args.get(1..).unwrap_or(&[]))?;
        println.call(&[line])
    });
    Ok(exports)
}
