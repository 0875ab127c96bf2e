use super::{export, number_or, reexport, text};
use crate::{
    builtins::to_display,
    error::RtResult,
    registry::ModuleRegistry,
    string_box::StringBox,
    trampoline::{resolve_trampoline, trampoline, Bounce},
    value::{arg, Mapping, Value},
};

const WHITESPACE: &[u8] = b" \t\n\r\x0c";

fn between(c: &Value, lo: &[u8], hi: &[u8]) -> bool {
    match c {
        Value::String(s) => s.with_bytes(|bytes| bytes >= lo && bytes <= hi),
        _ => false,
    }
}

pub fn is_upper(c: &Value) -> bool {
    between(c, b"A", b"Z")
}

pub fn is_lower(c: &Value) -> bool {
    between(c, b"a", b"z")
}

pub fn is_digit(c: &Value) -> bool {
    between(c, b"0", b"9")
}

pub fn is_space(c: &Value) -> bool {
    match c {
        Value::String(s) => s.with_bytes(|bytes| matches!(bytes, [b] if WHITESPACE.contains(b))),
        _ => false,
    }
}

pub fn is_letter(c: &Value) -> bool {
    is_upper(c) || is_lower(c)
}

pub fn is_word(c: &Value) -> bool {
    is_letter(c) || is_digit(c)
}

pub fn check_range(lo: f64, hi: f64) -> Value {
    Value::function("checker", move |args| {
        let point = match arg(args, 0) {
            Value::String(s) => s.byte_at(0).map(f64::from),
            _ => None,
        };
        Ok(Value::from(point.is_some_and(|p| lo <= p && p <= hi)))
    })
}

fn matches_at(haystack: &[u8], needle: &[u8], at: usize) -> bool {
    haystack
        .get(at..)
        .is_some_and(|rest| rest.starts_with(needle))
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    resolve_trampoline(
        |i: usize| {
            if matches_at(haystack, needle, i) {
                return Ok(Bounce::Done(Some(i)));
            }
            if i + needle.len() >= haystack.len() {
                return Ok(Bounce::Done(None));
            }
            Ok(trampoline(i + 1))
        },
        0,
    )
    .unwrap_or(None)
}

fn boxed(bytes: impl Into<Vec<u8>>) -> Value {
    Value::String(StringBox::from_bytes(bytes.into()))
}

fn text_bytes(value: &Value) -> Vec<u8> {
    match to_display(value) {
        Value::String(s) => s.bytes(),
        other => other.to_string().into_bytes(),
    }
}

pub fn join(strings: &Value, joiner: &Value) -> RtResult<Value> {
    let joiner = if joiner.is_null() {
        Vec::new()
    } else {
        text("join", joiner)?.bytes()
    };
    let items = match strings {
        Value::List(items) => items,
        other => return Ok(boxed(text_bytes(other))),
    };
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(&joiner);
        }
        out.extend(text_bytes(item));
    }
    Ok(boxed(out))
}

pub fn starts_with(s: &Value, prefix: &Value) -> RtResult<bool> {
    let prefix = text("startsWith?", prefix)?.bytes();
    Ok(text("startsWith?", s)?.with_bytes(|bytes| bytes.starts_with(&prefix)))
}

pub fn ends_with(s: &Value, suffix: &Value) -> RtResult<bool> {
    let suffix = text("endsWith?", suffix)?.bytes();
    Ok(text("endsWith?", s)?.with_bytes(|bytes| bytes.ends_with(&suffix)))
}

/// Byte offset of the first occurrence of `substr`, or -1.
pub fn index_of(s: &Value, substr: &Value) -> RtResult<Value> {
    let needle = text("indexOf", substr)?.bytes();
    let found = text("indexOf", s)?.with_bytes(|bytes| find_bytes(bytes, &needle));
    Ok(found.map(Value::from).unwrap_or(Value::from(-1)))
}

pub fn contains(s: &Value, substr: &Value) -> RtResult<bool> {
    Ok(index_of(s, substr)?.as_number().is_some_and(|i| i >= 0.0))
}

/// Splits around the first `sep`: `[before, after]`, or `[s, ""]` when absent.
pub fn cut(s: &Value, sep: &Value) -> RtResult<Value> {
    let source = text("cut", s)?;
    let sep = text("cut", sep)?.bytes();
    let bytes = source.bytes();
    Ok(match find_bytes(&bytes, &sep) {
        Some(at) => Value::List(vec![
            boxed(&bytes[..at]),
            boxed(&bytes[at + sep.len()..]),
        ]),
        None => Value::List(vec![s.clone(), boxed(Vec::new())]),
    })
}

pub fn lower(s: &Value) -> RtResult<Value> {
    Ok(boxed(text("lower", s)?.bytes().to_ascii_lowercase()))
}

pub fn upper(s: &Value) -> RtResult<Value> {
    Ok(boxed(text("upper", s)?.bytes().to_ascii_uppercase()))
}

/// Replaces every literal occurrence of `old`, left to right. Inserted
/// text is never rescanned.
pub fn replace(s: &Value, old: &Value, new: &Value) -> RtResult<Value> {
    let old = text("replace", old)?.bytes();
    if old.is_empty() {
        return Ok(s.clone());
    }
    let new = text("replace", new)?.bytes();
    let source = text("replace", s)?.bytes();
    resolve_trampoline(
        |(mut acc, i): (Vec<u8>, usize)| {
            if i >= source.len() {
                return Ok(Bounce::Done(boxed(acc)));
            }
            if matches_at(&source, &old, i) {
                acc.extend_from_slice(&new);
                return Ok(trampoline((acc, i + old.len())));
            }
            acc.push(source[i]);
            Ok(trampoline((acc, i + 1)))
        },
        (Vec::new(), 0),
    )
}

/// Null or `""` as separator splits into single bytes.
pub fn split(s: &Value, sep: &Value) -> RtResult<Value> {
    let source = text("split", s)?.bytes();
    let sep = if sep.is_null() {
        Vec::new()
    } else {
        text("split", sep)?.bytes()
    };
    if sep.is_empty() {
        return Ok(Value::List(source.iter().map(|&b| boxed(vec![b])).collect()));
    }
    resolve_trampoline(
        |(mut parts, i, last): (Vec<Value>, usize, usize)| {
            if matches_at(&source, &sep, i) {
                parts.push(boxed(&source[last..i]));
                return Ok(trampoline((parts, i + sep.len(), i + sep.len())));
            }
            if i < source.len() {
                return Ok(trampoline((parts, i + 1, last)));
            }
            parts.push(boxed(&source[last..]));
            Ok(Bounce::Done(Value::List(parts)))
        },
        (Vec::new(), 0, 0),
    )
}

fn extend(pad: &[u8], n: usize) -> Vec<u8> {
    pad.iter().copied().cycle().take(n).collect()
}

fn pad_width(name: &str, s: &Value, n: &Value, pad: &Value) -> RtResult<Option<(Vec<u8>, Vec<u8>)>> {
    let source = text(name, s)?.bytes();
    let width = number_or(name, n, 0.0)?;
    let pad = text(name, pad)?.bytes();
    if !width.is_finite() || pad.is_empty() {
        return Ok(None);
    }
    let Some(missing) = (width as usize).checked_sub(source.len()).filter(|&n| n > 0) else {
        return Ok(None);
    };
    let fill = extend(&pad, missing);
    Ok(Some((source, fill)))
}

pub fn pad_start(s: &Value, n: &Value, pad: &Value) -> RtResult<Value> {
    Ok(match pad_width("padStart", s, n, pad)? {
        Some((source, mut fill)) => {
            fill.extend(source);
            boxed(fill)
        }
        None => s.clone(),
    })
}

pub fn pad_end(s: &Value, n: &Value, pad: &Value) -> RtResult<Value> {
    Ok(match pad_width("padEnd", s, n, pad)? {
        Some((mut source, fill)) => {
            source.extend(fill);
            boxed(source)
        }
        None => s.clone(),
    })
}

fn strip_start(bytes: &[u8], prefix: Option<&[u8]>) -> usize {
    resolve_trampoline(
        |i: usize| {
            let more = match prefix {
                None => bytes.get(i).is_some_and(|b| WHITESPACE.contains(b)),
                Some(prefix) => i < bytes.len() && matches_at(bytes, prefix, i),
            };
            if !more {
                return Ok(Bounce::Done(i));
            }
            Ok(trampoline(i + prefix.map_or(1, <[u8]>::len)))
        },
        0,
    )
    .unwrap_or(0)
}

fn strip_end(bytes: &[u8], suffix: Option<&[u8]>) -> usize {
    resolve_trampoline(
        |end: usize| {
            let step = suffix.map_or(1, <[u8]>::len);
            let more = end >= step
                && match suffix {
                    None => WHITESPACE.contains(&bytes[end - 1]),
                    Some(suffix) => bytes[..end].ends_with(suffix),
                };
            if !more {
                return Ok(Bounce::Done(end));
            }
            Ok(trampoline(end - step))
        },
        bytes.len(),
    )
    .unwrap_or(bytes.len())
}

enum Trim {
    Unchanged,
    Whitespace,
    Literal(Vec<u8>),
}

fn trim_part(name: &str, part: &Value) -> RtResult<Trim> {
    if part.is_null() {
        return Ok(Trim::Whitespace);
    }
    let part = text(name, part)?.bytes();
    Ok(if part.is_empty() {
        Trim::Unchanged
    } else {
        Trim::Literal(part)
    })
}

/// Removes leading whitespace (Null part) or repeated leading `part`.
pub fn trim_start(s: &Value, part: &Value) -> RtResult<Value> {
    let source = text("trimStart", s)?.bytes();
    let start = match trim_part("trimStart", part)? {
        Trim::Unchanged => return Ok(s.clone()),
        Trim::Whitespace => strip_start(&source, None),
        Trim::Literal(prefix) => strip_start(&source, Some(&prefix)),
    };
    Ok(boxed(&source[start..]))
}

pub fn trim_end(s: &Value, part: &Value) -> RtResult<Value> {
    let source = text("trimEnd", s)?.bytes();
    let end = match trim_part("trimEnd", part)? {
        Trim::Unchanged => return Ok(s.clone()),
        Trim::Whitespace => strip_end(&source, None),
        Trim::Literal(suffix) => strip_end(&source, Some(&suffix)),
    };
    Ok(boxed(&source[..end]))
}

pub fn trim(s: &Value, part: &Value) -> RtResult<Value> {
    trim_end(&trim_start(s, part)?, part)
}

pub fn exports(registry: &ModuleRegistry) -> RtResult<Mapping> {
    let std = registry.import("std")?;
    let mut exports = Mapping::new();
    reexport(&mut exports, &std, "std", &["default", "slice", "take", "takeLast", "reduce"])?;

    export(&mut exports, "upper?", |args| Ok(Value::from(is_upper(&arg(args, 0)))));
    export(&mut exports, "lower?", |args| Ok(Value::from(is_lower(&arg(args, 0)))));
    export(&mut exports, "digit?", |args| Ok(Value::from(is_digit(&arg(args, 0)))));
    export(&mut exports, "space?", |args| Ok(Value::from(is_space(&arg(args, 0)))));
    export(&mut exports, "letter?", |args| Ok(Value::from(is_letter(&arg(args, 0)))));
    export(&mut exports, "word?", |args| Ok(Value::from(is_word(&arg(args, 0)))));
    export(&mut exports, "checkRange", |args| {
        let lo = number_or("checkRange", &arg(args, 0), 0.0)?;
        let hi = number_or("checkRange", &arg(args, 1), 0.0)?;
        Ok(check_range(lo, hi))
    });
    export(&mut exports, "join", |args| join(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "startsWith?", |args| {
        starts_with(&arg(args, 0), &arg(args, 1)).map(Value::from)
    });
    export(&mut exports, "endsWith?", |args| {
        ends_with(&arg(args, 0), &arg(args, 1)).map(Value::from)
    });
    export(&mut exports, "indexOf", |args| index_of(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "contains?", |args| {
        contains(&arg(args, 0), &arg(args, 1)).map(Value::from)
    });
    export(&mut exports, "cut", |args| cut(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "lower", |args| lower(&arg(args, 0)));
    export(&mut exports, "upper", |args| upper(&arg(args, 0)));
    export(&mut exports, "replace", |args| {
        replace(&arg(args, 0), &arg(args, 1), &arg(args, 2))
    });
    export(&mut exports, "split", |args| split(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "padStart", |args| {
        pad_start(&arg(args, 0), &arg(args, 1), &arg(args, 2))
    });
    export(&mut exports, "padEnd", |args| {
        pad_end(&arg(args, 0), &arg(args, 1), &arg(args, 2))
    });
    export(&mut exports, "trimStart", |args| trim_start(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "trimEnd", |args| trim_end(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "trim", |args| trim(&arg(args, 0), &arg(args, 1)));
    Ok(exports)
}
