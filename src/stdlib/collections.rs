use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use log::trace;

use super::{as_predicate, empty_like, export, number_or, text};
use crate::{
    builtins::{to_display, Host},
    error::{RtResult, RuntimeError},
    event_loop::EventLoop,
    string_box::StringBox,
    trampoline::{resolve_trampoline, trampoline, Bounce},
    value::{self, access, arg, assign, equals, push, Kind, Mapping, Value},
};

pub fn default(x: &Value, base: &Value) -> Value {
    if x.is_null() {
        base.clone()
    } else {
        x.clone()
    }
}

pub fn clamp_range(min: f64, max: f64, n: f64, m: f64) -> (f64, f64) {
    let n = if n < min { min } else { n };
    let m = if m < min { min } else { m };
    let m = if m > max { max } else { m };
    let n = if n > m { m } else { n };
    (n, m)
}

pub fn slice(xs: &Value, min: &Value, max: &Value) -> RtResult<Value> {
    let length = value::len(xs)? as f64;
    let min = number_or("slice", min, 0.0)?;
    let max = number_or("slice", max, length)?;
    let (start, end) = clamp_range(0.0, length, min, max);
    let end = end as usize;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i >= end {
                return Ok(Bounce::Done(acc));
            }
            let item = access(xs, &Value::from(i));
            Ok(trampoline((push(acc, item)?, i + 1)))
        },
        (empty_like(xs), start as usize),
    )
}

pub fn clone(x: &Value) -> Value {
    match x {
        Value::String(s) => Value::String(StringBox::from_bytes(s.bytes())),
        other => other.clone(),
    }
}

pub fn range(start: &Value, end: &Value, step: &Value) -> RtResult<Value> {
    let step = number_or("range", step, 1.0)?;
    let (start, end) = if end.is_null() {
        (0.0, number_or("range", start, 0.0)?)
    } else {
        (number_or("range", start, 0.0)?, number_or("range", end, 0.0)?)
    };
    if step == 0.0 || step.is_nan() {
        return Ok(Value::List(Vec::new()));
    }
    resolve_trampoline(
        |(mut list, n): (Vec<Value>, f64)| {
            let more = if step > 0.0 { n < end } else { n > end };
            if !more {
                return Ok(Bounce::Done(Value::List(list)));
            }
            list.push(Value::from(n));
            Ok(trampoline((list, n + step)))
        },
        (Vec::new(), start),
    )
}

pub fn reverse(xs: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i == 0 {
                return Ok(Bounce::Done(acc));
            }
            let item = access(xs, &Value::from(i - 1));
            Ok(trampoline((push(acc, item)?, i - 1)))
        },
        (empty_like(xs), length),
    )
}

pub fn map(xs: &Value, f: &Value) -> RtResult<Value> {
    let f = as_predicate(f);
    let length = value::len(xs)?;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i == length {
                return Ok(Bounce::Done(acc));
            }
            let mapped = f.call(&[access(xs, &Value::from(i)), Value::from(i)])?;
            Ok(trampoline((push(acc, mapped)?, i + 1)))
        },
        (empty_like(xs), 0),
    )
}

pub fn each(xs: &Value, f: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |i: usize| {
            if i == length {
                return Ok(Bounce::Done(Value::Null));
            }
            f.call(&[access(xs, &Value::from(i)), Value::from(i)])?;
            Ok(trampoline(i + 1))
        },
        0,
    )
}

pub fn filter(xs: &Value, f: &Value) -> RtResult<Value> {
    let f = as_predicate(f);
    let length = value::len(xs)?;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i == length {
                return Ok(Bounce::Done(acc));
            }
            let x = access(xs, &Value::from(i));
            let acc = if f.call(&[x.clone(), Value::from(i)])?.is_true() {
                push(acc, x)?
            } else {
                acc
            };
            Ok(trampoline((acc, i + 1)))
        },
        (empty_like(xs), 0),
    )
}

/// Strict left-to-right fold; `f` receives `(acc, x, i)`.
pub fn reduce(xs: &Value, seed: &Value, f: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i == length {
                return Ok(Bounce::Done(acc));
            }
            let next = f.call(&[acc, access(xs, &Value::from(i)), Value::from(i)])?;
            Ok(trampoline((next, i + 1)))
        },
        (seed.clone(), 0),
    )
}

/// Returns a new container holding `xs` followed by the items of `ys`.
pub fn append(xs: &Value, ys: &Value) -> RtResult<Value> {
    extend(clone(xs), ys)
}

fn extend(acc: Value, ys: &Value) -> RtResult<Value> {
    let length = value::len(ys)?;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i == length {
                return Ok(Bounce::Done(acc));
            }
            Ok(trampoline((push(acc, access(ys, &Value::from(i)))?, i + 1)))
        },
        (acc, 0),
    )
}

pub fn flatten(xs: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |(acc, i): (Value, usize)| {
            if i == length {
                return Ok(Bounce::Done(acc));
            }
            Ok(trampoline((extend(acc, &access(xs, &Value::from(i)))?, i + 1)))
        },
        (Value::List(Vec::new()), 0),
    )
}

pub fn compact(xs: &Value) -> RtResult<Value> {
    let present = Value::function("present?", |args| Ok(Value::from(!arg(args, 0).is_null())));
    filter(xs, &present)
}

fn any_or_all(xs: &Value, pred: &Value, want: bool) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |i: usize| {
            if i == length {
                return Ok(Bounce::Done(Value::from(!want)));
            }
            let x = access(xs, &Value::from(i));
            let hit = if pred.is_null() {
                x.is_true()
            } else {
                pred.call(&[x, Value::from(i)])?.is_true()
            };
            if hit == want {
                return Ok(Bounce::Done(Value::from(want)));
            }
            Ok(trampoline(i + 1))
        },
        0,
    )
}

pub fn some(xs: &Value, pred: &Value) -> RtResult<Value> {
    any_or_all(xs, pred, true)
}

pub fn every(xs: &Value, pred: &Value) -> RtResult<Value> {
    any_or_all(xs, pred, false)
}

pub fn zip(xs: &Value, ys: &Value, zipper: &Value) -> RtResult<Value> {
    let max = value::len(xs)?.min(value::len(ys)?);
    resolve_trampoline(
        |(mut acc, i): (Vec<Value>, usize)| {
            if i == max {
                return Ok(Bounce::Done(Value::List(acc)));
            }
            let x = access(xs, &Value::from(i));
            let y = access(ys, &Value::from(i));
            acc.push(if zipper.is_null() {
                Value::List(vec![x, y])
            } else {
                zipper.call(&[x, y, Value::from(i)])?
            });
            Ok(trampoline((acc, i + 1)))
        },
        (Vec::new(), 0),
    )
}

pub fn partition(xs: &Value, by: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    match by.kind() {
        Kind::Int => {
            let size = by.as_number().unwrap_or(0.0);
            if size < 1.0 {
                return Err(RuntimeError::type_error(format!(
                    "partition() size must be positive, got {}",
                    by
                )));
            }
            let size = size as usize;
            resolve_trampoline(
                |(mut groups, i): (Vec<Vec<Value>>, usize)| {
                    if i == length {
                        return Ok(Bounce::Done(Value::from(groups)));
                    }
                    let x = access(xs, &Value::from(i));
                    match groups.last_mut() {
                        Some(group) if i % size != 0 => group.push(x),
                        _ => groups.push(vec![x]),
                    }
                    Ok(trampoline((groups, i + 1)))
                },
                (Vec::new(), 0),
            )
        }
        Kind::Function => resolve_trampoline(
            |(mut groups, last, i): (Vec<Vec<Value>>, Option<Value>, usize)| {
                if i == length {
                    return Ok(Bounce::Done(Value::from(groups)));
                }
                let x = access(xs, &Value::from(i));
                let key = by.call(&[x.clone()])?;
                let same_run = last.as_ref().is_some_and(|last| equals(&key, last));
                match groups.last_mut() {
                    Some(group) if same_run => group.push(x),
                    _ => groups.push(vec![x]),
                }
                Ok(trampoline((groups, Some(key), i + 1)))
            },
            (Vec::new(), None, 0),
        ),
        _ => Ok(Value::Null),
    }
}

/// Drops consecutive items whose keys repeat; non-adjacent repeats stay.
pub fn uniq(xs: &Value, pred: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |(acc, last, i): (Value, Option<Value>, usize)| {
            if i == length {
                return Ok(Bounce::Done(acc));
            }
            let x = access(xs, &Value::from(i));
            let key = if pred.is_null() {
                x.clone()
            } else {
                pred.call(&[x.clone()])?
            };
            if last.as_ref().is_some_and(|last| equals(&key, last)) {
                return Ok(trampoline((acc, last, i + 1)));
            }
            Ok(trampoline((push(acc, x)?, Some(key), i + 1)))
        },
        (empty_like(xs), None, 0),
    )
}

pub fn first(xs: &Value) -> Value {
    access(xs, &Value::from(0))
}

pub fn last(xs: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    if length == 0 {
        return Ok(Value::Null);
    }
    Ok(access(xs, &Value::from(length - 1)))
}

pub fn take(xs: &Value, n: &Value) -> RtResult<Value> {
    slice(xs, &Value::from(0), n)
}

pub fn take_last(xs: &Value, n: &Value) -> RtResult<Value> {
    let length = value::len(xs)? as f64;
    let n = number_or("takeLast", n, 0.0)?;
    slice(xs, &Value::from(length - n), &Value::Null)
}

/// Index of the first item satisfying `pred`, or -1.
pub fn find(xs: &Value, pred: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |i: usize| {
            if i == length {
                return Ok(Bounce::Done(Value::from(-1)));
            }
            if pred.call(&[access(xs, &Value::from(i))])?.is_true() {
                return Ok(Bounce::Done(Value::from(i)));
            }
            Ok(trampoline(i + 1))
        },
        0,
    )
}

pub fn index_of(xs: &Value, x: &Value) -> RtResult<Value> {
    let length = value::len(xs)?;
    resolve_trampoline(
        |i: usize| {
            if i == length {
                return Ok(Bounce::Done(Value::from(-1)));
            }
            if equals(&access(xs, &Value::from(i)), x) {
                return Ok(Bounce::Done(Value::from(i)));
            }
            Ok(trampoline(i + 1))
        },
        0,
    )
}

pub fn contains(xs: &Value, x: &Value) -> RtResult<Value> {
    let index = index_of(xs, x)?.as_number().unwrap_or(-1.0);
    Ok(Value::from(index > -1.0))
}

pub fn values(obj: &Value) -> RtResult<Value> {
    Ok(Value::List(
        value::keys(obj)?.iter().map(|key| access(obj, key)).collect(),
    ))
}

pub fn entries(obj: &Value) -> RtResult<Value> {
    Ok(Value::List(
        value::keys(obj)?
            .into_iter()
            .map(|key| {
                let item = access(obj, &key);
                Value::List(vec![key, item])
            })
            .collect(),
    ))
}

/// Later objects' keys win. Null when called with nothing.
pub fn merge(objects: &[Value]) -> RtResult<Value> {
    let Some((base, rest)) = objects.split_first() else {
        return Ok(Value::Null);
    };
    rest.iter().try_fold(base.clone(), |acc, o| {
        value::keys(o)?
            .iter()
            .try_fold(acc, |root, key| assign(root, key, access(o, key)))
    })
}

pub fn once(f: &Value) -> Value {
    let f = f.clone();
    let called = Cell::new(false);
    Value::function("once", move |args| {
        if called.replace(true) {
            return Ok(Value::Null);
        }
        f.call(args)
    })
}

/// Calls `f(count, breaker)` until `count` reaches `max` or `breaker(x)` is
/// called; returns `x`. A negative or absent `max` loops until broken.
pub fn run_loop(max: &Value, f: &Value) -> RtResult<Value> {
    let (max, f) = if f.is_null() {
        (Value::from(-1), max.clone())
    } else {
        (max.clone(), f.clone())
    };
    let max = number_or("loop", &max, -1.0)?;
    let broken: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let signal = Rc::clone(&broken);
    let breaker = Value::function("break", move |args| {
        *signal.borrow_mut() = Some(arg(args, 0));
        Ok(Value::Null)
    });
    resolve_trampoline(
        |count: f64| {
            if let Some(result) = broken.borrow_mut().take() {
                return Ok(Bounce::Done(result));
            }
            if count == max {
                return Ok(Bounce::Done(Value::Null));
            }
            f.call(&[Value::from(count), breaker.clone()])?;
            Ok(trampoline(count + 1.0))
        },
        0.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceMode {
    Leading,
    Trailing,
}

struct DebounceState {
    args: RefCell<Vec<Value>>,
    waiting: Cell<bool>,
    target: Cell<f64>,
}

/// Rate-limits `f` to one call per `duration` seconds on `events`.
/// While a call is pending, further calls only replace its arguments.
pub fn debounce(events: &Rc<EventLoop>, duration: f64, mode: DebounceMode, f: Value) -> Value {
    let state = Rc::new(DebounceState {
        args: RefCell::new(Vec::new()),
        waiting: Cell::new(false),
        target: Cell::new(events.now() - duration),
    });
    let events = Rc::clone(events);
    Value::function("debounced", move |args| {
        let called_at = events.now();
        *state.args.borrow_mut() = args.to_vec();
        if state.waiting.get() {
            return Ok(Value::Null);
        }

        let fire = {
            let state = Rc::clone(&state);
            let f = f.clone();
            move || {
                state.waiting.set(false);
                let args = state.args.borrow().clone();
                f.call(&args).map(|_| ())
            }
        };

        if state.target.get() <= called_at {
            state.target.set(called_at + duration);
            match mode {
                DebounceMode::Leading => {
                    let args = state.args.borrow().clone();
                    return f.call(&args);
                }
                DebounceMode::Trailing => {
                    state.waiting.set(true);
                    trace!("debounce: trailing call in {:.3}s", duration);
                    events.schedule(state.target.get() - events.now(), fire);
                }
            }
        } else {
            state.waiting.set(true);
            let timeout = state.target.get() - called_at;
            state.target.set(state.target.get() + duration);
            trace!("debounce: deferred call in {:.3}s", timeout);
            events.schedule(timeout, fire);
        }
        Ok(Value::Null)
    })
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

pub fn to_hex(n: &Value) -> RtResult<Value> {
    let n = value::to_int(n)
        .as_number()
        .ok_or_else(|| RuntimeError::type_error(format!("toHex() takes a number, but got {}", n)))?;
    let mut p = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        digits.push(HEX_DIGITS[(p % 16) as usize]);
        p /= 16;
        if p == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push(b'-');
    }
    digits.reverse();
    Ok(Value::String(StringBox::from_bytes(digits)))
}

/// Parses hex digits of either case; Null on any other byte.
pub fn from_hex(s: &Value) -> RtResult<Value> {
    let s = text("fromHex", s)?;
    let digits = s.bytes();
    resolve_trampoline(
        |(i, acc): (usize, f64)| {
            let Some(&byte) = digits.get(i) else {
                return Ok(Bounce::Done(Value::from(acc)));
            };
            match (byte as char).to_digit(16) {
                Some(next) => Ok(trampoline((i + 1, acc * 16.0 + next as f64))),
                None => Ok(Bounce::Done(Value::Null)),
            }
        },
        (0, 0.0),
    )
}

pub fn println(host: &Host, items: &[Value]) -> RtResult<Value> {
    let mut line = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            line.push(b' ');
        }
        match to_display(item) {
            Value::String(s) => line.extend(s.bytes()),
            other => line.extend(other.to_string().into_bytes()),
        }
    }
    line.push(b'\n');
    Ok(Value::from(host.print(&line)?))
}

pub fn exports(host: &Rc<Host>) -> Mapping {
    let mut exports = Mapping::new();
    export(&mut exports, "identity", |args| Ok(arg(args, 0)));
    export(&mut exports, "default", |args| Ok(default(&arg(args, 0), &arg(args, 1))));
    export(&mut exports, "clamp", |args| {
        let mut bounds = [0.0; 4];
        for (i, bound) in bounds.iter_mut().enumerate() {
            *bound = number_or("clamp", &arg(args, i), 0.0)?;
        }
        let (n, m) = clamp_range(bounds[0], bounds[1], bounds[2], bounds[3]);
        Ok(Value::List(vec![Value::from(n), Value::from(m)]))
    });
    export(&mut exports, "slice", |args| slice(&arg(args, 0), &arg(args, 1), &arg(args, 2)));
    export(&mut exports, "clone", |args| Ok(clone(&arg(args, 0))));
    export(&mut exports, "range", |args| range(&arg(args, 0), &arg(args, 1), &arg(args, 2)));
    export(&mut exports, "reverse", |args| reverse(&arg(args, 0)));
    export(&mut exports, "map", |args| map(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "each", |args| each(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "filter", |args| filter(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "reduce", |args| reduce(&arg(args, 0), &arg(args, 1), &arg(args, 2)));
    export(&mut exports, "flatten", |args| flatten(&arg(args, 0)));
    export(&mut exports, "compact", |args| compact(&arg(args, 0)));
    export(&mut exports, "some", |args| some(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "every", |args| every(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "append", |args| append(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "join", |args| append(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "zip", |args| zip(&arg(args, 0), &arg(args, 1), &arg(args, 2)));
    export(&mut exports, "partition", |args| partition(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "uniq", |args| uniq(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "first", |args| Ok(first(&arg(args, 0))));
    export(&mut exports, "last", |args| last(&arg(args, 0)));
    export(&mut exports, "take", |args| take(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "takeLast", |args| take_last(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "find", |args| find(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "indexOf", |args| index_of(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "contains?", |args| contains(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "values", |args| values(&arg(args, 0)));
    export(&mut exports, "entries", |args| entries(&arg(args, 0)));
    export(&mut exports, "merge", merge);
    export(&mut exports, "once", |args| Ok(once(&arg(args, 0))));
    export(&mut exports, "loop", |args| run_loop(&arg(args, 0), &arg(args, 1)));
    export(&mut exports, "toHex", |args| to_hex(&arg(args, 0)));
    export(&mut exports, "fromHex", |args| from_hex(&arg(args, 0)));

    let events = Rc::clone(host.events());
    export(&mut exports, "debounce", move |args| {
        let duration = number_or("debounce", &arg(args, 0), 0.0)?;
        let (mode, f) = if arg(args, 2).is_null() {
            (Value::atom("trailing"), arg(args, 1))
        } else {
            (arg(args, 1), arg(args, 2))
        };
        let mode = match &mode {
            Value::Atom(atom) if atom.name() == "leading" => DebounceMode::Leading,
            Value::Atom(atom) if atom.name() == "trailing" => DebounceMode::Trailing,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "debounce() mode must be :leading or :trailing, got {}",
                    other
                )))
            }
        };
        Ok(debounce(&events, duration, mode, f))
    });

    let printer = Rc::clone(host);
    export(&mut exports, "println", move |args| println(&printer, args));
    export(&mut exports, "stdin", |_| Err(RuntimeError::unimplemented("input")));
    exports
}
