use std::{
    cell::RefCell,
    collections::BTreeMap,
    io::{self, Write},
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use log::debug;

use crate::{
    config::RuntimeConfig,
    error::{RtResult, RuntimeError},
    event_loop::EventLoop,
    string_box::StringBox,
    value::{self, arg, Value},
};

/// Process-facing state shared by the builtins and the standard library.
pub struct Host {
    args: Vec<String>,
    events: Rc<EventLoop>,
    captured: Option<RefCell<Vec<u8>>>,
}

impl Host {
    pub fn new(config: &RuntimeConfig, events: Rc<EventLoop>) -> Self {
        Self {
            args: config.args.clone(),
            events,
            captured: config.capture_output.then(|| RefCell::new(Vec::new())),
        }
    }

    pub fn events(&self) -> &Rc<EventLoop> {
        &self.events
    }

    pub fn print(&self, bytes: &[u8]) -> RtResult<usize> {
        match &self.captured {
            Some(buffer) => buffer.borrow_mut().extend_from_slice(bytes),
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(bytes)?;
                stdout.flush()?;
            }
        }
        Ok(bytes.len())
    }

    /// Drains everything printed so far when output is captured.
    pub fn take_output(&self) -> String {
        match &self.captured {
            Some(buffer) => String::from_utf8_lossy(&buffer.take()).into_owned(),
            None => String::new(),
        }
    }
}

/// Largest byte count one `srand` call may request.
pub const MAX_RANDOM_BYTES: usize = 65_536;

fn random_length(n: f64) -> RtResult<usize> {
    if n.fract() != 0.0 || !(0.0..=MAX_RANDOM_BYTES as f64).contains(&n) {
        return Err(RuntimeError::type_error(format!(
            "srand() takes a whole number of bytes up to {}, but got {}",
            MAX_RANDOM_BYTES,
            value::format_number(n)
        )));
    }
    Ok(n as usize)
}

pub fn random_bytes(len: usize) -> RtResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::fill(&mut buf).map_err(|err| RuntimeError::Io(err.to_string()))?;
    Ok(buf)
}

pub fn random_float() -> RtResult<f64> {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).map_err(|err| RuntimeError::Io(err.to_string()))?;
    // 53 random bits give every representable step in [0, 1)
    Ok((u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64)
}

pub fn to_display(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::from(other.to_string()),
    }
}

fn number_arg(name: &str, args: &[Value], index: usize) -> RtResult<f64> {
    match arg(args, index) {
        Value::Number(n) => Ok(n),
        other => Err(RuntimeError::type_error(format!(
            "{}() takes a number, but got {}",
            name, other
        ))),
    }
}

fn unix_time() -> RtResult<f64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .map_err(|err| RuntimeError::Io(err.to_string()))
}

const UNIMPLEMENTED: &[&str] = &[
    "exit", "exec", "input", "ls", "rm", "mkdir", "stat", "open", "close", "read", "write",
    "listen", "req",
];

/// Global functions every module can reach.
pub struct Builtins {
    table: BTreeMap<String, Value>,
}

impl Builtins {
    pub fn install(host: &Rc<Host>) -> Self {
        let mut builtins = Builtins {
            table: BTreeMap::new(),
        };
        builtins.install_conversions();
        builtins.install_system(host);
        builtins.install_math();
        for name in UNIMPLEMENTED {
            builtins.add_builtin(name, move |_| Err(RuntimeError::unimplemented(name)));
        }
        debug!("installed {} builtins", builtins.table.len());
        builtins
    }

    fn add_builtin(
        &mut self,
        name: &str,
        func: impl Fn(&[Value]) -> RtResult<Value> + 'static,
    ) {
        self.table
            .insert(name.to_string(), Value::function(name, func));
    }

    fn install_conversions(&mut self) {
        self.add_builtin("int", |args| Ok(value::to_int(&arg(args, 0))));
        self.add_builtin("float", |args| Ok(value::to_float(&arg(args, 0))));
        self.add_builtin("atom", |args| Ok(value::to_atom(&arg(args, 0))));
        self.add_builtin("string", |args| Ok(to_display(&arg(args, 0))));
        self.add_builtin("type", |args| Ok(Value::Atom(arg(args, 0).kind().atom())));
        self.add_builtin("len", |args| Ok(Value::from(value::len(&arg(args, 0))?)));
        self.add_builtin("keys", |args| Ok(Value::List(value::keys(&arg(args, 0))?)));

        self.add_builtin("codepoint", |args| match arg(args, 0) {
            Value::String(s) => Ok(s.byte_at(0).map(Value::from).unwrap_or(Value::Null)),
            other => Err(RuntimeError::type_error(format!(
                "codepoint() takes a string, but got {}",
                other
            ))),
        });
        self.add_builtin("char", |args| {
            let code = number_arg("char", args, 0)?;
            if (0.0..256.0).contains(&code) {
                return Ok(Value::String(StringBox::from_bytes(vec![code as u8])));
            }
            let ch = char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
            Ok(Value::from(ch.to_string()))
        });
    }

    fn install_system(&mut self, host: &Rc<Host>) {
        let printer = Rc::clone(host);
        self.add_builtin("print", move |args| {
            let text = to_display(&arg(args, 0));
            let bytes = match &text {
                Value::String(s) => s.bytes(),
                other => other.to_string().into_bytes(),
            };
            Ok(Value::from(printer.print(&bytes)?))
        });

        let process_args = host.args.clone();
        self.add_builtin("args", move |_| {
            Ok(Value::List(
                process_args.iter().map(|a| Value::from(a.as_str())).collect(),
            ))
        });
        self.add_builtin("env", |_| {
            Ok(Value::object(
                std::env::vars().map(|(key, val)| (key, Value::from(val))),
            ))
        });
        self.add_builtin("time", |_| Ok(Value::from(unix_time()?)));
        self.add_builtin("nanotime", |_| {
            Ok(Value::from((unix_time()? * 1e9).floor()))
        });
        self.add_builtin("rand", |_| Ok(Value::from(random_float()?)));
        self.add_builtin("srand", |args| {
            let len = random_length(number_arg("srand", args, 0)?)?;
            Ok(Value::String(StringBox::from_bytes(random_bytes(len)?)))
        });

        let events = Rc::clone(host.events());
        self.add_builtin("wait", move |args| {
            let seconds = number_arg("wait", args, 0)?;
            events.wait(seconds, arg(args, 1));
            Ok(Value::Null)
        });
    }

    fn install_math(&mut self) {
        let unary: [(&str, fn(f64) -> f64); 6] = [
            ("sin", f64::sin),
            ("cos", f64::cos),
            ("tan", f64::tan),
            ("asin", f64::asin),
            ("acos", f64::acos),
            ("atan", f64::atan),
        ];
        for (name, op) in unary {
            self.add_builtin(name, move |args| Ok(Value::from(op(number_arg(name, args, 0)?))));
        }
        self.add_builtin("pow", |args| {
            let base = number_arg("pow", args, 0)?;
            let exp = number_arg("pow", args, 1)?;
            Ok(Value::from(base.powf(exp)))
        });
        // log(b, n) is the base-b logarithm of n
        self.add_builtin("log", |args| {
            let base = number_arg("log", args, 0)?;
            let n = number_arg("log", args, 1)?;
            Ok(Value::from(n.ln() / base.ln()))
        });
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.table.get(name).cloned()
    }

    pub fn call(&self, name: &str, args: &[Value]) -> RtResult<Value> {
        match self.table.get(name) {
            Some(func) => func.call(args),
            None => Err(RuntimeError::NotCallable(name.to_string())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{atom::Atom, event_loop::ManualClock};

    fn capturing() -> (Rc<Host>, Builtins) {
        let config = RuntimeConfig::new().capturing_output().with_args(["ember", "run"]);
        let events = Rc::new(EventLoop::new(Rc::new(ManualClock::new())));
        let host = Rc::new(Host::new(&config, events));
        let builtins = Builtins::install(&host);
        (host, builtins)
    }

    #[test]
    fn print_returns_bytes_written() -> RtResult<()> {
        let (host, builtins) = capturing();
        let written = builtins.call("print", &[Value::from("héllo\n")])?;
        assert_eq!(written, Value::from(7));
        builtins.call("print", &[Value::List(vec![Value::from(1), Value::atom("a")])])?;
        assert_eq!(host.take_output(), "héllo\n[1, :a]");
        assert_eq!(host.take_output(), "");
        Ok(())
    }

    #[test]
    fn type_returns_kind_atoms() -> RtResult<()> {
        let (_, builtins) = capturing();
        assert_eq!(builtins.call("type", &[Value::from(2)])?, Value::atom("int"));
        assert_eq!(builtins.call("type", &[Value::from(2.5)])?, Value::atom("float"));
        assert_eq!(builtins.call("type", &[])?, Value::Atom(Atom::new("null")));
        assert_eq!(builtins.call("type", &[Value::Empty])?, Value::atom("empty"));
        Ok(())
    }

    #[test]
    fn conversions() -> RtResult<()> {
        let (_, builtins) = capturing();
        assert_eq!(builtins.call("int", &[Value::from("12")])?, Value::from(12));
        assert!(builtins.call("float", &[Value::from("x")])?.is_null());
        assert_eq!(builtins.call("atom", &[Value::from("ok")])?, Value::atom("ok"));
        assert_eq!(builtins.call("string", &[Value::Null])?, Value::from("?"));
        assert_eq!(builtins.call("codepoint", &[Value::from("A")])?, Value::from(65));
        assert_eq!(builtins.call("char", &[Value::from(97)])?, Value::from("a"));
        assert_eq!(builtins.call("len", &[Value::from("abc")])?, Value::from(3));
        assert!(matches!(
            builtins.call("len", &[Value::from(3)]),
            Err(RuntimeError::Type(_))
        ));
        Ok(())
    }

    #[test]
    fn string_keeps_box_identity() -> RtResult<()> {
        let (_, builtins) = capturing();
        let boxed = StringBox::from("same");
        match builtins.call("string", &[Value::String(boxed.clone())])? {
            Value::String(out) => assert!(out.ptr_eq(&boxed)),
            other => panic!("expected a string, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn os_stubs_fail_unconditionally() {
        let (_, builtins) = capturing();
        for name in UNIMPLEMENTED {
            let err = builtins.call(name, &[Value::from("x")]);
            assert_eq!(err, Err(RuntimeError::Unimplemented(name.to_string())));
        }
    }

    #[test]
    fn process_surface() -> RtResult<()> {
        let (_, builtins) = capturing();
        assert_eq!(
            builtins.call("args", &[])?,
            Value::List(vec![Value::from("ember"), Value::from("run")])
        );
        assert_eq!(value::len(&builtins.call("srand", &[Value::from(16)])?)?, 16);
        let r = builtins.call("rand", &[])?.as_number().unwrap_or(-1.0);
        assert!((0.0..1.0).contains(&r));
        assert!(builtins.call("time", &[])?.as_number().unwrap_or(0.0) > 1.0e9);
        assert_eq!(builtins.call("env", &[])?.kind(), value::Kind::Object);
        Ok(())
    }

    #[test]
    fn srand_rejects_unusable_lengths() -> RtResult<()> {
        let (_, builtins) = capturing();
        assert_eq!(value::len(&builtins.call("srand", &[Value::from(0)])?)?, 0);
        let most = Value::from(MAX_RANDOM_BYTES);
        assert_eq!(value::len(&builtins.call("srand", &[most])?)?, MAX_RANDOM_BYTES);
        for n in [1.0e20, -1.0, 2.5, f64::NAN, f64::INFINITY, (MAX_RANDOM_BYTES + 1) as f64] {
            assert!(matches!(
                builtins.call("srand", &[Value::from(n)]),
                Err(RuntimeError::Type(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn math_passthroughs() -> RtResult<()> {
        let (_, builtins) = capturing();
        assert_eq!(builtins.call("pow", &[Value::from(2), Value::from(10)])?, Value::from(1024));
        let log = builtins.call("log", &[Value::from(2), Value::from(8)])?;
        assert!((log.as_number().unwrap_or(0.0) - 3.0).abs() < 1e-12);
        assert_eq!(builtins.call("sin", &[Value::from(0)])?, Value::from(0));
        assert!(builtins.call("cos", &[Value::from("0")]).is_err());
        Ok(())
    }

    #[test]
    fn wait_schedules_on_the_event_loop() -> RtResult<()> {
        let (host, builtins) = capturing();
        let printer = builtins.get("print").unwrap_or(Value::Null);
        let callback = Value::function("later", move |_| printer.call(&[Value::from("tick")]));
        builtins.call("wait", &[Value::from(1), callback])?;
        assert_eq!(host.take_output(), "");
        assert_eq!(host.events().run_until_idle()?, 1);
        assert_eq!(host.take_output(), "tick");
        Ok(())
    }
}
