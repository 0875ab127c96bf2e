use std::rc::Rc;

use log::debug;

use crate::{
    builtins::{Builtins, Host},
    config::RuntimeConfig,
    error::{RtResult, RuntimeError},
    event_loop::{Clock, EventLoop, SystemClock},
    registry::ModuleRegistry,
    stdlib,
    value::{Mapping, Value},
};

/// Owns everything one program needs: module registry, builtins and the
/// timer queue. Runtimes never share state with each other.
pub struct Runtime {
    host: Rc<Host>,
    builtins: Builtins,
    registry: ModuleRegistry,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(config: RuntimeConfig, clock: Rc<dyn Clock>) -> Self {
        let events = Rc::new(EventLoop::new(clock));
        let host = Rc::new(Host::new(&config, events));
        let builtins = Builtins::install(&host);
        let registry = ModuleRegistry::with_aliases(config.aliases.clone());
        stdlib::register_all(&registry, &host);
        debug!("runtime ready with modules {:?}", registry.names());
        Self {
            host,
            builtins,
            registry,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&ModuleRegistry) -> RtResult<Mapping> + 'static,
    ) {
        self.registry.register(name, factory);
    }

    pub fn import(&self, name: &str) -> RtResult<Mapping> {
        self.registry.import(name)
    }

    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.get(name)
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Imports `module` and calls its export `name`.
    pub fn call(&self, module: &str, name: &str, args: &[Value]) -> RtResult<Value> {
        let exports = self.import(module)?;
        match exports.get(name) {
            Some(func) => func.call(args),
            None => Err(RuntimeError::NotCallable(format!("{}.{}", module, name))),
        }
    }

    pub fn module_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn run_until_idle(&self) -> RtResult<usize> {
        self.host.events().run_until_idle()
    }

    /// Output printed so far, when the config captures output.
    pub fn take_output(&self) -> String {
        self.host.take_output()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
