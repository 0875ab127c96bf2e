use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use log::{debug, warn};

use crate::{
    error::{RtResult, RuntimeError},
    value::Mapping,
};

pub type Factory = Rc<dyn Fn(&ModuleRegistry) -> RtResult<Mapping>>;

#[derive(Clone)]
enum ModuleState {
    Registered(Factory),
    /// Factory is running; imports see an empty placeholder.
    Resolving,
    Resolved(Mapping),
}

#[derive(Default)]
struct RegistryInner {
    modules: RefCell<HashMap<String, ModuleState>>,
    aliases: RefCell<HashMap<String, String>>,
}

enum Lookup {
    Ready(Mapping),
    Run {
        factory: Factory,
        /// Registration to put back if the factory fails.
        previous: Option<ModuleState>,
    },
}

/// Lazy, memoizing module loader. Clones share the same module table.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    inner: Rc<RegistryInner>,
}

/// Non-owning handle for closures stored inside module exports.
#[derive(Clone)]
pub struct RegistryHandle {
    inner: Weak<RegistryInner>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aliases(aliases: HashMap<String, String>) -> Self {
        let registry = Self::new();
        *registry.inner.aliases.borrow_mut() = aliases;
        registry
    }

    pub fn alias(&self, name: impl Into<String>, target: impl Into<String>) {
        self.inner
            .aliases
            .borrow_mut()
            .insert(name.into(), target.into());
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&ModuleRegistry) -> RtResult<Mapping> + 'static,
    ) {
        let name = name.into();
        debug!("registering module factory {}", name);
        self.inner
            .modules
            .borrow_mut()
            .insert(name, ModuleState::Registered(Rc::new(factory)));
    }

    /// Registers an already built mapping; imports return it as is.
    pub fn register_mapping(&self, name: impl Into<String>, exports: Mapping) {
        let name = name.into();
        debug!("registering prebuilt module {}", name);
        self.inner
            .modules
            .borrow_mut()
            .insert(name, ModuleState::Resolved(exports));
    }

    pub fn import(&self, name: &str) -> RtResult<Mapping> {
        let (factory, previous) = match self.lookup(name)? {
            Lookup::Ready(exports) => return Ok(exports),
            Lookup::Run { factory, previous } => (factory, previous),
        };

        debug!("resolving module {}", name);
        self.inner
            .modules
            .borrow_mut()
            .insert(name.to_string(), ModuleState::Resolving);

        // No borrow of the module table may be held here: the factory
        // re-enters `import` for its own dependencies.
        match factory(self) {
            Ok(exports) => {
                debug!("resolved module {} ({} exports)", name, exports.len());
                self.inner
                    .modules
                    .borrow_mut()
                    .insert(name.to_string(), ModuleState::Resolved(exports.clone()));
                Ok(exports)
            }
            Err(err) => {
                warn!("module {} failed to load: {}", name, err);
                let mut modules = self.inner.modules.borrow_mut();
                match previous {
                    Some(state) => modules.insert(name.to_string(), state),
                    None => modules.remove(name),
                };
                Err(err)
            }
        }
    }

    fn lookup(&self, name: &str) -> RtResult<Lookup> {
        let modules = self.inner.modules.borrow();
        if let Some(state) = modules.get(name) {
            return Ok(match state {
                ModuleState::Resolved(exports) => Lookup::Ready(exports.clone()),
                ModuleState::Resolving => {
                    debug!("module {} is still resolving, returning placeholder", name);
                    Lookup::Ready(Mapping::new())
                }
                ModuleState::Registered(factory) => Lookup::Run {
                    factory: Rc::clone(factory),
                    previous: Some(state.clone()),
                },
            });
        }

        let aliases = self.inner.aliases.borrow();
        let target = aliases
            .get(name)
            .ok_or_else(|| RuntimeError::UnresolvedModule(name.to_string()))?;
        debug!("module {} resolved through alias {}", name, target);
        match modules.get(target) {
            Some(ModuleState::Resolved(exports)) => Ok(Lookup::Ready(exports.clone())),
            Some(ModuleState::Resolving) => Ok(Lookup::Ready(Mapping::new())),
            Some(ModuleState::Registered(factory)) => Ok(Lookup::Run {
                factory: Rc::clone(factory),
                previous: None,
            }),
            None => Err(RuntimeError::UnresolvedModule(name.to_string())),
        }
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        matches!(
            self.inner.modules.borrow().get(name),
            Some(ModuleState::Resolved(_))
        )
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.modules.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl RegistryHandle {
    pub fn import(&self, name: &str) -> RtResult<Mapping> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| RuntimeError::UnresolvedModule(name.to_string()))?;
        ModuleRegistry { inner }.import(name)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}
