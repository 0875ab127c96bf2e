pub mod atom;
pub mod builtins;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod registry;
pub mod runtime;
pub mod stdlib;
pub mod string_box;
pub mod trampoline;
pub mod value;

pub use atom::Atom;
pub use config::RuntimeConfig;
pub use error::{RtResult, RuntimeError};
pub use registry::ModuleRegistry;
pub use runtime::Runtime;
pub use string_box::StringBox;
pub use value::{classify, equals, Kind, Mapping, Value};
