use std::collections::HashMap;

/// Settings a host passes when it builds a [`crate::Runtime`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Import name -> registered module name.
    pub aliases: HashMap<String, String>,
    /// Returned by the `args` builtin.
    pub args: Vec<String>,
    /// When set, `print` writes into an in-memory buffer instead of stdout.
    pub capture_output: bool,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), target.into());
        self
    }

    pub fn with_args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn capturing_output(mut self) -> Self {
        self.capture_output = true;
        self
    }
}
