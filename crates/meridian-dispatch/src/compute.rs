//! Compute unit traits.

use std::fmt;

use crate::{ModuleConfig, RemoteError, TaskEnvelope};

/// The logic running inside one compute unit.
///
/// Each unit owns its own instance; nothing is shared between units.
pub trait ComputeModule: Send {
    /// Apply the one-time bootstrap configuration.
    fn configure(&mut self, _config: &ModuleConfig) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Run one task.
    fn execute(&mut self, task: &TaskEnvelope) -> Result<serde_json::Value, RemoteError>;
}

/// Entry point a dispatcher is bound to. Creates one module per compute unit.
pub trait ComputeEntry: Send + Sync {
    /// Name used for unit thread names and logging.
    fn name(&self) -> &str;

    /// Create a fresh module for a new compute unit.
    fn spawn(&self) -> Box<dyn ComputeModule>;
}

/// A [`ComputeEntry`] backed by a closure.
pub struct FnEntry<F> {
    name: String,
    factory: F,
}

impl<F> FnEntry<F>
where
    F: Fn() -> Box<dyn ComputeModule> + Send + Sync,
{
    /// Bind `name` to `factory`.
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

impl<F> ComputeEntry for FnEntry<F>
where
    F: Fn() -> Box<dyn ComputeModule> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self) -> Box<dyn ComputeModule> {
        (self.factory)()
    }
}

impl<F> fmt::Debug for FnEntry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEntry").field("name", &self.name).finish()
    }
}
