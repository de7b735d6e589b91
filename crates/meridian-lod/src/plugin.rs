//! Plugin hook for extra view-error contributions.

use std::fmt;
use std::sync::Arc;

use crate::{CameraInfo, Tile};

/// A plugin's opinion about one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PluginViewError {
    /// Whether the plugin considers the tile visible.
    pub in_view: bool,
    /// Screen-space error the plugin assigns to the tile.
    pub error: f64,
}

/// A renderer plugin that may contribute view error.
///
/// Plugins without an opinion keep the default implementation, which
/// contributes nothing.
pub trait TilesPlugin: Send + Sync {
    /// Unique name used for registration.
    fn name(&self) -> &str;

    /// Contribute a view error for `tile`, or `None` to abstain.
    ///
    /// Contributions can only raise the aggregated error or turn a tile
    /// visible, never the reverse.
    fn calculate_tile_view_error(
        &self,
        _tile: &Tile,
        _cameras: &[CameraInfo],
    ) -> Option<PluginViewError> {
        None
    }
}

/// Ordered plugin registry, owned by the renderer.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn TilesPlugin>>,
}

impl PluginSet {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Returns `false` and leaves the set unchanged if a
    /// plugin with the same name is already registered.
    pub fn register(&mut self, plugin: Arc<dyn TilesPlugin>) -> bool {
        if self.get(plugin.name()).is_some() {
            return false;
        }
        self.plugins.push(plugin);
        true
    }

    /// Remove and return the plugin registered under `name`.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn TilesPlugin>> {
        let index = self.plugins.iter().position(|p| p.name() == name)?;
        Some(self.plugins.remove(index))
    }

    /// Look up a plugin by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn TilesPlugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Registered plugins in registration order.
    pub fn as_slice(&self) -> &[Arc<dyn TilesPlugin>] {
        &self.plugins
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}
