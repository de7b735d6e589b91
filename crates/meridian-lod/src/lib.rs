//! Per-tile view error: screen-space error per camera, the dynamic distance
//! remap for grazing view angles, plugin contributions, and multi-camera
//! aggregation into a single [`ViewErrorResult`].

mod camera;
mod dynamic_error;
mod evaluator;
mod plugin;
mod tile;

pub use camera::{CameraInfo, Projection};
pub use dynamic_error::{dynamic_distance, ground_distance, remap_distance};
pub use evaluator::{ViewErrorEvaluator, ViewErrorResult, screen_space_error};
pub use plugin::{PluginSet, PluginViewError, TilesPlugin};
pub use tile::{Tile, TileBoundingVolume};
