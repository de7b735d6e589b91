//! Multi-camera view-error evaluation.

use std::sync::Arc;

use crate::dynamic_error::dynamic_distance;
use crate::{CameraInfo, Projection, Tile, TilesPlugin};

/// Aggregated view error for one tile in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewErrorResult {
    /// The tile intersects at least one frustum, or a plugin says it is visible.
    pub in_view: bool,
    /// Largest screen-space error among the cameras that decided the result.
    pub error: f64,
    /// Smallest distance among the same cameras. Aggregated independently of
    /// `error`, so the two may come from different cameras.
    pub distance_from_camera: f64,
}

/// The result for a tile no camera or plugin has seen.
impl Default for ViewErrorResult {
    fn default() -> Self {
        Self {
            in_view: false,
            error: Aggregate::EMPTY.error,
            distance_from_camera: Aggregate::EMPTY.distance,
        }
    }
}

impl ViewErrorResult {
    /// Returns `true` if the tile is visible and too coarse for `error_target`.
    pub fn should_refine(&self, error_target: f64) -> bool {
        self.in_view && self.error > error_target
    }
}

/// Running max-error / min-distance pair.
#[derive(Clone, Copy, Debug)]
struct Aggregate {
    error: f64,
    distance: f64,
}

impl Aggregate {
    const EMPTY: Self = Self {
        error: f64::NEG_INFINITY,
        distance: f64::INFINITY,
    };

    fn fold(&mut self, error: f64, distance: f64) {
        self.error = self.error.max(error);
        self.distance = self.distance.min(distance);
    }
}

/// Screen-space error of `geometric_error` seen from `distance` by a
/// perspective camera.
///
/// A zero geometric error is zero error at any distance, including inside
/// the volume. Otherwise a zero distance yields infinity.
pub fn screen_space_error(geometric_error: f64, distance: f64, sse_denominator: f64) -> f64 {
    if geometric_error == 0.0 {
        return 0.0;
    }
    geometric_error / (distance * sse_denominator)
}

/// Computes [`ViewErrorResult`]s for tiles against a set of cameras.
///
/// Stateless apart from its settings; one evaluator can serve any number of
/// tiles, frames, and threads.
#[derive(Clone, Debug, Default)]
pub struct ViewErrorEvaluator {
    dynamic_distance_remap: bool,
}

impl ViewErrorEvaluator {
    /// Create an evaluator, optionally with the grazing-angle distance remap.
    pub fn new(dynamic_distance_remap: bool) -> Self {
        Self {
            dynamic_distance_remap,
        }
    }

    /// Whether the distance remap is applied to perspective cameras.
    pub fn dynamic_distance_remap(&self) -> bool {
        self.dynamic_distance_remap
    }

    /// Error and distance for one camera, ignoring visibility.
    pub fn camera_error(&self, tile: &Tile, camera: &CameraInfo) -> (f64, f64) {
        match camera.projection {
            Projection::Orthographic { pixel_size } => {
                (tile.geometric_error / pixel_size, f64::INFINITY)
            }
            Projection::Perspective { sse_denominator } => {
                let mut distance = tile.bounding_volume().distance_to_point(camera.position);
                if self.dynamic_distance_remap {
                    distance = dynamic_distance(tile, camera, distance);
                }
                let error = screen_space_error(tile.geometric_error, distance, sse_denominator);
                (error, distance)
            }
        }
    }

    /// Evaluate `tile` against every camera and plugin.
    ///
    /// Visible tiles report their worst visible error and nearest visible
    /// distance. Tiles no camera or plugin sees fall back to the worst error
    /// and nearest distance over all cameras, so they still get a priority.
    pub fn evaluate(
        &self,
        tile: &Tile,
        cameras: &[CameraInfo],
        plugins: &[Arc<dyn TilesPlugin>],
    ) -> ViewErrorResult {
        let mut in_view = false;
        let mut visible = Aggregate::EMPTY;
        let mut global = Aggregate::EMPTY;

        for camera in cameras {
            let (error, distance) = self.camera_error(tile, camera);
            if tile.bounding_volume().intersects_frustum(&camera.frustum) {
                in_view = true;
                visible.fold(error, distance);
            }
            global.fold(error, distance);
        }

        for plugin in plugins {
            if let Some(contribution) = plugin.calculate_tile_view_error(tile, cameras) {
                if contribution.in_view {
                    in_view = true;
                    visible.error = visible.error.max(contribution.error);
                }
                global.error = global.error.max(contribution.error);
            }
        }

        let chosen = if in_view { visible } else { global };
        ViewErrorResult {
            in_view,
            error: chosen.error,
            distance_from_camera: chosen.distance,
        }
    }
}
