//! Per-frame camera snapshots.

use glam::{DMat4, DVec2, DVec3};
use meridian_culling::Frustum;

/// How a camera turns geometric error into pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// World units covered by one pixel. Error does not fall off with distance.
    Orthographic {
        /// World-space size of one pixel.
        pixel_size: f64,
    },
    /// `2 * tan(fov_y / 2) / viewport_height`.
    Perspective {
        /// Screen-space error denominator.
        sse_denominator: f64,
    },
}

/// Everything error evaluation needs to know about one camera for one frame.
///
/// Built once per frame by the renderer and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    /// World-space position.
    pub position: DVec3,
    /// Unit principal viewing direction in world space.
    pub direction: DVec3,
    /// World-space view frustum.
    pub frustum: Frustum,
    /// Projection parameters.
    pub projection: Projection,
}

impl CameraInfo {
    /// Assemble a snapshot from already computed parts.
    pub fn new(position: DVec3, direction: DVec3, frustum: Frustum, projection: Projection) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            frustum,
            projection,
        }
    }

    /// Snapshot a perspective camera.
    ///
    /// `view` is world-to-camera, `projection` uses the `[0, 1]` depth range,
    /// `fov_y` is the vertical field of view in radians and `resolution` the
    /// viewport size in pixels.
    pub fn perspective(view: &DMat4, projection: &DMat4, fov_y: f64, resolution: DVec2) -> Self {
        let camera_to_world = view.inverse();
        let sse_denominator = 2.0 * (0.5 * fov_y).tan() / resolution.y;
        Self::new(
            camera_to_world.transform_point3(DVec3::ZERO),
            camera_to_world.transform_vector3(DVec3::NEG_Z),
            Frustum::from_view_projection(&(*projection * *view)),
            Projection::Perspective { sse_denominator },
        )
    }

    /// Snapshot an orthographic camera. `zoom` divides the visible extent.
    pub fn orthographic(view: &DMat4, projection: &DMat4, resolution: DVec2, zoom: f64) -> Self {
        let camera_to_world = view.inverse();
        // glam orthographic matrices store 2 / extent on the diagonal.
        let width = 2.0 / projection.x_axis.x.abs();
        let height = 2.0 / projection.y_axis.y.abs();
        let pixel_size = (width / resolution.x).max(height / resolution.y) / zoom;
        Self::new(
            camera_to_world.transform_point3(DVec3::ZERO),
            camera_to_world.transform_vector3(DVec3::NEG_Z),
            Frustum::from_view_projection(&(*projection * *view)),
            Projection::Orthographic { pixel_size },
        )
    }

    /// Returns `true` for orthographic cameras.
    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }
}
