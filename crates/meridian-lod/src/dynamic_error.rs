//! Distance remapping for shallow viewing angles.
//!
//! Looking toward the horizon, tiles far along the ground cover few pixels
//! vertically yet a naive distance-based error still demands high detail for
//! them. The remap stretches distances beyond the point where the view ray
//! meets the ground plane by `1 / cos(pitch)`, so those tiles are treated as
//! further away and refine less.
//!
//! All quantities are measured in tile-local space, where `+z` is up and the
//! ground plane is `z = 0`.

use glam::DVec3;

use crate::{CameraInfo, Tile};

/// Distance along the view ray from a camera at `height` above the ground
/// plane to the ground, given the vertical component of the unit view
/// direction.
///
/// `None` when the ray runs parallel to the ground or the camera is not
/// above the ground plane.
pub fn ground_distance(height: f64, direction_z: f64) -> Option<f64> {
    if direction_z == 0.0 || height <= 0.0 {
        return None;
    }
    Some(height / direction_z.abs())
}

/// Remap `distance` for a camera at `height` whose unit view direction has
/// vertical component `direction_z`.
///
/// Distances up to the ground distance are returned unchanged. Beyond it the
/// excess is divided by the cosine of the pitch, so the result is never less
/// than the input.
pub fn remap_distance(distance: f64, height: f64, direction_z: f64) -> f64 {
    let Some(camera_distance) = ground_distance(height, direction_z) else {
        return distance;
    };
    if distance <= camera_distance {
        return distance;
    }
    let cos_pitch = height / camera_distance;
    let delta = distance - camera_distance;
    camera_distance + delta / cos_pitch
}

/// The effective distance from `camera` to `tile` after the remap.
///
/// The camera position and direction are taken into the tile's local frame
/// through its cached inverse transform.
pub fn dynamic_distance(tile: &Tile, camera: &CameraInfo, distance: f64) -> f64 {
    let to_local = tile.inverse_transform();
    let position = to_local.transform_point3(camera.position);
    let direction: DVec3 = to_local.transform_vector3(camera.direction).normalize_or_zero();
    remap_distance(distance, position.z, direction.z)
}
