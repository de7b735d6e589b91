//! The read-only view of a tileset node that error evaluation needs.

use glam::{DMat4, DVec3};
use meridian_culling::{Frustum, OrientedBox, Sphere, obb_intersects_frustum, sphere_intersects_frustum};

/// A tile's cached bounding volume. Either shape may be absent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TileBoundingVolume {
    /// Bounding sphere, used as the cheap first test.
    pub sphere: Option<Sphere>,
    /// Oriented box, used for the exact test and the distance.
    pub obb: Option<OrientedBox>,
}

impl TileBoundingVolume {
    /// A volume described only by a sphere.
    pub fn from_sphere(sphere: Sphere) -> Self {
        Self {
            sphere: Some(sphere),
            obb: None,
        }
    }

    /// A volume described only by an oriented box.
    pub fn from_obb(obb: OrientedBox) -> Self {
        Self {
            sphere: None,
            obb: Some(obb),
        }
    }

    /// A box together with its circumscribed sphere.
    pub fn from_obb_with_sphere(obb: OrientedBox) -> Self {
        let radius = obb.axes().iter().map(|a| a.length_squared()).sum::<f64>().sqrt();
        Self {
            sphere: Some(Sphere::new(obb.center, radius)),
            obb: Some(obb),
        }
    }

    /// Returns `true` if neither a sphere nor a box is present.
    pub fn is_empty(&self) -> bool {
        self.sphere.is_none() && self.obb.is_none()
    }

    /// Distance from `point` to the volume.
    ///
    /// With both shapes present the larger (tighter) distance wins. An empty
    /// volume is infinitely far away.
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        let sphere = self.sphere.map(|s| s.distance_to_point(point));
        let obb = self.obb.map(|b| b.distance_to_point(point));
        match (sphere, obb) {
            (Some(s), Some(b)) => s.max(b),
            (Some(d), None) | (None, Some(d)) => d,
            (None, None) => f64::INFINITY,
        }
    }

    /// Returns `true` if the volume intersects the frustum.
    ///
    /// The sphere is tested first so most off-screen tiles never reach the
    /// separating-axis test. An empty volume never intersects.
    pub fn intersects_frustum(&self, frustum: &Frustum) -> bool {
        if let Some(sphere) = &self.sphere
            && !sphere_intersects_frustum(sphere, frustum)
        {
            return false;
        }
        if let Some(obb) = &self.obb
            && !obb_intersects_frustum(obb, frustum)
        {
            return false;
        }
        !self.is_empty()
    }
}

/// A node of the external tile hierarchy.
///
/// Owned and mutated by the tile tree; evaluation only reads it. The inverse
/// of `transform` is cached at construction because every camera of every
/// frame needs it when the dynamic distance remap is on.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    /// Worst-case deviation from full detail, in world units.
    pub geometric_error: f64,
    bounding_volume: TileBoundingVolume,
    transform: DMat4,
    inverse_transform: DMat4,
}

impl Tile {
    /// Create a tile. Negative geometric errors are clamped to zero.
    pub fn new(geometric_error: f64, bounding_volume: TileBoundingVolume, transform: DMat4) -> Self {
        Self {
            geometric_error: geometric_error.max(0.0),
            bounding_volume,
            transform,
            inverse_transform: transform.inverse(),
        }
    }

    /// The cached world-space bounding volume.
    pub fn bounding_volume(&self) -> &TileBoundingVolume {
        &self.bounding_volume
    }

    /// Tile-local to world transform.
    pub fn transform(&self) -> &DMat4 {
        &self.transform
    }

    /// World to tile-local transform.
    pub fn inverse_transform(&self) -> &DMat4 {
        &self.inverse_transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_frustum() -> Frustum {
        Frustum::from_corners([
            DVec3::new(-1.0, -1.0, -1.0),
            DVec3::new(1.0, -1.0, -1.0),
            DVec3::new(1.0, 1.0, -1.0),
            DVec3::new(-1.0, 1.0, -1.0),
            DVec3::new(-1.0, -1.0, -10.0),
            DVec3::new(1.0, -1.0, -10.0),
            DVec3::new(1.0, 1.0, -10.0),
            DVec3::new(-1.0, 1.0, -10.0),
        ])
    }

    #[test]
    fn test_distance_prefers_larger_shape_distance() {
        let obb = OrientedBox::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0));
        let volume = TileBoundingVolume::from_obb_with_sphere(obb);
        // The sphere (radius sqrt(3)) bulges past the box face at x = 1, so the box distance wins.
        let d = volume.distance_to_point(DVec3::new(5.0, 0.0, 0.0));
        assert_eq!(d, 4.0);
    }

    #[test]
    fn test_empty_volume() {
        let volume = TileBoundingVolume::default();
        assert!(volume.is_empty());
        assert_eq!(volume.distance_to_point(DVec3::ZERO), f64::INFINITY);
        assert!(!volume.intersects_frustum(&box_frustum()));
    }

    #[test]
    fn test_sphere_rejects_before_box() {
        // The box alone would intersect; the sphere says otherwise and wins.
        let obb = OrientedBox::from_min_max(DVec3::new(-0.5, -0.5, -6.0), DVec3::new(0.5, 0.5, -4.0));
        let volume = TileBoundingVolume {
            sphere: Some(Sphere::new(DVec3::new(50.0, 0.0, -5.0), 1.0)),
            obb: Some(obb),
        };
        assert!(!volume.intersects_frustum(&box_frustum()));
        assert!(TileBoundingVolume::from_obb(obb).intersects_frustum(&box_frustum()));
    }

    #[test]
    fn test_inverse_transform_cached() {
        let transform = DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0));
        let tile = Tile::new(4.0, TileBoundingVolume::default(), transform);
        let local = tile.inverse_transform().transform_point3(DVec3::new(1.0, 2.0, 3.0));
        assert!(local.length() < 1e-12);
        assert_eq!(*tile.transform(), transform);
    }

    #[test]
    fn test_negative_geometric_error_clamped() {
        let tile = Tile::new(-1.0, TileBoundingVolume::default(), DMat4::IDENTITY);
        assert_eq!(tile.geometric_error, 0.0);
    }
}
