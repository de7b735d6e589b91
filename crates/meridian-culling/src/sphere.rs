//! Bounding spheres and the sphere/frustum plane test.

use glam::{DMat4, DVec3};

use crate::Frustum;

/// A bounding sphere in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    /// Sphere center.
    pub center: DVec3,
    /// Sphere radius. Never negative.
    pub radius: f64,
}

impl Sphere {
    /// Create a sphere. Negative radii are clamped to zero.
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// Build a sphere from the 3D Tiles `sphere` layout `[x, y, z, radius]`.
    pub fn from_tileset_sphere(values: [f64; 4]) -> Self {
        Self::new(DVec3::new(values[0], values[1], values[2]), values[3])
    }

    /// Distance from `point` to the sphere surface, zero when inside.
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        (self.center.distance(point) - self.radius).max(0.0)
    }

    /// Apply an affine transform. The radius grows by the largest axis scale
    /// so the result still bounds the transformed contents.
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        let max_scale = matrix
            .x_axis
            .truncate()
            .length()
            .max(matrix.y_axis.truncate().length())
            .max(matrix.z_axis.truncate().length());
        Self::new(matrix.transform_point3(self.center), self.radius * max_scale)
    }
}

/// Returns `true` if the sphere is at least partially inside every frustum plane.
///
/// Conservative near frustum edges and corners, like every plane-only test.
pub fn sphere_intersects_frustum(sphere: &Sphere, frustum: &Frustum) -> bool {
    frustum
        .planes()
        .iter()
        .all(|plane| plane.signed_distance(sphere.center) >= -sphere.radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box_frustum() -> Frustum {
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
    fn test_distance_to_point() {
        let sphere = Sphere::new(DVec3::ZERO, 2.0);
        assert_eq!(sphere.distance_to_point(DVec3::new(5.0, 0.0, 0.0)), 3.0);
        assert_eq!(sphere.distance_to_point(DVec3::new(1.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_negative_radius_clamped() {
        assert_eq!(Sphere::new(DVec3::ZERO, -3.0).radius, 0.0);
    }

    #[test]
    fn test_tileset_layout() {
        let sphere = Sphere::from_tileset_sphere([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sphere.center, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(sphere.radius, 4.0);
    }

    #[test]
    fn test_transformed_radius_uses_largest_scale() {
        let sphere = Sphere::new(DVec3::X, 1.0);
        let m = DMat4::from_scale(DVec3::new(2.0, 3.0, 1.0));
        let t = sphere.transformed(&m);
        assert_eq!(t.center, DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(t.radius, 3.0);
    }

    #[test]
    fn test_sphere_frustum() {
        let frustum = unit_box_frustum();
        assert!(sphere_intersects_frustum(
            &Sphere::new(DVec3::new(0.0, 0.0, -5.0), 0.5),
            &frustum
        ));
        // Touching the left face counts.
        assert!(sphere_intersects_frustum(
            &Sphere::new(DVec3::new(-2.0, 0.0, -5.0), 1.0),
            &frustum
        ));
        assert!(!sphere_intersects_frustum(
            &Sphere::new(DVec3::new(-5.0, 0.0, -5.0), 1.0),
            &frustum
        ));
        assert!(!sphere_intersects_frustum(
            &Sphere::new(DVec3::new(0.0, 0.0, 5.0), 1.0),
            &frustum
        ));
    }
}
