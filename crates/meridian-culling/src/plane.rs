//! Half-space planes in f64 world space.

use glam::{DMat3, DMat4, DVec3, DVec4};

/// A plane `normal.dot(p) + constant = 0`.
///
/// Points with a positive signed distance lie on the side the normal points
/// toward. Frustum planes keep their normals pointing into the frustum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: DVec3,
    /// Signed distance term.
    pub constant: f64,
}

impl Plane {
    /// Create a plane from a normal and constant. The normal is used as given.
    pub fn new(normal: DVec3, constant: f64) -> Self {
        Self { normal, constant }
    }

    /// Build a plane from `Vec4(a, b, c, d)` coefficients, normalizing so that
    /// `(a, b, c)` is a unit vector. Zero-length normals are kept as-is.
    pub fn from_coefficients(coefficients: DVec4) -> Self {
        let len = coefficients.truncate().length();
        let c = if len > 0.0 {
            coefficients / len
        } else {
            coefficients
        };
        Self {
            normal: c.truncate(),
            constant: c.w,
        }
    }

    /// Plane through three points, with the normal following the
    /// counter-clockwise winding `a -> b -> c`.
    pub fn from_coplanar_points(a: DVec3, b: DVec3, c: DVec3) -> Self {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        Self {
            normal,
            constant: -normal.dot(a),
        }
    }

    /// Signed distance from `point` to the plane.
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.constant
    }

    /// The same plane facing the opposite way.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            constant: -self.constant,
        }
    }

    /// Apply an affine transform. Normals go through the inverse transpose
    /// so non-uniform scale keeps them perpendicular to the surface.
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        let on_plane = self.normal * -self.constant;
        let point = matrix.transform_point3(on_plane);
        let normal_matrix = DMat3::from_mat4(*matrix).inverse().transpose();
        let normal = (normal_matrix * self.normal).normalize_or_zero();
        Self {
            normal,
            constant: -normal.dot(point),
        }
    }
}
