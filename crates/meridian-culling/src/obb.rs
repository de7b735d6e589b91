//! Oriented bounding boxes.

use glam::{DMat3, DMat4, DVec3};

use crate::sat::AXIS_EPSILON;

/// A box with arbitrary orientation, stored as a center and three half-axis
/// vectors (the columns of `half_axes`).
///
/// The half-axes are expected to be mutually orthogonal. A half-axis may have
/// zero length, which describes a flat tile; such axes are skipped wherever a
/// direction is needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    /// Box center in world space.
    pub center: DVec3,
    /// Half-axis vectors as matrix columns.
    pub half_axes: DMat3,
}

impl OrientedBox {
    /// Create a box from its center and half-axis columns.
    pub fn new(center: DVec3, half_axes: DMat3) -> Self {
        Self { center, half_axes }
    }

    /// Build a box from the 3D Tiles `box` layout: the center followed by the
    /// x, y, and z half-axis vectors.
    pub fn from_tileset_box(values: [f64; 12]) -> Self {
        let v = |i: usize| DVec3::new(values[i], values[i + 1], values[i + 2]);
        Self::new(v(0), DMat3::from_cols(v(3), v(6), v(9)))
    }

    /// Create a world-axis-aligned box from its minimum and maximum corners.
    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        let half = (max - min) * 0.5;
        Self::new((min + max) * 0.5, DMat3::from_diagonal(half))
    }

    /// The three half-axis vectors.
    pub fn axes(&self) -> [DVec3; 3] {
        [
            self.half_axes.x_axis,
            self.half_axes.y_axis,
            self.half_axes.z_axis,
        ]
    }

    /// Unit face normals, skipping degenerate (zero-length) half-axes.
    pub fn face_normals(&self) -> impl Iterator<Item = DVec3> {
        self.axes().into_iter().filter_map(|axis| {
            let len = axis.length();
            (len > AXIS_EPSILON).then(|| axis / len)
        })
    }

    /// The eight corner points.
    pub fn corners(&self) -> [DVec3; 8] {
        let [x, y, z] = self.axes();
        let c = self.center;
        [
            c - x - y - z,
            c + x - y - z,
            c + x + y - z,
            c - x + y - z,
            c - x - y + z,
            c + x - y + z,
            c + x + y + z,
            c - x + y + z,
        ]
    }

    /// Half the extent of the box projected onto `direction`.
    ///
    /// `direction` should be unit length for the result to be a distance.
    pub fn projected_radius(&self, direction: DVec3) -> f64 {
        self.axes()
            .iter()
            .map(|axis| axis.dot(direction).abs())
            .sum()
    }

    /// The point of the box closest to `point`.
    pub fn closest_point(&self, point: DVec3) -> DVec3 {
        let offset = point - self.center;
        let mut closest = self.center;
        for axis in self.axes() {
            let len = axis.length();
            if len <= AXIS_EPSILON {
                continue;
            }
            let unit = axis / len;
            closest += unit * offset.dot(unit).clamp(-len, len);
        }
        closest
    }

    /// Distance from `point` to the box, zero when inside.
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        point.distance(self.closest_point(point))
    }

    /// Apply an affine transform to the center and half-axes.
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        Self {
            center: matrix.transform_point3(self.center),
            half_axes: DMat3::from_mat4(*matrix) * self.half_axes,
        }
    }
}
