//! View frustums as six inward-facing planes plus their eight corner points.
//!
//! Planes are enough for the cheap plane-by-plane rejection tests. The corner
//! points are what the separating-axis test projects, so both are kept.

use glam::{DMat4, DVec3};

use crate::plane::Plane;

/// Plane indices into the frustum planes array.
pub(crate) const LEFT: usize = 0;
pub(crate) const RIGHT: usize = 1;
pub(crate) const BOTTOM: usize = 2;
pub(crate) const TOP: usize = 3;
pub(crate) const NEAR: usize = 4;
pub(crate) const FAR: usize = 5;

/// NDC corners in the same order as [`Frustum::corners`]: the near quad
/// (bottom-left, bottom-right, top-right, top-left) followed by the far quad.
const NDC_CORNERS: [DVec3; 8] = [
    DVec3::new(-1.0, -1.0, 0.0),
    DVec3::new(1.0, -1.0, 0.0),
    DVec3::new(1.0, 1.0, 0.0),
    DVec3::new(-1.0, 1.0, 0.0),
    DVec3::new(-1.0, -1.0, 1.0),
    DVec3::new(1.0, -1.0, 1.0),
    DVec3::new(1.0, 1.0, 1.0),
    DVec3::new(-1.0, 1.0, 1.0),
];

/// A convex view volume.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far. Normals point inward.
    planes: [Plane; 6],
    /// Near quad then far quad, each bottom-left, bottom-right, top-right, top-left.
    corners: [DVec3; 8],
}

impl Frustum {
    /// Extract the frustum from a combined view-projection matrix using the
    /// Griggs-Hartmann method.
    ///
    /// Expects the `[0, 1]` clip depth range produced by glam's `*_rh` and
    /// `*_lh` projections. Works with both perspective and orthographic
    /// projections.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Plane::new(DVec3::ZERO, 0.0); 6];
        planes[LEFT] = Plane::from_coefficients(rows[3] + rows[0]);
        planes[RIGHT] = Plane::from_coefficients(rows[3] - rows[0]);
        planes[BOTTOM] = Plane::from_coefficients(rows[3] + rows[1]);
        planes[TOP] = Plane::from_coefficients(rows[3] - rows[1]);
        planes[NEAR] = Plane::from_coefficients(rows[2]);
        planes[FAR] = Plane::from_coefficients(rows[3] - rows[2]);

        let inverse = vp.inverse();
        let corners = NDC_CORNERS.map(|ndc| inverse.project_point3(ndc));

        Self { planes, corners }
    }

    /// Build a frustum from its eight corners, near quad first, each quad
    /// ordered bottom-left, bottom-right, top-right, top-left.
    ///
    /// Plane normals are oriented toward the centroid of the corners, so the
    /// winding of the input does not matter as long as the quads line up.
    pub fn from_corners(corners: [DVec3; 8]) -> Self {
        let centroid = corners.iter().copied().sum::<DVec3>() / 8.0;
        let face = |a: usize, b: usize, c: usize| {
            let plane = Plane::from_coplanar_points(corners[a], corners[b], corners[c]);
            if plane.signed_distance(centroid) < 0.0 {
                plane.flipped()
            } else {
                plane
            }
        };

        let mut planes = [Plane::new(DVec3::ZERO, 0.0); 6];
        planes[LEFT] = face(0, 3, 4);
        planes[RIGHT] = face(1, 2, 5);
        planes[BOTTOM] = face(0, 1, 4);
        planes[TOP] = face(3, 2, 7);
        planes[NEAR] = face(0, 1, 2);
        planes[FAR] = face(4, 5, 6);

        Self { planes, corners }
    }

    /// Assemble a frustum from already computed planes and corners.
    pub fn from_parts(planes: [Plane; 6], corners: [DVec3; 8]) -> Self {
        Self { planes, corners }
    }

    /// The six planes: left, right, bottom, top, near, far.
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// The eight corner points.
    pub fn corners(&self) -> &[DVec3; 8] {
        &self.corners
    }

    /// Returns `true` if the point is inside or on every plane.
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= 0.0)
    }

    /// Apply an affine transform to planes and corners.
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        Self {
            planes: self.planes.map(|plane| plane.transformed(matrix)),
            corners: self.corners.map(|corner| matrix.transform_point3(corner)),
        }
    }
}
