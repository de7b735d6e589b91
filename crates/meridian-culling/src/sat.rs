//! Separating-axis test between an oriented box and a frustum.
//!
//! Two convex shapes are disjoint iff some axis exists onto which their
//! projections do not overlap. The candidate axes here are the box face
//! normals, the cross products of every pair of frustum plane normals, and
//! the frustum plane normals themselves. A plane-by-plane rejection runs
//! first since it settles most boxes far from the view without projecting
//! any corners.

use glam::DVec3;

use crate::{Frustum, OrientedBox};

/// Axes or cross products shorter than this are treated as degenerate.
pub const AXIS_EPSILON: f64 = 1e-10;

/// 3 box normals + C(6, 2) plane-normal cross products + 6 plane normals.
pub const MAX_AXES: usize = 3 + 15 + 6;

/// A closed projection interval `[min, max]` on one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    /// Smallest projection.
    pub min: f64,
    /// Largest projection.
    pub max: f64,
}

impl Interval {
    /// Project `points` onto `axis`.
    pub fn from_points(axis: DVec3, points: &[DVec3]) -> Self {
        points.iter().fold(
            Self {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            |acc, p| {
                let d = axis.dot(*p);
                Self {
                    min: acc.min.min(d),
                    max: acc.max.max(d),
                }
            },
        )
    }

    /// Inclusive overlap: touching intervals overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max >= other.min && other.max >= self.min
    }
}

/// The candidate separating axes for one box/frustum pair, stored inline.
#[derive(Clone, Debug)]
pub struct SatAxes {
    axes: [DVec3; MAX_AXES],
    len: usize,
}

impl SatAxes {
    fn push(&mut self, axis: DVec3) {
        self.axes[self.len] = axis;
        self.len += 1;
    }

    /// The collected axes.
    pub fn as_slice(&self) -> &[DVec3] {
        &self.axes[..self.len]
    }

    /// Number of usable axes after degenerate ones were dropped.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no axis survived.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Collect the unit-length candidate axes for `obb` against `frustum`.
pub fn candidate_axes(obb: &OrientedBox, frustum: &Frustum) -> SatAxes {
    let mut axes = SatAxes {
        axes: [DVec3::ZERO; MAX_AXES],
        len: 0,
    };

    for normal in obb.face_normals() {
        axes.push(normal);
    }

    let planes = frustum.planes();
    for i in 0..planes.len() {
        for j in (i + 1)..planes.len() {
            let cross = planes[i].normal.cross(planes[j].normal);
            let len = cross.length();
            if len > AXIS_EPSILON {
                axes.push(cross / len);
            }
        }
    }

    for plane in planes {
        if plane.normal.length() > AXIS_EPSILON {
            axes.push(plane.normal);
        }
    }

    axes
}

/// Returns `true` if the oriented box intersects the frustum.
///
/// Touching counts as intersecting. Degenerate axes are skipped, which can
/// only turn a miss into a hit, never the reverse.
pub fn obb_intersects_frustum(obb: &OrientedBox, frustum: &Frustum) -> bool {
    // Coarse rejection: the whole box behind a single plane.
    for plane in frustum.planes() {
        if plane.signed_distance(obb.center) + obb.projected_radius(plane.normal) < 0.0 {
            return false;
        }
    }

    let box_points = obb.corners();
    let frustum_points = frustum.corners();
    for &axis in candidate_axes(obb, frustum).as_slice() {
        let a = Interval::from_points(axis, &box_points);
        let b = Interval::from_points(axis, frustum_points);
        if !a.overlaps(&b) {
            return false;
        }
    }

    true
}
