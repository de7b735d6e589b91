//! Bounding volumes, view frustums, and the separating-axis box/frustum test
//! used to decide which tiles are visible to a camera.

mod frustum;
mod obb;
mod plane;
mod sat;
mod sphere;

pub use frustum::Frustum;
pub use obb::OrientedBox;
pub use plane::Plane;
pub use sat::{AXIS_EPSILON, Interval, MAX_AXES, SatAxes, candidate_axes, obb_intersects_frustum};
pub use sphere::{Sphere, sphere_intersects_frustum};
