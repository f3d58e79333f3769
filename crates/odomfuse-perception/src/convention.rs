//! Sensor/world ↔ processing convention.
//!
//! Samples arrive with a forward-left-up body layout and a roll/pitch/yaw
//! orientation.  The fusion core works in a camera-like right-down-forward
//! layout where the angle roles are permuted:
//!
//! | Processing angle | Rotates about | Sensor angle |
//! |---|---|---|
//! | `rx` | first axis  | `−pitch` |
//! | `ry` | second axis | `−yaw` |
//! | `rz` | third axis  | `roll` |
//!
//! The quaternion components are permuted `(x, y, z, w) → (z, −x, −y, w)`
//! before the roll/pitch/yaw extraction.  [`AxisConvention::encode`] applies
//! the exact inverse on the way out.  Positions are already published in the
//! processing frame by the upstream stages and pass through unchanged.
//!
//! The mapping is bijective except where `cos(rx) = 0`, where roll and yaw
//! are not separable.

use nalgebra::{Quaternion as NaQuaternion, UnitQuaternion};
use odomfuse_types::{Point, Pose6, Quaternion};

/// The fixed bijection between boundary samples and [`Pose6`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisConvention;

impl AxisConvention {
    /// Convert a boundary orientation + position into a processing pose.
    ///
    /// The quaternion is normalised before decomposition; rejecting
    /// malformed quaternions is the caller's job.
    pub fn decode(orientation: &Quaternion, position: &Point) -> Pose6 {
        let permuted = UnitQuaternion::from_quaternion(NaQuaternion::new(
            orientation.w,
            orientation.z,
            -orientation.x,
            -orientation.y,
        ));
        let (roll, pitch, yaw) = permuted.euler_angles();
        Pose6::new(-pitch, -yaw, roll, position.x, position.y, position.z)
    }

    /// Convert a processing pose back into a boundary orientation + position.
    pub fn encode(pose: &Pose6) -> (Quaternion, Point) {
        let rpy = UnitQuaternion::from_euler_angles(pose.rz, -pose.rx, -pose.ry);
        let q = rpy.quaternion();
        (
            Quaternion::new(-q.j, -q.k, q.i, q.w),
            Point::new(pose.tx, pose.ty, pose.tz),
        )
    }
}
