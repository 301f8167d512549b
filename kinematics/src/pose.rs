use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use std::f64::consts::PI;

use crate::Point3D;

/// End-effector pose in the planning frame.
pub type Pose = Isometry3<f64>;

/// Pitch of the approach for a target at `height` metres above the base.
///
/// Targets near the table are approached at -45 degrees, targets at one metre and above
/// at -135 degrees, linear in between.
pub fn approach_pitch_degrees(height: f64) -> f64 {
    let h = height.clamp(0.0, 1.0);
    -(45.0 + 90.0 * h)
}

/// Pose that reaches `target` with the hand flipped toward the target and pitched by
/// [`approach_pitch_degrees`].
pub fn approach_pose(target: &Point3D) -> Pose {
    let pitch = approach_pitch_degrees(target.z).to_radians();
    let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI);

    Isometry3::from_parts(Translation3::from(target.to_position()), rotation)
}
