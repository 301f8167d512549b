use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// Re-exported so downstream crates build poses without pinning their own nalgebra.
pub use nalgebra;

pub mod pose;
pub mod scene;

pub use pose::{Pose, approach_pitch_degrees, approach_pose};
pub use scene::{ObstacleSpec, Shape};

#[derive(Debug, Clone, Copy)]
pub struct JointState {
    pub angle: f64,
    pub velocity: f64,
    pub effort: f64,
}

impl Default for JointState {
    fn default() -> Self {
        Self {
            angle: 0.0,
            velocity: 0.0,
            effort: 0.0,
        }
    }
}

pub type Position = Vector3<f64>;

/// One arm configuration: joint angles in joint order.
///
/// Serialized as a bare JSON array so recorded runs stay readable by other tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointVector(pub Vec<f64>);

impl JointVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn from_states(states: &[JointState]) -> Self {
        Self(states.iter().map(|joint| joint.angle).collect())
    }

    /// Linear interpolation toward `target`; `t` is clamped to `[0, 1]`.
    ///
    /// Both vectors must have the same length, extra joints on either side are dropped.
    pub fn lerp(&self, target: &JointVector, t: f64) -> JointVector {
        let t = t.clamp(0.0, 1.0);
        if t >= 1.0 && self.len() == target.len() {
            return target.clone();
        }
        JointVector(
            self.0
                .iter()
                .zip(&target.0)
                .map(|(from, to)| from + (to - from) * t)
                .collect(),
        )
    }

    /// True when every joint is within `tolerance` of its counterpart.
    pub fn all_close(&self, other: &JointVector, tolerance: f64) -> bool {
        self.len() == other.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl From<Vec<f64>> for JointVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl AsRef<[f64]> for JointVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// A Cartesian target point in the planning frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_position(&self) -> Position {
        Vector3::new(self.x, self.y, self.z)
    }
}
