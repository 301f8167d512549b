use serde::{Deserialize, Serialize};

use crate::Point3D;

/// Collision shape of a scene obstacle, centred on its position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Sphere { radius: f64 },
    Box { size: [f64; 3] },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSpec {
    pub position: Point3D,
    pub shape: Shape,
}

impl ObstacleSpec {
    pub fn sphere(position: Point3D, radius: f64) -> Self {
        Self {
            position,
            shape: Shape::Sphere { radius },
        }
    }

    pub fn cuboid(position: Point3D, size: [f64; 3]) -> Self {
        Self {
            position,
            shape: Shape::Box { size },
        }
    }
}
