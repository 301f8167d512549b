use std::fmt;

use async_trait::async_trait;
use kinematics::{JointVector, ObstacleSpec, Pose};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

/// The motion planning and execution service the coordination layer drives.
///
/// Implementations must tolerate concurrent calls: a dynamic planner is expected to take
/// a new goal or obstacle while a blocking goal is still resolving.
#[async_trait]
pub trait MotionBackend: Send + Sync {
    /// Plans and executes toward `values`. With `blocking` set the call returns once the
    /// motion finished, otherwise once the goal was handed over.
    async fn go_to_joint_goal(&self, values: &JointVector, blocking: bool) -> BackendResult<()>;

    /// Plans and executes toward an end-effector pose, returning when the motion finished.
    async fn go_to_pose_goal(&self, pose: &Pose) -> BackendResult<()>;

    async fn add_or_replace_obstacle(&self, name: &str, spec: &ObstacleSpec) -> BackendResult<()>;

    async fn remove_obstacle(&self, name: &str) -> BackendResult<()>;

    async fn set_planner_strategy(&self, id: &str) -> BackendResult<()>;

    /// Latest observed joint configuration.
    async fn current_state(&self) -> JointVector;
}

/// A motion target, either in joint space or as an end-effector pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Goal {
    Joints(JointVector),
    Pose(Pose),
}

impl From<JointVector> for Goal {
    fn from(joints: JointVector) -> Self {
        Goal::Joints(joints)
    }
}

impl From<Pose> for Goal {
    fn from(pose: Pose) -> Self {
        Goal::Pose(pose)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Joints(joints) => write!(f, "joints {:?}", joints.as_slice()),
            Goal::Pose(pose) => write!(
                f,
                "pose at ({:.3}, {:.3}, {:.3})",
                pose.translation.x, pose.translation.y, pose.translation.z
            ),
        }
    }
}

/// Something the coordination layer asks of the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SendGoal(Goal),
    AddObstacle { name: String, spec: ObstacleSpec },
    RemoveObstacle(String),
    Log(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SendGoal(goal) => write!(f, "send goal {goal}"),
            Command::AddObstacle { name, .. } => write!(f, "add obstacle {name}"),
            Command::RemoveObstacle(name) => write!(f, "remove obstacle {name}"),
            Command::Log(message) => write!(f, "log \"{message}\""),
        }
    }
}

/// Forwards `command` to `backend`. `blocking` only affects joint goals; pose goals
/// always wait for completion.
pub async fn execute<B>(backend: &B, command: &Command, blocking: bool) -> BackendResult<()>
where
    B: MotionBackend + ?Sized,
{
    match command {
        Command::SendGoal(Goal::Joints(joints)) => backend.go_to_joint_goal(joints, blocking).await,
        Command::SendGoal(Goal::Pose(pose)) => backend.go_to_pose_goal(pose).await,
        Command::AddObstacle { name, spec } => backend.add_or_replace_obstacle(name, spec).await,
        Command::RemoveObstacle(name) => backend.remove_obstacle(name).await,
        Command::Log(message) => {
            info!("{message}");
            Ok(())
        }
    }
}
