use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use brain::error::BackendResult;
use brain::{BackendError, MotionBackend};
use edgefirst_schemas::builtin_interfaces::Time;
use edgefirst_schemas::std_msgs::Header;
use kinematics::JointState as KinematicsJointState;
use kinematics::{JointVector, ObstacleSpec, Point3D, Pose, Shape};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use zenoh::Session;

use crate::config::ZenohKeys;

const FRAME_ID: &str = "robot_base";
const OBSTACLE_ADD: u8 = 0;
const OBSTACLE_REMOVE: u8 = 1;
const SHAPE_SPHERE: u8 = 0;
const SHAPE_BOX: u8 = 1;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JointState {
    pub header: Header,
    pub name: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub effort: Vec<f64>,
}

impl Default for JointState {
    fn default() -> Self {
        Self {
            header: Header {
                stamp: Time::new(0, 0),
                frame_id: String::new(),
            },
            name: Vec::new(),
            position: Vec::new(),
            velocity: Vec::new(),
            effort: Vec::new(),
        }
    }
}

/// Goal the planner node acknowledges with a [`GoalResult`] carrying the same id.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GoalRequest {
    pub header: Header,
    pub id: u32,
    pub position: Vec<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PoseRequest {
    pub header: Header,
    pub id: u32,
    pub position: [f64; 3],
    /// x, y, z, w
    pub orientation: [f64; 4],
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GoalResult {
    pub id: u32,
    pub success: bool,
    pub message: String,
}

/// Mid-flight goal change, laid out like `std_msgs/Float64MultiArray` data.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GoalUpdate {
    pub data: Vec<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ObstacleUpdate {
    pub header: Header,
    pub operation: u8,
    pub name: String,
    pub shape: u8,
    pub position: [f64; 3],
    /// Radius in the first slot for spheres, box extents otherwise.
    pub dimensions: [f64; 3],
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StringMsg {
    pub data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BoolMsg {
    pub data: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct PointMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

type PendingGoals = Arc<Mutex<HashMap<u32, oneshot::Sender<GoalResult>>>>;

/// [`MotionBackend`] talking to a remote planner node over zenoh with CDR payloads.
pub struct CommunicationLayer {
    session: Session,
    keys: ZenohKeys,
    latest_state: watch::Sender<JointVector>,
    pending: PendingGoals,
    next_id: AtomicU32,
}

impl CommunicationLayer {
    /// Opens the session and returns once the arm has published its first joint state.
    pub async fn new(keys: ZenohKeys) -> anyhow::Result<Self> {
        let config = zenoh::config::Config::default();
        let session = zenoh::open(config).await.map_err(|e| anyhow::anyhow!(e))?;

        let (latest_state, _) = watch::channel(JointVector::default());
        let layer = Self {
            session,
            keys,
            latest_state,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU32::new(1),
        };
        layer.subscribe_joint_state().await?;
        layer.subscribe_goal_results().await?;

        let limit = Duration::from_secs(layer.keys.state_timeout_secs);
        let mut state = layer.latest_state.subscribe();
        let first = tokio::time::timeout(limit, wait_for_state(&mut state))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "no joint state received on `{}` within {limit:?}",
                    layer.keys.joint_states
                )
            })?;
        info!("Arm reports {} joints", first.len());
        Ok(layer)
    }

    async fn subscribe_joint_state(&self) -> anyhow::Result<()> {
        let subscriber = self
            .session
            .declare_subscriber(&self.keys.joint_states)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        let latest = self.latest_state.clone();

        tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match decode::<JointState>(&payload) {
                    Some(msg) => {
                        let joints = convert_from_ros_joint_state(&msg);
                        if joints.is_empty() {
                            warn!("Ignoring JointState without positions");
                            continue;
                        }
                        latest.send_replace(JointVector::from_states(&joints));
                    }
                    None => warn!("Failed to deserialize JointState"),
                }
            }
        });
        Ok(())
    }

    async fn subscribe_goal_results(&self) -> anyhow::Result<()> {
        let subscriber = self
            .session
            .declare_subscriber(&self.keys.goal_result)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                let Some(result) = decode::<GoalResult>(&payload) else {
                    warn!("Failed to deserialize GoalResult");
                    continue;
                };
                let waiter = pending.lock().ok().and_then(|mut p| p.remove(&result.id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(result);
                    }
                    None => debug!("Result for unknown goal {}", result.id),
                }
            }
        });
        Ok(())
    }

    /// Feeds every point published on the point command key to `callback`.
    pub async fn subscribe_points<F>(&self, callback: F) -> anyhow::Result<()>
    where
        F: Fn(Point3D) + Send + Sync + 'static,
    {
        let subscriber = self
            .session
            .declare_subscriber(&self.keys.point_command)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match decode::<PointMsg>(&payload) {
                    Some(msg) => callback(Point3D::new(msg.x, msg.y, msg.z)),
                    None => warn!("Failed to deserialize Point"),
                }
            }
        });
        Ok(())
    }

    async fn publish<T: Serialize>(&self, key: &str, msg: &T) -> BackendResult<()> {
        // CdrLe writes the ROS 2 encapsulation header (0x00 0x01 0x00 0x00) itself.
        let payload = cdr::serialize::<_, _, cdr::CdrLe>(msg, cdr::Infinite)
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))
    }

    /// Publishes a goal built for a fresh id and waits for the planner's verdict.
    async fn request<T, F>(&self, key: &str, build: F) -> BackendResult<()>
    where
        T: Serialize,
        F: FnOnce(u32) -> T,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending_goals()?.insert(id, tx);

        if let Err(e) = self.publish(key, &build(id)).await {
            self.forget(id);
            return Err(e);
        }

        let result = match self.keys.goal_timeout_secs.map(Duration::from_secs) {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.forget(id);
                    return Err(BackendError::Timeout(format!("goal {id} after {limit:?}")));
                }
            },
            None => rx.await,
        }
        .map_err(|_| BackendError::Transport(format!("result channel for goal {id} closed")))?;

        if result.success {
            Ok(())
        } else {
            Err(BackendError::Planning(result.message))
        }
    }

    fn pending_goals(
        &self,
    ) -> BackendResult<std::sync::MutexGuard<'_, HashMap<u32, oneshot::Sender<GoalResult>>>> {
        self.pending
            .lock()
            .map_err(|_| BackendError::Transport("pending goal table poisoned".into()))
    }

    fn forget(&self, id: u32) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }

    async fn notify_obstacles_changed(&self) -> BackendResult<()> {
        self.publish(&self.keys.obstacles_changed, &BoolMsg { data: true })
            .await
    }
}

#[async_trait]
impl MotionBackend for CommunicationLayer {
    async fn go_to_joint_goal(&self, values: &JointVector, blocking: bool) -> BackendResult<()> {
        if !blocking {
            let update = GoalUpdate {
                data: values.as_slice().to_vec(),
            };
            return self.publish(&self.keys.new_goal, &update).await;
        }

        self.request(&self.keys.joint_goal, |id| GoalRequest {
            header: header(),
            id,
            position: values.as_slice().to_vec(),
        })
        .await
    }

    async fn go_to_pose_goal(&self, pose: &Pose) -> BackendResult<()> {
        let t = pose.translation.vector;
        let q = pose.rotation.coords;
        self.request(&self.keys.pose_goal, |id| PoseRequest {
            header: header(),
            id,
            position: [t.x, t.y, t.z],
            orientation: [q.x, q.y, q.z, q.w],
        })
        .await
    }

    async fn add_or_replace_obstacle(&self, name: &str, spec: &ObstacleSpec) -> BackendResult<()> {
        let (shape, dimensions) = match spec.shape {
            Shape::Sphere { radius } => (SHAPE_SPHERE, [radius, 0.0, 0.0]),
            Shape::Box { size } => (SHAPE_BOX, size),
        };
        let update = ObstacleUpdate {
            header: header(),
            operation: OBSTACLE_ADD,
            name: name.to_string(),
            shape,
            position: [spec.position.x, spec.position.y, spec.position.z],
            dimensions,
        };
        self.publish(&self.keys.obstacles, &update).await?;
        self.notify_obstacles_changed().await
    }

    async fn remove_obstacle(&self, name: &str) -> BackendResult<()> {
        let update = ObstacleUpdate {
            header: header(),
            operation: OBSTACLE_REMOVE,
            name: name.to_string(),
            shape: SHAPE_SPHERE,
            position: [0.0; 3],
            dimensions: [0.0; 3],
        };
        self.publish(&self.keys.obstacles, &update).await?;
        self.notify_obstacles_changed().await
    }

    async fn set_planner_strategy(&self, id: &str) -> BackendResult<()> {
        let msg = StringMsg {
            data: id.to_string(),
        };
        self.publish(&self.keys.strategy, &msg).await
    }

    async fn current_state(&self) -> JointVector {
        self.latest_state.borrow().clone()
    }
}

fn header() -> Header {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Header {
        stamp: Time::new(now.as_secs() as i32, now.subsec_nanos()),
        frame_id: FRAME_ID.to_string(),
    }
}

/// Resolves with the first non-empty joint state.
async fn wait_for_state(state: &mut watch::Receiver<JointVector>) -> JointVector {
    // The sender is owned by the layer, so the channel cannot close while we wait.
    match state.wait_for(|joints| !joints.is_empty()).await {
        Ok(joints) => joints.clone(),
        Err(_) => JointVector::default(),
    }
}

/// Decodes a CDR payload, skipping the 4-byte encapsulation header.
fn decode<T: DeserializeOwned>(payload: &[u8]) -> Option<T> {
    // We assume Little Endian for simplicity
    if payload.len() <= 4 {
        return None;
    }
    let mut deserializer =
        cdr::Deserializer::<_, _, cdr::LittleEndian>::new(&payload[4..], cdr::Infinite);
    serde::Deserialize::deserialize(&mut deserializer).ok()
}

fn convert_from_ros_joint_state(msg: &JointState) -> Vec<KinematicsJointState> {
    let mut joints = Vec::new();
    let len = msg.position.len();
    for i in 0..len {
        joints.push(KinematicsJointState {
            angle: msg.position[i],
            velocity: if i < msg.velocity.len() { msg.velocity[i] } else { 0.0 },
            effort: if i < msg.effort.len() { msg.effort[i] } else { 0.0 },
        });
    }
    joints
}
