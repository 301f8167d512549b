//! In-process arm for offline runs: walks a straight joint-space line toward the latest
//! goal, one waypoint per step.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kinematics::{JointVector, ObstacleSpec, Pose};
use log::debug;
use tokio::sync::watch;

use crate::backend::MotionBackend;
use crate::config::SimConfig;
use crate::error::{BackendError, BackendResult};

#[derive(Debug, Default)]
pub struct Planner {
    trajectory: VecDeque<JointVector>,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            trajectory: VecDeque::new(),
        }
    }

    pub fn add_waypoint(&mut self, state: JointVector) {
        self.trajectory.push_back(state);
    }

    pub fn next_step(&mut self) -> Option<JointVector> {
        self.trajectory.pop_front()
    }

    pub fn is_idle(&self) -> bool {
        self.trajectory.is_empty()
    }

    /// Replaces whatever was left with `steps` evenly spaced waypoints ending at `to`.
    pub fn plan_straight(&mut self, from: &JointVector, to: &JointVector, steps: usize) {
        let steps = steps.max(1);
        self.trajectory.clear();
        for i in 1..=steps {
            self.add_waypoint(from.lerp(to, i as f64 / steps as f64));
        }
    }
}

#[derive(Debug)]
struct ArmState {
    planner: Planner,
    current: JointVector,
    planner_id: String,
    obstacles: BTreeMap<String, ObstacleSpec>,
    driving: bool,
}

struct Shared {
    state: Mutex<ArmState>,
    idle: watch::Sender<bool>,
    step: Duration,
    steps_per_goal: usize,
}

/// Simulated [`MotionBackend`]. A goal sent while a motion is under way retargets it.
#[derive(Clone)]
pub struct SimulatedArm {
    shared: Arc<Shared>,
}

impl SimulatedArm {
    pub fn new(start: JointVector, config: &SimConfig) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ArmState {
                    planner: Planner::new(),
                    current: start,
                    planner_id: String::new(),
                    obstacles: BTreeMap::new(),
                    driving: false,
                }),
                idle,
                step: config.step_period(),
                steps_per_goal: config.steps_per_goal,
            }),
        }
    }

    pub fn planner_id(&self) -> String {
        self.shared.lock().planner_id.clone()
    }

    pub fn obstacle_names(&self) -> Vec<String> {
        self.shared.lock().obstacles.keys().cloned().collect()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ArmState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Plans toward `goal`. Returns true when the caller has to start the driver.
    fn retarget(&self, goal: &JointVector) -> BackendResult<bool> {
        let mut state = self.lock();
        if state.planner_id.is_empty() {
            return Err(BackendError::InvalidGoal("no planner strategy selected".into()));
        }
        if goal.len() != state.current.len() {
            return Err(BackendError::InvalidGoal(format!(
                "goal has {} joints, arm has {}",
                goal.len(),
                state.current.len()
            )));
        }

        let from = state.current.clone();
        state.planner.plan_straight(&from, goal, self.steps_per_goal);
        debug!("Planned {} steps toward {:?}", self.steps_per_goal, goal.as_slice());

        if state.driving {
            return Ok(false);
        }
        state.driving = true;
        self.idle.send_replace(false);
        Ok(true)
    }

    async fn drive(self: Arc<Self>) {
        loop {
            let next = {
                let mut state = self.lock();
                let next = state.planner.next_step();
                if next.is_none() {
                    state.driving = false;
                    self.idle.send_replace(true);
                }
                next
            };
            let Some(waypoint) = next else {
                break;
            };

            tokio::time::sleep(self.step).await;
            self.lock().current = waypoint;
        }
    }

    async fn wait_idle(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives as long as `self`, so this only ends once idle.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

#[async_trait]
impl MotionBackend for SimulatedArm {
    async fn go_to_joint_goal(&self, values: &JointVector, blocking: bool) -> BackendResult<()> {
        let start_driver = self.shared.retarget(values)?;

        match (blocking, start_driver) {
            (true, true) => Arc::clone(&self.shared).drive().await,
            (true, false) => self.shared.wait_idle().await,
            (false, true) => {
                tokio::spawn(Arc::clone(&self.shared).drive());
            }
            (false, false) => {}
        }
        Ok(())
    }

    async fn go_to_pose_goal(&self, _pose: &Pose) -> BackendResult<()> {
        Err(BackendError::InvalidGoal(
            "simulated arm only accepts joint goals".into(),
        ))
    }

    async fn add_or_replace_obstacle(&self, name: &str, spec: &ObstacleSpec) -> BackendResult<()> {
        self.shared.lock().obstacles.insert(name.to_string(), *spec);
        Ok(())
    }

    async fn remove_obstacle(&self, name: &str) -> BackendResult<()> {
        self.shared.lock().obstacles.remove(name);
        Ok(())
    }

    async fn set_planner_strategy(&self, id: &str) -> BackendResult<()> {
        if id.is_empty() {
            return Err(BackendError::InvalidGoal("empty planner id".into()));
        }
        self.shared.lock().planner_id = id.to_string();
        Ok(())
    }

    async fn current_state(&self) -> JointVector {
        self.shared.lock().current.clone()
    }
}
