//! Scriptable backend for unit tests. Runs on tokio time, so tests can pause the clock.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kinematics::{JointVector, ObstacleSpec, Pose};
use tokio::time::Instant;

use crate::backend::MotionBackend;
use crate::error::{BackendError, BackendResult};

const STEPS: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BackendCall {
    JointGoal { goal: JointVector, blocking: bool },
    PoseGoal,
    AddObstacle(String),
    RemoveObstacle(String),
    Planner(String),
}

pub(crate) struct FakeBackend {
    origin: Instant,
    state: Mutex<JointVector>,
    target: Mutex<JointVector>,
    calls: Mutex<Vec<(Duration, BackendCall)>>,
    goal_duration: Duration,
    executing: AtomicUsize,
    obstacle_adds: AtomicUsize,
    blocking_goals: AtomicUsize,
    fail_obstacle_add: Option<usize>,
    fail_blocking_goal: Option<usize>,
}

impl FakeBackend {
    pub fn new(start: Vec<f64>) -> Self {
        let start = JointVector::new(start);
        Self {
            origin: Instant::now(),
            state: Mutex::new(start.clone()),
            target: Mutex::new(start),
            calls: Mutex::new(Vec::new()),
            goal_duration: Duration::from_millis(400),
            executing: AtomicUsize::new(0),
            obstacle_adds: AtomicUsize::new(0),
            blocking_goals: AtomicUsize::new(0),
            fail_obstacle_add: None,
            fail_blocking_goal: None,
        }
    }

    pub fn with_goal_duration(mut self, duration: Duration) -> Self {
        self.goal_duration = duration;
        self
    }

    /// Makes the `nth` (1-based) obstacle insertion fail.
    pub fn failing_obstacle_add(mut self, nth: usize) -> Self {
        self.fail_obstacle_add = Some(nth);
        self
    }

    /// Makes the `nth` (1-based) blocking joint goal fail once it has run its course.
    pub fn failing_blocking_goal(mut self, nth: usize) -> Self {
        self.fail_blocking_goal = Some(nth);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Duration, BackendCall)> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: BackendCall) {
        self.calls
            .lock()
            .unwrap()
            .push((self.origin.elapsed(), call));
    }

    async fn drive(&self) {
        self.executing.fetch_add(1, Ordering::SeqCst);
        for remaining in (1..=STEPS).rev() {
            tokio::time::sleep(self.goal_duration / STEPS).await;
            let target = self.target.lock().unwrap().clone();
            let mut state = self.state.lock().unwrap();
            *state = state.lerp(&target, 1.0 / f64::from(remaining));
        }
        self.executing.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MotionBackend for FakeBackend {
    async fn go_to_joint_goal(&self, values: &JointVector, blocking: bool) -> BackendResult<()> {
        self.log(BackendCall::JointGoal {
            goal: values.clone(),
            blocking,
        });
        *self.target.lock().unwrap() = values.clone();

        if !blocking {
            if self.executing.load(Ordering::SeqCst) == 0 {
                *self.state.lock().unwrap() = values.clone();
            }
            return Ok(());
        }

        let nth = self.blocking_goals.fetch_add(1, Ordering::SeqCst) + 1;
        self.drive().await;
        if self.fail_blocking_goal == Some(nth) {
            return Err(BackendError::Planning("goal unreachable".into()));
        }
        Ok(())
    }

    async fn go_to_pose_goal(&self, _pose: &Pose) -> BackendResult<()> {
        self.log(BackendCall::PoseGoal);
        tokio::time::sleep(self.goal_duration).await;
        Ok(())
    }

    async fn add_or_replace_obstacle(&self, name: &str, _spec: &ObstacleSpec) -> BackendResult<()> {
        self.log(BackendCall::AddObstacle(name.to_string()));
        let nth = self.obstacle_adds.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_obstacle_add == Some(nth) {
            return Err(BackendError::Planning(format!("scene rejected {name}")));
        }
        Ok(())
    }

    async fn remove_obstacle(&self, name: &str) -> BackendResult<()> {
        self.log(BackendCall::RemoveObstacle(name.to_string()));
        Ok(())
    }

    async fn set_planner_strategy(&self, id: &str) -> BackendResult<()> {
        self.log(BackendCall::Planner(id.to_string()));
        Ok(())
    }

    async fn current_state(&self) -> JointVector {
        self.state.lock().unwrap().clone()
    }
}
