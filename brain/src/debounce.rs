//! Turns a fast stream of target points into occasional motion commands.
//!
//! Points are buffered until more than the threshold have piled up; the point that
//! overflows the buffer becomes the new goal and the backlog is thrown away, since only
//! the latest intent still matters.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use kinematics::{ObstacleSpec, Point3D, approach_pose};
use log::{debug, info, warn};

use crate::backend::MotionBackend;
use crate::error::BackendResult;

pub const DEFAULT_THRESHOLD: usize = 5;

/// Scene name of the marker placed on a followed point.
pub const TARGET_MARKER: &str = "object";
const TARGET_MARKER_SIZE: [f64; 3] = [0.015, 0.015, 0.03];

/// Capability to commit to a point as the active goal.
#[async_trait]
pub trait GoalSink: Send + Sync {
    async fn dispatch(&self, point: Point3D) -> BackendResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// The point was queued; the buffer now holds this many points.
    Buffered(usize),
    /// The backlog was dropped and this point was sent as the goal.
    Dispatched(Point3D),
}

pub struct GoalDebouncer<S> {
    sink: S,
    buffer: VecDeque<Point3D>,
    threshold: usize,
    ready_to_move: Arc<AtomicBool>,
}

impl<S: GoalSink> GoalDebouncer<S> {
    pub fn new(sink: S) -> Self {
        Self::with_threshold(sink, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(sink: S, threshold: usize) -> Self {
        Self {
            sink,
            buffer: VecDeque::with_capacity(threshold),
            threshold,
            ready_to_move: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared flag that is false while a dispatched goal is being executed.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready_to_move)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_to_move.load(Ordering::Acquire)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Offers a point. Returns the decision, or the sink's error when a dispatch failed.
    pub async fn submit(&mut self, point: Point3D) -> BackendResult<Decision> {
        if self.buffer.len() < self.threshold {
            self.buffer.push_back(point);
            debug!("Buffered point {:?} ({}/{})", point, self.buffer.len(), self.threshold);
            return Ok(Decision::Buffered(self.buffer.len()));
        }

        debug!("Dropping {} buffered points", self.buffer.len());
        self.buffer.clear();

        info!("Following point ({:.3}, {:.3}, {:.3})", point.x, point.y, point.z);
        self.ready_to_move.store(false, Ordering::Release);
        let result = self.sink.dispatch(point).await;
        self.ready_to_move.store(true, Ordering::Release);

        match result {
            Ok(()) => Ok(Decision::Dispatched(point)),
            Err(e) => {
                warn!("Goal for point {:?} failed: {}", point, e);
                Err(e)
            }
        }
    }
}

/// Sends debounced points to a [`MotionBackend`] as approach poses.
///
/// A small marker obstacle is placed on the target first so the approach does not plan
/// through whatever sits there.
pub struct BackendGoalSink<B: ?Sized> {
    backend: Arc<B>,
}

impl<B: MotionBackend + ?Sized> BackendGoalSink<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: MotionBackend + ?Sized> GoalSink for BackendGoalSink<B> {
    async fn dispatch(&self, point: Point3D) -> BackendResult<()> {
        let marker = ObstacleSpec::cuboid(point, TARGET_MARKER_SIZE);
        self.backend
            .add_or_replace_obstacle(TARGET_MARKER, &marker)
            .await?;
        self.backend.go_to_pose_goal(&approach_pose(&point)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::fake::{BackendCall, FakeBackend};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Point3D>>,
        ready_during_dispatch: Mutex<Vec<bool>>,
        flag: Mutex<Option<Arc<AtomicBool>>>,
        fail: bool,
    }

    #[async_trait]
    impl GoalSink for Arc<RecordingSink> {
        async fn dispatch(&self, point: Point3D) -> BackendResult<()> {
            if let Some(flag) = self.flag.lock().unwrap().as_ref() {
                self.ready_during_dispatch
                    .lock()
                    .unwrap()
                    .push(flag.load(Ordering::Acquire));
            }
            self.sent.lock().unwrap().push(point);
            if self.fail {
                Err(BackendError::Planning("no path".into()))
            } else {
                Ok(())
            }
        }
    }

    fn point(i: usize) -> Point3D {
        Point3D::new(i as f64, 0.0, 0.5)
    }

    #[tokio::test]
    async fn test_up_to_threshold_never_dispatches() {
        let sink = Arc::new(RecordingSink::default());
        let mut debouncer = GoalDebouncer::new(Arc::clone(&sink));

        for i in 1..=DEFAULT_THRESHOLD {
            let decision = debouncer.submit(point(i)).await.unwrap();
            assert_eq!(decision, Decision::Buffered(i));
            assert_eq!(debouncer.buffered(), i);
        }
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_point_is_dispatched() {
        let sink = Arc::new(RecordingSink::default());
        let mut debouncer = GoalDebouncer::with_threshold(Arc::clone(&sink), 3);

        for i in 1..=3 {
            debouncer.submit(point(i)).await.unwrap();
        }
        let decision = debouncer.submit(point(4)).await.unwrap();

        assert_eq!(decision, Decision::Dispatched(point(4)));
        assert_eq!(debouncer.buffered(), 0);
        assert_eq!(*sink.sent.lock().unwrap(), vec![point(4)]);

        // The count starts over after a dispatch.
        assert_eq!(debouncer.submit(point(5)).await.unwrap(), Decision::Buffered(1));
    }

    #[tokio::test]
    async fn test_not_ready_while_dispatching() {
        let sink = Arc::new(RecordingSink::default());
        let mut debouncer = GoalDebouncer::with_threshold(Arc::clone(&sink), 0);
        *sink.flag.lock().unwrap() = Some(debouncer.ready_flag());

        assert!(debouncer.is_ready());
        debouncer.submit(point(1)).await.unwrap();
        assert_eq!(*sink.ready_during_dispatch.lock().unwrap(), vec![false]);
        assert!(debouncer.is_ready());
    }

    #[tokio::test]
    async fn test_failure_is_surfaced_and_ready_restored() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let mut debouncer = GoalDebouncer::with_threshold(Arc::clone(&sink), 1);

        debouncer.submit(point(1)).await.unwrap();
        let err = debouncer.submit(point(2)).await.unwrap_err();

        assert_eq!(err, BackendError::Planning("no path".into()));
        assert!(debouncer.is_ready());
        assert_eq!(debouncer.buffered(), 0);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_sink_marks_target_then_moves() {
        let backend = Arc::new(FakeBackend::new(vec![0.0; 7]));
        let sink = BackendGoalSink::new(Arc::clone(&backend));

        sink.dispatch(Point3D::new(0.4, 0.1, 0.5)).await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], BackendCall::AddObstacle(name) if name == TARGET_MARKER));
        assert!(matches!(&calls[1], BackendCall::PoseGoal));
    }
}
