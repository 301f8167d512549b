//! Runs one blocking goal while timed perturbations hit the backend.
//!
//! Everything a run starts is owned by the run: the blocking call, one dispatcher for all
//! event timers, and the recorder sampling the arm. `run` joins all of them before it
//! returns, so no timer outlives its scenario.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::backend::{self, Command, Goal, MotionBackend};
use crate::error::{BackendError, OrchestrationError, SchedulingError};
use crate::record::{FiredEvent, RunRecord};

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(50);
const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(1);

/// A command to fire once, `delay` after the run started.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub delay: Duration,
    pub action: Command,
}

impl ScheduledEvent {
    pub fn new(delay: Duration, action: Command) -> Self {
        Self { delay, action }
    }

    pub fn after_secs(secs: f64, action: Command) -> Result<Self, SchedulingError> {
        if !secs.is_finite() {
            return Err(SchedulingError::NonFiniteDelay(secs));
        }
        if secs < 0.0 {
            return Err(SchedulingError::NegativeDelay(secs));
        }
        Ok(Self::new(Duration::from_secs_f64(secs), action))
    }
}

enum RecorderSignal {
    NewLeg(Goal),
    Stop,
}

struct EventFailure {
    index: usize,
    event: String,
    source: BackendError,
}

struct EventOutcome {
    fired: Vec<FiredEvent>,
    failure: Option<EventFailure>,
    aborted: Option<JoinError>,
}

pub struct TimedEventOrchestrator<B: ?Sized> {
    backend: Arc<B>,
    sample_period: Duration,
}

impl<B: MotionBackend + ?Sized + 'static> TimedEventOrchestrator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period.max(MIN_SAMPLE_PERIOD);
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Executes `goal` as a blocking call and fires every event at its delay.
    ///
    /// Returns once the goal call and all event actions are done. A failed goal is
    /// reported only after the remaining events fired; the partial record travels with
    /// the error.
    pub async fn run(
        &self,
        label: &str,
        goal: Goal,
        events: Vec<ScheduledEvent>,
    ) -> Result<RunRecord, OrchestrationError> {
        info!("Starting run `{label}` toward {goal} with {} events", events.len());
        let t0 = Instant::now();

        let (signals, signal_rx) = mpsc::unbounded_channel();
        let recorder = tokio::spawn(record_states(
            Arc::clone(&self.backend),
            self.sample_period,
            RunRecord::new(label, goal.clone()),
            signal_rx,
        ));

        let main = {
            let backend = Arc::clone(&self.backend);
            let command = Command::SendGoal(goal);
            tokio::spawn(async move { backend::execute(&*backend, &command, true).await })
        };

        let (main_result, outcome) = tokio::join!(
            main,
            fire_events(Arc::clone(&self.backend), events, t0, signals.clone())
        );

        // The recorder may already be gone if it panicked; that surfaces on join.
        let _ = signals.send(RecorderSignal::Stop);
        let mut record = recorder.await?;
        record.fired = outcome.fired;
        info!(
            "Run `{label}` finished after {:?} with {} states",
            t0.elapsed(),
            record.state_count()
        );

        if let Some(e) = outcome.aborted {
            return Err(OrchestrationError::Task(e));
        }
        if let Err(source) = main_result? {
            warn!("Goal of run `{label}` failed: {source}");
            return Err(OrchestrationError::Goal {
                source,
                record: Box::new(record),
            });
        }
        if let Some(failure) = outcome.failure {
            return Err(OrchestrationError::Event {
                event: failure.event,
                source: failure.source,
                record: Box::new(record),
            });
        }
        Ok(record)
    }
}

/// Fires events in delay order, ties in the order they were given.
///
/// Events sharing a delay reach the backend one after another from a single task; groups
/// with different delays run concurrently so a slow action does not hold back the next
/// timer.
async fn fire_events<B>(
    backend: Arc<B>,
    mut events: Vec<ScheduledEvent>,
    t0: Instant,
    signals: mpsc::UnboundedSender<RecorderSignal>,
) -> EventOutcome
where
    B: MotionBackend + ?Sized + 'static,
{
    events.sort_by_key(|event| event.delay);

    let mut fired = Vec::with_capacity(events.len());
    let mut actions = JoinSet::new();
    let mut pending = events.into_iter().enumerate().peekable();

    while let Some((index, first)) = pending.next() {
        let delay = first.delay;
        let mut batch = vec![(index, first)];
        while let Some(next) = pending.next_if(|(_, event)| event.delay == delay) {
            batch.push(next);
        }

        time::sleep_until(t0 + delay).await;
        let fired_at = t0.elapsed();
        for (_, event) in &batch {
            debug!("Firing `{}` at {:?} (scheduled {:?})", event.action, fired_at, delay);
            fired.push(FiredEvent {
                description: event.action.to_string(),
                fired_at,
            });
            if let Command::SendGoal(goal) = &event.action {
                let _ = signals.send(RecorderSignal::NewLeg(goal.clone()));
            }
        }

        let backend = Arc::clone(&backend);
        actions.spawn(async move {
            let mut failure = None;
            for (index, event) in batch {
                if let Err(source) = backend::execute(&*backend, &event.action, false).await {
                    warn!("Event `{}` failed: {source}", event.action);
                    failure.get_or_insert(EventFailure {
                        index,
                        event: event.action.to_string(),
                        source,
                    });
                }
            }
            failure
        });
    }

    let mut failure: Option<EventFailure> = None;
    let mut aborted = None;
    while let Some(joined) = actions.join_next().await {
        match joined {
            Ok(Some(found)) => {
                if failure.as_ref().is_none_or(|current| found.index < current.index) {
                    failure = Some(found);
                }
            }
            Ok(None) => {}
            Err(e) => {
                aborted.get_or_insert(e);
            }
        }
    }

    EventOutcome {
        fired,
        failure,
        aborted,
    }
}

/// Samples the backend from the start of a run until told to stop.
///
/// The only writer of the record while the run is in flight.
async fn record_states<B>(
    backend: Arc<B>,
    period: Duration,
    mut record: RunRecord,
    mut signals: mpsc::UnboundedReceiver<RecorderSignal>,
) -> RunRecord
where
    B: MotionBackend + ?Sized,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            signal = signals.recv() => match signal {
                Some(RecorderSignal::NewLeg(goal)) => {
                    debug!("Recording new leg toward {goal}");
                    record.begin_leg(goal);
                    record.push(backend.current_state().await);
                }
                Some(RecorderSignal::Stop) | None => {
                    record.push(backend.current_state().await);
                    break;
                }
            },
            _ = ticker.tick() => record.push(backend.current_state().await),
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{BackendCall, FakeBackend};
    use kinematics::{JointVector, ObstacleSpec, Point3D};

    fn joints(values: &[f64]) -> JointVector {
        JointVector::new(values.to_vec())
    }

    fn obstacle(name: &str) -> Command {
        Command::AddObstacle {
            name: name.to_string(),
            spec: ObstacleSpec::sphere(Point3D::new(0.4, -0.4, 0.4), 0.05),
        }
    }

    fn assert_fired_near(fired: &FiredEvent, delay: Duration) {
        assert!(fired.fired_at >= delay, "{fired:?} fired before {delay:?}");
        assert!(fired.fired_at < delay + Duration::from_millis(10), "{fired:?} fired late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_firing_order_independent_of_goal_duration() {
        for goal_ms in [500, 1500, 3000] {
            let backend = Arc::new(
                FakeBackend::new(vec![0.0, 0.0]).with_goal_duration(Duration::from_millis(goal_ms)),
            );
            let orchestrator = TimedEventOrchestrator::new(Arc::clone(&backend));
            let events = vec![
                ScheduledEvent::new(Duration::from_secs(2), obstacle("late")),
                ScheduledEvent::new(Duration::from_secs(1), Command::Log("early".into())),
            ];

            let started = Instant::now();
            let record = orchestrator
                .run("dynamic", Goal::Joints(joints(&[1.0, 1.0])), events)
                .await
                .unwrap();

            assert_eq!(record.fired.len(), 2);
            assert_eq!(record.fired[0].description, "log \"early\"");
            assert_eq!(record.fired[1].description, "add obstacle late");
            assert_fired_near(&record.fired[0], Duration::from_secs(1));
            assert_fired_near(&record.fired[1], Duration::from_secs(2));
            assert!(record.fired[0].fired_at <= record.fired[1].fired_at);

            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_secs(2));
            assert!(elapsed >= Duration::from_millis(goal_ms));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tied_events_keep_scheduling_order() {
        let backend = Arc::new(FakeBackend::new(vec![0.0]));
        let orchestrator = TimedEventOrchestrator::new(Arc::clone(&backend));
        let events = vec![
            ScheduledEvent::new(Duration::from_millis(300), obstacle("first")),
            ScheduledEvent::new(Duration::from_millis(300), obstacle("second")),
            ScheduledEvent::new(Duration::from_millis(300), Command::RemoveObstacle("first".into())),
        ];

        orchestrator
            .run("ties", Goal::Joints(joints(&[1.0])), events)
            .await
            .unwrap();

        let scene_calls: Vec<BackendCall> = backend
            .calls()
            .into_iter()
            .filter(|call| !matches!(call, BackendCall::JointGoal { .. }))
            .collect();
        assert_eq!(
            scene_calls,
            vec![
                BackendCall::AddObstacle("first".into()),
                BackendCall::AddObstacle("second".into()),
                BackendCall::RemoveObstacle("first".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_goal_completion_still_fire() {
        let backend = Arc::new(
            FakeBackend::new(vec![0.0]).with_goal_duration(Duration::from_millis(200)),
        );
        let orchestrator = TimedEventOrchestrator::new(Arc::clone(&backend));
        let events = vec![ScheduledEvent::new(Duration::from_secs(5), obstacle("after"))];

        let record = orchestrator
            .run("late", Goal::Joints(joints(&[1.0])), events)
            .await
            .unwrap();

        let timed = backend.timed_calls();
        let (goal_at, _) = &timed[0];
        let (obstacle_at, call) = &timed[1];
        assert_eq!(*call, BackendCall::AddObstacle("after".into()));
        assert!(*obstacle_at >= *goal_at + Duration::from_secs(5));
        assert_eq!(record.fired.len(), 1);
        // Recording kept going until the last event fired.
        assert!(record.state_count() > 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_goal_sent_mid_run_opens_leg() {
        let backend = Arc::new(
            FakeBackend::new(vec![0.0, 0.0]).with_goal_duration(Duration::from_secs(1)),
        );
        let orchestrator = TimedEventOrchestrator::new(Arc::clone(&backend));
        let new_goal = Goal::Joints(joints(&[2.0, 0.0]));
        let events = vec![ScheduledEvent::new(
            Duration::from_millis(450),
            Command::SendGoal(new_goal.clone()),
        )];

        let record = orchestrator
            .run("dynamic", Goal::Joints(joints(&[1.0, 1.0])), events)
            .await
            .unwrap();

        assert_eq!(record.legs.len(), 2);
        assert_eq!(record.legs[0].states[0], joints(&[0.0, 0.0]));
        let last = record.final_leg().unwrap();
        assert_eq!(last.goal, new_goal);
        assert_eq!(last.states.last(), Some(&joints(&[2.0, 0.0])));
        assert!(backend.calls().contains(&BackendCall::JointGoal {
            goal: joints(&[2.0, 0.0]),
            blocking: false,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goal_failure_waits_for_pending_events() {
        let backend = Arc::new(
            FakeBackend::new(vec![0.0])
                .with_goal_duration(Duration::from_millis(500))
                .failing_blocking_goal(1),
        );
        let orchestrator = TimedEventOrchestrator::new(Arc::clone(&backend));
        let events = vec![ScheduledEvent::new(Duration::from_secs(2), obstacle("pending"))];

        let started = Instant::now();
        let err = orchestrator
            .run("failing", Goal::Joints(joints(&[1.0])), events)
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(matches!(
            &err,
            OrchestrationError::Goal { source: BackendError::Planning(_), .. }
        ));
        let partial = err.partial_record().unwrap();
        assert_eq!(partial.fired.len(), 1);
        assert!(backend.calls().contains(&BackendCall::AddObstacle("pending".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_failure_is_reported() {
        let backend = Arc::new(FakeBackend::new(vec![0.0]).failing_obstacle_add(1));
        let orchestrator = TimedEventOrchestrator::new(Arc::clone(&backend));
        let events = vec![
            ScheduledEvent::new(Duration::from_millis(100), obstacle("rejected")),
            ScheduledEvent::new(Duration::from_millis(200), obstacle("accepted")),
        ];

        let err = orchestrator
            .run("obstacle", Goal::Joints(joints(&[1.0])), events)
            .await
            .unwrap_err();

        match err {
            OrchestrationError::Event { event, record, .. } => {
                assert_eq!(event, "add obstacle rejected");
                assert_eq!(record.fired.len(), 2);
            }
            other => panic!("expected event failure, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_delays_are_rejected() {
        assert_eq!(
            ScheduledEvent::after_secs(-0.5, Command::Log("x".into())),
            Err(SchedulingError::NegativeDelay(-0.5))
        );
        assert!(matches!(
            ScheduledEvent::after_secs(f64::NAN, Command::Log("x".into())),
            Err(SchedulingError::NonFiniteDelay(_))
        ));
        let event = ScheduledEvent::after_secs(1.75, Command::Log("x".into())).unwrap();
        assert_eq!(event.delay, Duration::from_millis(1750));
    }
}
