//! Coordination layer in front of a motion planning backend.
//!
//! - [`debounce`]: throttles a point stream into occasional goals.
//! - [`orchestrator`]: runs a blocking goal while timed perturbations fire.
//! - [`cost`] and [`comparator`]: score a dynamic and a static planner on the same
//!   scenario and keep a running report.

pub mod backend;
pub mod comparator;
pub mod config;
pub mod cost;
pub mod debounce;
pub mod error;
pub mod orchestrator;
pub mod record;
pub mod report;
pub mod run_log;
pub mod scenario;
pub mod sim;

#[cfg(test)]
mod fake;

pub use backend::{Command, Goal, MotionBackend};
pub use comparator::RunComparator;
pub use config::ExperimentConfig;
pub use cost::{Comparison, compare, cost, evaluate_logs};
pub use debounce::{BackendGoalSink, Decision, GoalDebouncer, GoalSink};
pub use error::{
    BackendError, InputDataError, Leg, LegFailure, OrchestrationError, ScenarioError,
    SchedulingError,
};
pub use orchestrator::{ScheduledEvent, TimedEventOrchestrator};
pub use record::{FiredEvent, RunLeg, RunRecord};
pub use report::{ComparisonRow, Report, ReportWriter};
pub use run_log::{LogLayout, RunLog};
pub use scenario::{Obstacle, Scenario, ScenarioSpec};
pub use sim::SimulatedArm;
