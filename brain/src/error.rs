use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::record::RunRecord;

/// Failure reported by the motion backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("backend timed out: {0}")]
    Timeout(String),

    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    #[error("backend transport error: {0}")]
    Transport(String),
}

/// Malformed or missing persisted data, or states that cannot be compared.
#[derive(Error, Debug)]
pub enum InputDataError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed run log {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("run log {} has no `{key}` entry", path.display())]
    MissingKey { path: PathBuf, key: String },

    #[error("run log {} lists no goals", path.display())]
    EmptyGoals { path: PathBuf },

    #[error("run log {} has an empty `{key}` list", path.display())]
    EmptyLeg { path: PathBuf, key: String },

    #[error("state {index} has no joints")]
    EmptyState { index: usize },

    #[error("state {index} has {found} joints, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("malformed report {} at line {line}: {reason}", path.display())]
    MalformedReport {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// A schedule that can never be honoured. Treated as a programming error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("event delay must not be negative, got {0}s")]
    NegativeDelay(f64),

    #[error("event delay must be finite, got {0}")]
    NonFiniteDelay(f64),
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("goal execution failed: {source}")]
    Goal {
        #[source]
        source: BackendError,
        record: Box<RunRecord>,
    },

    #[error("scheduled event `{event}` failed: {source}")]
    Event {
        event: String,
        #[source]
        source: BackendError,
        record: Box<RunRecord>,
    },

    #[error("orchestration task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl OrchestrationError {
    /// States recorded up to the failure, when the run got far enough to record any.
    pub fn partial_record(&self) -> Option<&RunRecord> {
        match self {
            Self::Goal { record, .. } | Self::Event { record, .. } => Some(record),
            Self::Task(_) => None,
        }
    }
}

/// Which sub-run of a scenario an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Dynamic,
    Static,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Dynamic => write!(f, "dynamic"),
            Leg::Static => write!(f, "static"),
        }
    }
}

/// Error raised while preparing or executing a single leg.
#[derive(Error, Debug)]
pub enum LegFailure {
    #[error("setup failed: {0}")]
    Setup(#[source] BackendError),

    #[error(transparent)]
    Run(#[from] OrchestrationError),

    #[error("cannot persist run log: {0}")]
    Persist(#[source] InputDataError),
}

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{leg} leg failed: {source}")]
    Leg {
        leg: Leg,
        #[source]
        source: LegFailure,
    },

    #[error(transparent)]
    Input(#[from] InputDataError),

    #[error("cannot write report {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),
}

impl ScenarioError {
    pub fn leg(&self) -> Option<Leg> {
        match self {
            Self::Leg { leg, .. } => Some(*leg),
            _ => None,
        }
    }

    /// Short name of the error kind, used when reporting a failed scenario.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Leg { source, .. } => match source {
                LegFailure::Setup(_) => "BackendError",
                LegFailure::Run(OrchestrationError::Task(_)) => "TaskError",
                LegFailure::Run(_) => "BackendError",
                LegFailure::Persist(_) => "InputDataError",
            },
            Self::Input(_) => "InputDataError",
            Self::Report { .. } => "ReportError",
            Self::UnknownScenario(_) => "UnknownScenario",
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
