//! Trajectory cost used to compare planner runs.
//!
//! The metric is the square root of the sum of every squared joint difference between
//! consecutive states, taken once over the whole trajectory. It is not the path length
//! (that would sum per-segment norms) but it is what all recorded comparisons were scored
//! with, so it must stay exactly this.

use std::path::Path;


use crate::error::InputDataError;
use crate::run_log::RunLog;

/// Costs of two runs and how much cheaper the second one was.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub cost_a: f64,
    pub cost_b: f64,
    pub difference: f64,
}

/// `sqrt(Σ_i Σ_j (s_i[j] - s_{i+1}[j])²)` over an ordered state sequence.
///
/// Zero or one state costs nothing. Every state must have as many joints as the first,
/// and at least one.
pub fn cost<S: AsRef<[f64]>>(states: &[S]) -> Result<f64, InputDataError> {
    let Some(first) = states.first() else {
        return Ok(0.0);
    };
    let expected = first.as_ref().len();
    if expected == 0 {
        return Err(InputDataError::EmptyState { index: 0 });
    }

    let mut total = 0.0;
    for (index, pair) in states.windows(2).enumerate() {
        let (current, next) = (pair[0].as_ref(), pair[1].as_ref());
        if next.len() != expected {
            return Err(InputDataError::DimensionMismatch {
                index: index + 1,
                expected,
                found: next.len(),
            });
        }
        for (a, b) in current.iter().zip(next) {
            let diff = a - b;
            total += diff * diff;
        }
    }

    Ok(total.sqrt())
}

pub fn compare<A, B>(a: &[A], b: &[B]) -> Result<Comparison, InputDataError>
where
    A: AsRef<[f64]>,
    B: AsRef<[f64]>,
{
    let cost_a = cost(a)?;
    let cost_b = cost(b)?;
    Ok(Comparison {
        cost_a,
        cost_b,
        difference: cost_a - cost_b,
    })
}

/// Loads two persisted run logs and compares the final leg of each.
pub fn evaluate_logs(
    log_a: impl AsRef<Path>,
    log_b: impl AsRef<Path>,
) -> Result<Comparison, InputDataError> {
    let a = RunLog::load(log_a)?;
    let b = RunLog::load(log_b)?;
    compare(a.final_states(), b.final_states())
}
