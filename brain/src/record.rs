use std::time::Duration;

use kinematics::JointVector;

use crate::backend::Goal;

/// States observed while heading for one goal.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLeg {
    pub goal: Goal,
    pub states: Vec<JointVector>,
}

/// A perturbation as it actually fired, relative to the start of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredEvent {
    pub description: String,
    pub fired_at: Duration,
}

/// Every state observed during one orchestrated run, split by the goal being pursued.
///
/// The first leg belongs to the blocking goal; each goal sent mid-run opens a new leg.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub label: String,
    pub legs: Vec<RunLeg>,
    pub fired: Vec<FiredEvent>,
}

impl RunRecord {
    pub fn new(label: impl Into<String>, goal: Goal) -> Self {
        Self {
            label: label.into(),
            legs: vec![RunLeg {
                goal,
                states: Vec::new(),
            }],
            fired: Vec::new(),
        }
    }

    /// Builds a record from already collected legs, e.g. one loaded from disk.
    pub fn from_legs(label: impl Into<String>, legs: Vec<RunLeg>) -> Self {
        Self {
            label: label.into(),
            legs,
            fired: Vec::new(),
        }
    }

    pub(crate) fn begin_leg(&mut self, goal: Goal) {
        self.legs.push(RunLeg {
            goal,
            states: Vec::new(),
        });
    }

    pub(crate) fn push(&mut self, state: JointVector) {
        if let Some(leg) = self.legs.last_mut() {
            leg.states.push(state);
        }
    }

    /// All observed states in order, across legs.
    pub fn states(&self) -> impl Iterator<Item = &JointVector> {
        self.legs.iter().flat_map(|leg| leg.states.iter())
    }

    pub fn state_count(&self) -> usize {
        self.legs.iter().map(|leg| leg.states.len()).sum()
    }

    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.legs.iter().map(|leg| &leg.goal)
    }

    pub fn final_leg(&self) -> Option<&RunLeg> {
        self.legs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints(values: &[f64]) -> JointVector {
        JointVector::new(values.to_vec())
    }

    #[test]
    fn test_states_follow_legs() {
        let mut record = RunRecord::new("dynamic", Goal::Joints(joints(&[1.0, 1.0])));
        record.push(joints(&[0.0, 0.0]));
        record.push(joints(&[0.5, 0.5]));
        record.begin_leg(Goal::Joints(joints(&[2.0, 0.0])));
        record.push(joints(&[0.6, 0.5]));

        assert_eq!(record.legs.len(), 2);
        assert_eq!(record.state_count(), 3);
        assert_eq!(record.states().last(), Some(&joints(&[0.6, 0.5])));
        assert_eq!(record.final_leg().unwrap().states, vec![joints(&[0.6, 0.5])]);
        assert_eq!(record.goals().count(), 2);
    }
}
