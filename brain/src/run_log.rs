//! On-disk JSON form of a recorded run.
//!
//! A per-goal log (dynamic planner) looks like
//! `{"Goals": [g1, g2], "Goal1States": [...], "Goal2States": [...]}`;
//! a single log (static planner) keeps everything under `"States"`.

use std::path::Path;

use kinematics::JointVector;
use serde_json::{Map, Value};

use crate::backend::Goal;
use crate::error::InputDataError;
use crate::record::RunRecord;

const GOALS_KEY: &str = "Goals";
const STATES_KEY: &str = "States";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLayout {
    /// One `Goal<k>States` list per goal, numbered from 1.
    PerGoal,
    /// All states in one `States` list.
    Single,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunLog {
    pub layout: LogLayout,
    pub goals: Vec<Goal>,
    pub legs: Vec<Vec<JointVector>>,
}

pub fn leg_key(index: usize) -> String {
    format!("Goal{index}States")
}

impl RunLog {
    pub fn from_record(record: &RunRecord, layout: LogLayout) -> Self {
        let goals = record.goals().cloned().collect();
        let legs = match layout {
            LogLayout::PerGoal => record.legs.iter().map(|leg| leg.states.clone()).collect(),
            LogLayout::Single => vec![record.states().cloned().collect()],
        };
        Self {
            layout,
            goals,
            legs,
        }
    }

    /// States of the last leg, the only one for a single log.
    pub fn final_states(&self) -> &[JointVector] {
        self.legs.last().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn final_goal(&self) -> Option<&Goal> {
        self.goals.last()
    }

    /// Name of the list [`final_states`](Self::final_states) is stored under.
    pub fn final_key(&self) -> String {
        match self.layout {
            LogLayout::PerGoal => leg_key(self.legs.len()),
            LogLayout::Single => STATES_KEY.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(GOALS_KEY.to_string(), serde_json::json!(self.goals));
        match self.layout {
            LogLayout::PerGoal => {
                for (index, states) in self.legs.iter().enumerate() {
                    map.insert(leg_key(index + 1), serde_json::json!(states));
                }
            }
            LogLayout::Single => {
                let states: Vec<&JointVector> = self.legs.iter().flatten().collect();
                map.insert(STATES_KEY.to_string(), serde_json::json!(states));
            }
        }
        Value::Object(map)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, InputDataError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InputDataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses log text; `path` is only used to describe failures.
    pub fn parse(text: &str, path: &Path) -> Result<Self, InputDataError> {
        let json_error = |source| InputDataError::Json {
            path: path.to_path_buf(),
            source,
        };
        let mut map: Map<String, Value> = serde_json::from_str(text).map_err(json_error)?;

        let goals: Option<Vec<Goal>> = map
            .remove(GOALS_KEY)
            .map(serde_json::from_value)
            .transpose()
            .map_err(json_error)?;

        if let Some(states) = map.remove(STATES_KEY) {
            let states: Vec<JointVector> = serde_json::from_value(states).map_err(json_error)?;
            return Ok(Self {
                layout: LogLayout::Single,
                goals: goals.unwrap_or_default(),
                legs: vec![states],
            });
        }

        let goals = goals.ok_or_else(|| InputDataError::MissingKey {
            path: path.to_path_buf(),
            key: GOALS_KEY.to_string(),
        })?;
        if goals.is_empty() {
            return Err(InputDataError::EmptyGoals {
                path: path.to_path_buf(),
            });
        }

        let mut legs = Vec::with_capacity(goals.len());
        for index in 1..=goals.len() {
            let key = leg_key(index);
            let states = map.remove(&key).ok_or_else(|| InputDataError::MissingKey {
                path: path.to_path_buf(),
                key: key.clone(),
            })?;
            legs.push(serde_json::from_value(states).map_err(json_error)?);
        }

        Ok(Self {
            layout: LogLayout::PerGoal,
            goals,
            legs,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), InputDataError> {
        let path = path.as_ref();
        let io_error = |source| InputDataError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let text = serde_json::to_string_pretty(&self.to_json()).map_err(|source| {
            InputDataError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        std::fs::write(path, text).map_err(io_error)
    }
}
