use std::path::{Path, PathBuf};
use std::time::Duration;

use kinematics::JointVector;
use serde::Deserialize;

use crate::debounce::DEFAULT_THRESHOLD;

/// Settings for the comparison experiments. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub data_dir: PathBuf,
    pub report_file: String,
    pub dynamic_log: String,
    pub static_log: String,
    pub sample_period_ms: u64,
    pub planners: PlannerConfig,
    pub goals: GoalConfig,
    pub debounce: DebounceConfig,
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Incremental replanner under test.
    pub dynamic: String,
    /// Static global planner it is compared against.
    pub static_planner: String,
    /// Planner used to bring the arm to the start of a leg.
    pub setup: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    pub home: JointVector,
    pub initial: JointVector,
    pub initial_alt: JointVector,
    #[serde(rename = "final")]
    pub final_goal: JointVector,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub threshold: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub steps_per_goal: usize,
    pub step_ms: u64,
}

impl ExperimentConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join(&self.report_file)
    }

    pub fn dynamic_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.dynamic_log)
    }

    pub fn static_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.static_log)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Same settings with every data file placed under `dir`.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
}

impl SimConfig {
    pub fn step_period(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/planning"),
            report_file: "summary.csv".to_string(),
            dynamic_log: "dynamic_run.json".to_string(),
            static_log: "static_run.json".to_string(),
            sample_period_ms: 50,
            planners: PlannerConfig::default(),
            goals: GoalConfig::default(),
            debounce: DebounceConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            dynamic: "RTRRTstarkConfigDefault".to_string(),
            static_planner: "RRTstarkConfigDefault".to_string(),
            setup: "RRTstarkConfigDefault".to_string(),
        }
    }
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            home: JointVector::new(vec![0.0, -0.785, 0.0, -2.356, 0.0, 1.571, 0.785]),
            initial: JointVector::new(vec![
                0.9022525451956217,
                -1.0005812062660042,
                -1.7602947518592436,
                -2.7099525294963933,
                -0.1420045228964755,
                3.493668294307763,
                -0.3472854722693375,
            ]),
            initial_alt: JointVector::new(vec![
                -0.5578778636322044,
                0.908623569993187,
                -0.38844591131009487,
                -1.2094721531006272,
                0.3444179383032919,
                2.0541426810783356,
                -0.18421686175609792,
            ]),
            final_goal: JointVector::new(vec![
                1.1901980109241104,
                0.9615559746057705,
                -0.5881359185350531,
                -1.2015471132200233,
                0.5281574185640393,
                2.0160775068768824,
                1.3658315499054479,
            ]),
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps_per_goal: 40,
            step_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ExperimentConfig::from_toml(
            r#"
            data_dir = "/tmp/planning"
            sample_period_ms = 20

            [planners]
            dynamic = "RTRRTstar"

            [goals]
            final = [0.1, 0.2]
            "#,
        )
        .unwrap();

        assert_eq!(config.report_path(), PathBuf::from("/tmp/planning/summary.csv"));
        assert_eq!(config.sample_period(), Duration::from_millis(20));
        assert_eq!(config.planners.dynamic, "RTRRTstar");
        assert_eq!(config.planners.static_planner, "RRTstarkConfigDefault");
        assert_eq!(config.goals.final_goal.as_slice(), &[0.1, 0.2]);
        assert_eq!(config.goals.home.len(), 7);
        assert_eq!(config.debounce.threshold, 5);
    }
}
