use std::path::Path;

use anyhow::{Context, Result};
use brain::ExperimentConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub experiment: ExperimentConfig,
    pub zenoh: ZenohKeys,
}

/// Key expressions of the planner node, plus how long to wait for a goal result.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZenohKeys {
    pub joint_states: String,
    pub joint_goal: String,
    pub new_goal: String,
    pub pose_goal: String,
    pub goal_result: String,
    pub strategy: String,
    pub obstacles: String,
    pub obstacles_changed: String,
    pub point_command: String,
    /// Unset means wait for the planner as long as it takes.
    pub goal_timeout_secs: Option<u64>,
    /// How long to wait at startup for the arm's first joint state.
    pub state_timeout_secs: u64,
}

impl Default for ZenohKeys {
    fn default() -> Self {
        Self {
            joint_states: "rt/robot/joint_states".to_string(),
            joint_goal: "rt/planner/joint_goal".to_string(),
            new_goal: "rt/planner/new_goal".to_string(),
            pose_goal: "rt/planner/pose_goal".to_string(),
            goal_result: "rt/planner/result".to_string(),
            strategy: "rt/planner/strategy".to_string(),
            obstacles: "rt/scene/obstacles".to_string(),
            obstacles_changed: "rt/planner/obstacles_changed".to_string(),
            point_command: "rt/point_command".to_string(),
            goal_timeout_secs: None,
            state_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_share_one_file() {
        let config = AppConfig::from_toml(
            r#"
            report_file = "runs.csv"

            [debounce]
            threshold = 8

            [zenoh]
            joint_states = "rt/panda/joint_states"
            goal_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.experiment.report_file, "runs.csv");
        assert_eq!(config.experiment.debounce.threshold, 8);
        assert_eq!(config.experiment.planners.dynamic, "RTRRTstarkConfigDefault");
        assert_eq!(config.zenoh.joint_states, "rt/panda/joint_states");
        assert_eq!(config.zenoh.point_command, "rt/point_command");
        assert_eq!(config.zenoh.goal_timeout_secs, Some(30));
        assert_eq!(config.zenoh.state_timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let err = AppConfig::from_file("/nonexistent/robot.toml").await.unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/robot.toml"));
    }
}
