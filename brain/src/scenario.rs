use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use kinematics::{ObstacleSpec, Point3D};

use crate::backend::{Command, Goal};
use crate::config::ExperimentConfig;
use crate::error::ScenarioError;
use crate::orchestrator::ScheduledEvent;

pub const OBSTACLE_NAME: &str = "obstacle";

/// An obstacle placed in the scene before a leg's goal is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub name: String,
    pub spec: ObstacleSpec,
}

impl Obstacle {
    pub fn new(name: impl Into<String>, spec: ObstacleSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

/// What one leg of a scenario does once the arm sits at its start state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioSpec {
    pub planner: String,
    /// Blocking goal of the leg. A static leg without one heads for the last goal of the
    /// persisted dynamic run.
    pub goal: Option<Goal>,
    pub obstacles: Vec<Obstacle>,
    pub events: Vec<ScheduledEvent>,
}

impl ScenarioSpec {
    /// Every obstacle name the leg may put into the scene.
    pub fn obstacle_names(&self) -> Vec<String> {
        let placed = self.obstacles.iter().map(|obstacle| obstacle.name.clone());
        let inserted = self.events.iter().filter_map(|event| match &event.action {
            Command::AddObstacle { name, .. } => Some(name.clone()),
            _ => None,
        });

        let mut names: Vec<String> = placed.chain(inserted).collect();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    ChangeGoal,
    AddObstacle,
    AddObstacleChangeGoal,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::ChangeGoal,
        Scenario::AddObstacle,
        Scenario::AddObstacleChangeGoal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::ChangeGoal => "change_goal",
            Scenario::AddObstacle => "add_obstacle",
            Scenario::AddObstacleChangeGoal => "add_obstacle_change_goal",
        }
    }

    /// The (dynamic, static) leg pair for this scenario.
    pub fn plans(&self, config: &ExperimentConfig) -> (ScenarioSpec, ScenarioSpec) {
        let goals = &config.goals;
        let final_goal = Goal::Joints(goals.final_goal.clone());
        let dynamic_planner = config.planners.dynamic.clone();
        let static_planner = config.planners.static_planner.clone();

        match self {
            Scenario::ChangeGoal => {
                let at = Duration::from_millis(1750);
                let dynamic = ScenarioSpec {
                    planner: dynamic_planner,
                    goal: Some(Goal::Joints(goals.initial.clone())),
                    obstacles: Vec::new(),
                    events: vec![
                        ScheduledEvent::new(at, Command::Log("Sending final joint goal".into())),
                        ScheduledEvent::new(at, Command::SendGoal(final_goal)),
                    ],
                };
                (dynamic, static_leg(static_planner, Vec::new()))
            }
            Scenario::AddObstacle => {
                let at = Duration::from_secs(1);
                let sphere = ObstacleSpec::sphere(Point3D::new(0.4, -0.4, 0.4), 0.05);
                let dynamic = ScenarioSpec {
                    planner: dynamic_planner,
                    goal: Some(Goal::Joints(goals.initial.clone())),
                    obstacles: Vec::new(),
                    events: vec![
                        ScheduledEvent::new(at, Command::Log("Adding new obstacle now".into())),
                        ScheduledEvent::new(
                            at,
                            Command::AddObstacle {
                                name: OBSTACLE_NAME.into(),
                                spec: sphere,
                            },
                        ),
                    ],
                };
                let fixed = static_leg(static_planner, vec![Obstacle::new(OBSTACLE_NAME, sphere)]);
                (dynamic, fixed)
            }
            Scenario::AddObstacleChangeGoal => {
                let at = Duration::from_secs(2);
                let wall = ObstacleSpec::cuboid(Point3D::new(0.8, 0.0, 0.4), [0.5, 0.02, 0.4]);
                // The static leg has always been scored against this closer, taller wall.
                let static_wall =
                    ObstacleSpec::cuboid(Point3D::new(0.4, 0.0, 0.4), [0.5, 0.02, 0.5]);
                let dynamic = ScenarioSpec {
                    planner: dynamic_planner,
                    goal: Some(Goal::Joints(goals.initial_alt.clone())),
                    obstacles: Vec::new(),
                    events: vec![
                        ScheduledEvent::new(
                            at,
                            Command::Log("Adding obstacle, sending final joint goal".into()),
                        ),
                        ScheduledEvent::new(
                            at,
                            Command::AddObstacle {
                                name: OBSTACLE_NAME.into(),
                                spec: wall,
                            },
                        ),
                        ScheduledEvent::new(at, Command::SendGoal(final_goal)),
                    ],
                };
                let fixed = static_leg(
                    static_planner,
                    vec![Obstacle::new(OBSTACLE_NAME, static_wall)],
                );
                (dynamic, fixed)
            }
        }
    }
}

fn static_leg(planner: String, obstacles: Vec<Obstacle>) -> ScenarioSpec {
    ScenarioSpec {
        planner,
        goal: None,
        obstacles,
        events: Vec::new(),
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| ScenarioError::UnknownScenario(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
        assert!(matches!(
            "change_obstacle".parse::<Scenario>(),
            Err(ScenarioError::UnknownScenario(name)) if name == "change_obstacle"
        ));
    }

    #[test]
    fn test_change_goal_sends_final_goal_mid_flight() {
        let config = ExperimentConfig::default();
        let (dynamic, fixed) = Scenario::ChangeGoal.plans(&config);

        assert_eq!(dynamic.planner, "RTRRTstarkConfigDefault");
        assert_eq!(dynamic.events.len(), 2);
        assert!(dynamic.events.iter().all(|e| e.delay == Duration::from_millis(1750)));
        assert_eq!(
            dynamic.events[1].action,
            Command::SendGoal(Goal::Joints(config.goals.final_goal.clone()))
        );
        assert_eq!(fixed.planner, "RRTstarkConfigDefault");
        assert!(fixed.goal.is_none());
        assert!(fixed.obstacles.is_empty());
    }

    #[test]
    fn test_obstacle_scenarios_place_the_obstacle() {
        let config = ExperimentConfig::default();
        for scenario in [Scenario::AddObstacle, Scenario::AddObstacleChangeGoal] {
            let (dynamic, fixed) = scenario.plans(&config);
            assert_eq!(dynamic.obstacle_names(), vec![OBSTACLE_NAME.to_string()]);
            assert_eq!(fixed.obstacle_names(), vec![OBSTACLE_NAME.to_string()]);
        }
    }
}
