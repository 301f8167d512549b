//! Runs a scenario once per planner and scores the pair.
//!
//! The dynamic leg runs first and is persisted; the static leg then starts from where the
//! dynamic run began its final leg and heads for the same final goal, so both planners
//! solve the same problem. Nothing reaches the report unless both legs succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use kinematics::JointVector;
use log::{info, warn};

use crate::backend::{Goal, MotionBackend};
use crate::config::ExperimentConfig;
use crate::cost::evaluate_logs;
use crate::error::{BackendError, BackendResult, InputDataError, Leg, LegFailure, ScenarioError};
use crate::orchestrator::TimedEventOrchestrator;
use crate::record::RunRecord;
use crate::report::{ComparisonRow, ReportWriter};
use crate::run_log::{LogLayout, RunLog};
use crate::scenario::{Scenario, ScenarioSpec};

/// How far, per joint, the arm may settle from the start state before a leg begins.
pub const START_TOLERANCE: f64 = 0.01;

pub struct RunComparator<B: ?Sized> {
    orchestrator: TimedEventOrchestrator<B>,
    report: Arc<ReportWriter>,
    config: ExperimentConfig,
}

struct LegPlan<'a> {
    leg: Leg,
    label: String,
    spec: &'a ScenarioSpec,
    start: JointVector,
    goal: Goal,
    clear: &'a [String],
    layout: LogLayout,
    log_path: PathBuf,
}

impl<B: MotionBackend + ?Sized + 'static> RunComparator<B> {
    pub fn new(backend: Arc<B>, config: ExperimentConfig) -> Self {
        let orchestrator =
            TimedEventOrchestrator::new(backend).with_sample_period(config.sample_period());
        let report = Arc::new(ReportWriter::new(config.report_path()));
        Self {
            orchestrator,
            report,
            config,
        }
    }

    pub fn report(&self) -> &Arc<ReportWriter> {
        &self.report
    }

    pub async fn run(&self, scenario: Scenario) -> Result<ComparisonRow, ScenarioError> {
        let (dynamic, fixed) = scenario.plans(&self.config);
        self.run_scenario(scenario.name(), &dynamic, &fixed).await
    }

    pub async fn run_scenario(
        &self,
        name: &str,
        dynamic: &ScenarioSpec,
        fixed: &ScenarioSpec,
    ) -> Result<ComparisonRow, ScenarioError> {
        let mut clear = dynamic.obstacle_names();
        clear.extend(fixed.obstacle_names());
        clear.sort();
        clear.dedup();

        let dynamic_path = self.config.dynamic_log_path();
        let static_path = self.config.static_log_path();

        info!("Running {} leg of `{name}` with {}", Leg::Dynamic, dynamic.planner);
        self.run_leg(LegPlan {
            leg: Leg::Dynamic,
            label: format!("{name}/{}", Leg::Dynamic),
            spec: dynamic,
            start: self.config.goals.home.clone(),
            goal: dynamic
                .goal
                .clone()
                .unwrap_or_else(|| Goal::Joints(self.config.goals.initial.clone())),
            clear: &clear,
            layout: LogLayout::PerGoal,
            log_path: dynamic_path.clone(),
        })
        .await?;

        let dynamic_log = RunLog::load(&dynamic_path)?;
        let start = dynamic_log
            .final_states()
            .first()
            .cloned()
            .ok_or_else(|| InputDataError::EmptyLeg {
                path: dynamic_path.clone(),
                key: dynamic_log.final_key(),
            })?;
        let goal = fixed
            .goal
            .clone()
            .or_else(|| dynamic_log.final_goal().cloned())
            .ok_or_else(|| InputDataError::EmptyGoals {
                path: dynamic_path.clone(),
            })?;

        info!("Running {} leg of `{name}` with {}", Leg::Static, fixed.planner);
        self.run_leg(LegPlan {
            leg: Leg::Static,
            label: format!("{name}/{}", Leg::Static),
            spec: fixed,
            start,
            goal,
            clear: &clear,
            layout: LogLayout::Single,
            log_path: static_path.clone(),
        })
        .await?;

        let comparison = evaluate_logs(&dynamic_path, &static_path)?;
        let row = ComparisonRow::new(name, comparison);
        info!(
            "Scenario `{name}`: dynamic cost {:.4}, static cost {:.4}, difference {:.4}",
            row.cost_a, row.cost_b, row.difference
        );
        self.report.append(row.clone()).await?;
        Ok(row)
    }

    async fn run_leg(&self, plan: LegPlan<'_>) -> Result<RunRecord, ScenarioError> {
        let leg = plan.leg;
        self.execute_leg(plan).await.map_err(|source| {
            warn!("{leg} leg failed: {source}");
            ScenarioError::Leg { leg, source }
        })
    }

    async fn execute_leg(&self, plan: LegPlan<'_>) -> Result<RunRecord, LegFailure> {
        self.prepare(plan.spec, &plan.start, plan.clear)
            .await
            .map_err(LegFailure::Setup)?;

        let record = self
            .orchestrator
            .run(&plan.label, plan.goal, plan.spec.events.clone())
            .await?;

        RunLog::from_record(&record, plan.layout)
            .save(&plan.log_path)
            .map_err(LegFailure::Persist)?;
        Ok(record)
    }

    /// Clears the scene, brings the arm to `start` with the setup planner and switches to
    /// the leg's planner with its obstacles in place. Fails unless the arm then reports a
    /// state within [`START_TOLERANCE`] of `start`.
    async fn prepare(
        &self,
        spec: &ScenarioSpec,
        start: &JointVector,
        clear: &[String],
    ) -> BackendResult<()> {
        let backend = self.orchestrator.backend();
        for name in clear {
            backend.remove_obstacle(name).await?;
        }

        backend.set_planner_strategy(&self.config.planners.setup).await?;
        info!("Going to start {:?}", start.as_slice());
        backend.go_to_joint_goal(start, true).await?;
        let reached = backend.current_state().await;
        if !reached.all_close(start, START_TOLERANCE) {
            return Err(BackendError::Planning(format!(
                "arm reports {:?} after moving to start {:?}",
                reached.as_slice(),
                start.as_slice()
            )));
        }
        backend.set_planner_strategy(&spec.planner).await?;

        for obstacle in &spec.obstacles {
            backend
                .add_or_replace_obstacle(&obstacle.name, &obstacle.spec)
                .await?;
        }
        Ok(())
    }
}
