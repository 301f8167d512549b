mod communication;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use brain::{
    BackendGoalSink, Decision, GoalDebouncer, MotionBackend, RunComparator, Scenario,
    SimulatedArm, evaluate_logs,
};
use clap::{Parser, Subcommand};
use kinematics::Point3D;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::communication::CommunicationLayer;
use crate::config::AppConfig;

const POINT_QUEUE: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "robot-interface", about = "Drives planning experiments against a motion backend")]
struct Cli {
    /// TOML file overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-process simulated arm instead of zenoh
    #[arg(long, global = true)]
    sim: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios in order, all of them when none is named
    Scenario { names: Vec<String> },
    /// Turn the incoming point stream into approach goals
    Follow,
    /// Compare two run logs
    Cost {
        dynamic_log: PathBuf,
        static_log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path).await?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Scenario { names } => {
            let backend = connect(&config, cli.sim).await?;
            run_scenarios(backend, &config, &names).await
        }
        Commands::Follow => {
            if cli.sim {
                bail!("follow needs a planner that accepts pose goals; drop --sim");
            }
            let layer = Arc::new(CommunicationLayer::new(config.zenoh.clone()).await?);
            follow(layer, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cost {
            dynamic_log,
            static_log,
        } => {
            let comparison = evaluate_logs(&dynamic_log, &static_log)
                .with_context(|| format!("comparing {}", dynamic_log.display()))?;
            println!("Cost A (dynamic): {}", comparison.cost_a);
            println!("Cost B (static):  {}", comparison.cost_b);
            println!("Difference:       {}", comparison.difference);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn connect(config: &AppConfig, sim: bool) -> Result<Arc<dyn MotionBackend>> {
    if sim {
        info!("Using simulated arm");
        let experiment = &config.experiment;
        return Ok(Arc::new(SimulatedArm::new(
            experiment.goals.home.clone(),
            &experiment.sim,
        )));
    }

    info!("Connecting to planner over zenoh");
    let layer = CommunicationLayer::new(config.zenoh.clone())
        .await
        .context("opening zenoh session")?;
    Ok(Arc::new(layer))
}

async fn run_scenarios(
    backend: Arc<dyn MotionBackend>,
    config: &AppConfig,
    names: &[String],
) -> Result<ExitCode> {
    let scenarios = if names.is_empty() {
        Scenario::ALL.to_vec()
    } else {
        names
            .iter()
            .map(|name| name.parse::<Scenario>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let comparator = RunComparator::new(backend, config.experiment.clone());
    for scenario in scenarios {
        info!("Running scenario {scenario}");
        match comparator.run(scenario).await {
            Ok(row) => info!(
                "{}: cost A {:.4}, cost B {:.4}, difference {:.4}",
                row.test, row.cost_a, row.cost_b, row.difference
            ),
            Err(e) => {
                let leg = e.leg().map(|leg| leg.to_string()).unwrap_or_else(|| "-".into());
                error!("Scenario {scenario} failed (leg {leg}, {}): {e}", e.kind());
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    info!("Report at {}", comparator.report().path().display());
    Ok(ExitCode::SUCCESS)
}

async fn follow(layer: Arc<CommunicationLayer>, config: &AppConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Point3D>(POINT_QUEUE);
    layer
        .subscribe_points(move |point| {
            if tx.try_send(point).is_err() {
                debug!("Point queue full, dropping {point:?}");
            }
        })
        .await?;

    let sink = BackendGoalSink::new(Arc::clone(&layer));
    let mut debouncer = GoalDebouncer::with_threshold(sink, config.experiment.debounce.threshold);
    info!(
        "Following points, one goal every {} points",
        debouncer.threshold() + 1
    );

    while let Some(point) = rx.recv().await {
        if !point.is_finite() {
            warn!("Ignoring non-finite point {point:?}");
            continue;
        }
        match debouncer.submit(point).await {
            Ok(Decision::Dispatched(target)) => info!("Reached {target:?}"),
            Ok(Decision::Buffered(count)) => debug!("Buffered {count} points"),
            Err(e) => warn!("Goal failed: {e}"),
        }
    }
    Ok(())
}
