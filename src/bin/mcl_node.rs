//! Localization node running against a simulated robot
//!
//! Usage: `mcl_node [--config <path>] [--steps <n>]`

use anyhow::{Context, Result};
use prometheus_mcl::common::types::Pose2D;
use prometheus_mcl::config::LocalizationConfig;
use prometheus_mcl::perception::PerceptionStack;
use prometheus_mcl::runtime::Collaborators;
use prometheus_mcl::sim::{RecordingOutput, SimNoise, SimulatedWorld};
use prometheus_mcl::transform::OdometryBuffer;
use prometheus_mcl::MclCore;
use std::env;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "config/mcl_params.toml";

struct Args {
    config: Option<String>,
    steps: usize,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        steps: 300,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" | "-c" => args.config = it.next(),
            "--steps" | "-n" => {
                let value = it.next().context("--steps needs a value")?;
                args.steps = value
                    .parse()
                    .with_context(|| format!("invalid step count `{}`", value))?;
            }
            other => anyhow::bail!("unexpected argument `{}`", other),
        }
    }
    Ok(args)
}

fn load_config(path: Option<&str>) -> Result<LocalizationConfig> {
    match path {
        Some(path) => LocalizationConfig::load(path)
            .with_context(|| format!("failed to load parameters from {}", path)),
        None if std::path::Path::new(DEFAULT_CONFIG).exists() => {
            LocalizationConfig::load(DEFAULT_CONFIG).context("failed to load default parameters")
        }
        None => {
            log::warn!("No parameter file found, using defaults");
            Ok(LocalizationConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = load_config(args.config.as_deref())?;
    let period = config.timing.worker_interval();

    let start = Pose2D::new(4.0, 1.2, 0.0);
    let mut world = SimulatedWorld::box_room(8.0, 6.0, 0.05)
        .context("failed to build simulated room")?
        .with_robot_at(start)
        .with_noise(SimNoise {
            range: 0.02,
            odom_translation: 0.005,
            odom_rotation: 0.002,
        });

    let odometry = Arc::new(OdometryBuffer::new(256));
    let output = Arc::new(RecordingOutput::default());
    let collaborators = Collaborators {
        odometry: odometry.clone(),
        converter: Arc::new(config.lidar),
        map: Arc::new(world.occupancy_field().clone()),
        output: output.clone(),
    };

    let mut core = MclCore::new();
    core.register(PerceptionStack::new(config, collaborators));
    core.init().context("failed to start localizer")?;

    let stack = core
        .perception_stack_mut()
        .context("perception stack is not registered")?;
    let handle = stack.handle().context("localizer is not running")?;

    // Odometry starts at its own origin, so tell the filter where the robot is.
    handle.set_pose(start)?;
    odometry.push(world.now(), world.odometry());

    let mut ticker = tokio::time::interval(period);
    for step in 0..args.steps {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }
        handle
            .check()
            .with_context(|| format!("localizer stopped at step {}", step))?;

        let (stamp, odom) = world.step(0.05, 0.03, period.as_secs_f64());
        odometry.push(stamp, odom);
        handle.offer_scan(world.scan());

        if step % 20 == 0 {
            let truth = world.ground_truth();
            match handle.estimate() {
                Some(estimate) => log::info!(
                    "step {}: estimate ({:.2}, {:.2}, {:.2}) truth ({:.2}, {:.2}, {:.2}) error {:.3} m",
                    step,
                    estimate.pose.x,
                    estimate.pose.y,
                    estimate.pose.theta,
                    truth.x,
                    truth.y,
                    truth.theta,
                    estimate.pose.distance_to(&truth)
                ),
                None => log::info!("step {}: no estimate yet", step),
            }
        }
    }

    // Let the worker pick up the last scan before stopping.
    tokio::time::sleep(period * 2).await;

    stack.stop_runtime().await.context("localizer failed")?;
    core.shutdown().context("failed to shut down localizer")?;
    log::info!(
        "Published {} particle clouds and {} corrections",
        output.clouds().len(),
        output.corrections().len()
    );
    Ok(())
}
