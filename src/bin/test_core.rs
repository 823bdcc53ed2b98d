use anyhow::{Context, Result};
use prometheus_mcl::common::types::Pose2D;
use prometheus_mcl::config::LocalizationConfig;
use prometheus_mcl::perception::localization::{CycleOutcome, FilterController};
use prometheus_mcl::perception::sensors::{LidarMount, ScanConverter};
use prometheus_mcl::perception::PerceptionStack;
use prometheus_mcl::runtime::Collaborators;
use prometheus_mcl::sim::{RecordingOutput, SimulatedWorld};
use prometheus_mcl::transform::{MapOdomCorrection, OdometryBuffer};
use prometheus_mcl::MclCore;
use std::collections::HashMap;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = LocalizationConfig::default();
    let params = HashMap::from([
        ("num_particles".to_string(), 200.0),
        ("initial_spread_xy".to_string(), 0.3),
        ("seed".to_string(), 7.0),
    ]);
    config.configure(&params).context("invalid parameters")?;

    let start = Pose2D::new(2.0, 2.0, 0.0);
    let mut world = SimulatedWorld::box_room(6.0, 5.0, 0.05)?.with_robot_at(start);
    let lidar = LidarMount::default();
    let correction = MapOdomCorrection::new();

    println!("Running the particle filter for 40 steps...");
    let mut filter = FilterController::new(config.filter, config.motion, config.sensor, config.resampler);
    filter.reseed(start, &correction);
    for step in 0..40 {
        let (_, odom) = world.step(0.1, 0.02, 0.1);
        let scan = lidar.to_robot_frame(&world.scan());
        let outcome = filter.process(odom, &scan, world.occupancy_field(), &correction);
        if let CycleOutcome::Updated {
            estimate: Some(estimate),
            count,
        } = outcome
        {
            println!(
                "step {:2}: {} particles, error {:.3} m",
                step,
                count,
                estimate.pose.distance_to(&world.ground_truth())
            );
        }
    }
    if let Some(map_to_odom) = correction.latest() {
        println!("map -> odom correction: {:?}", map_to_odom);
    }

    println!("Initializing MclCore...");
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let mut core = MclCore::new();
    core.register(PerceptionStack::new(
        config,
        Collaborators {
            odometry: Arc::new(OdometryBuffer::new(64)),
            converter: Arc::new(lidar),
            map: Arc::new(world.occupancy_field().clone()),
            output: Arc::new(RecordingOutput::default()),
        },
    ));

    match core.init() {
        Ok(_) => println!("Core initialized successfully!"),
        Err(e) => {
            println!("Failed to initialize core: {}", e);
            return Ok(());
        }
    }

    match core.shutdown() {
        Ok(_) => println!("Core shutdown successfully!"),
        Err(e) => println!("Failed to shutdown core: {}", e),
    }
    Ok(())
}
