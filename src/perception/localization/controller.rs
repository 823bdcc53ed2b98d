//! Filter update cycle
//!
//! The controller owns the particle set and sequences the models. Each call
//! to [`FilterController::process`] consumes one odometry pose and the scan
//! taken at the same time.

use super::estimator::{PoseEstimate, PoseEstimator};
use super::motion_model::{MotionModel, MotionModelConfig};
use super::particle::ParticleSet;
use super::resampler::{Resampler, ResamplerConfig};
use super::sensor_model::{SensorModel, SensorModelConfig};
use crate::common::types::Pose2D;
use crate::map::ObstacleDistance;
use crate::perception::sensors::RangeMeasurement;
use crate::transform::CorrectionSink;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Particle count, update triggers and initial spread
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Particles drawn when the cloud is (re)built
    pub num_particles: usize,
    /// Per-axis odometry translation that triggers an update (m)
    pub linear_threshold: f64,
    /// Odometry rotation that triggers an update (rad)
    pub angular_threshold: f64,
    /// Standard deviation of x and y when building the cloud (m)
    pub initial_spread_xy: f64,
    /// Standard deviation of theta when building the cloud (rad)
    pub initial_spread_theta: f64,
    /// RNG seed, 0 for entropy
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 100,
            linear_threshold: 0.2,
            angular_threshold: PI / 6.0,
            initial_spread_xy: 1.0,
            initial_spread_theta: 0.5,
            seed: 0,
        }
    }
}

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// No odometry baseline yet
    Unseeded,
    /// Baseline known, no particles yet
    AwaitingFirstCloud,
    /// Particles are being tracked
    Tracking,
}

/// What one call to [`FilterController::process`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    BaselineRecorded,
    CloudInitialized { center: Pose2D, count: usize },
    /// The robot has not moved far enough since the last update
    Skipped,
    Updated {
        estimate: Option<PoseEstimate>,
        count: usize,
    },
}

/// Monte Carlo Localization driver
#[derive(Debug)]
pub struct FilterController<R: Rng = StdRng> {
    config: FilterConfig,
    state: FilterState,
    particles: ParticleSet,
    motion: MotionModel,
    sensor: SensorModel,
    resampler: Resampler,
    estimator: PoseEstimator,
    rng: R,
    odom_pose: Option<Pose2D>,
    pose_hint: Option<Pose2D>,
    estimate: Option<PoseEstimate>,
}

impl FilterController<StdRng> {
    /// Create a controller seeded from `config.seed` (entropy when 0)
    pub fn new(
        config: FilterConfig,
        motion: MotionModelConfig,
        sensor: SensorModelConfig,
        resampler: ResamplerConfig,
    ) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        FilterController::with_rng(config, motion, sensor, resampler, rng)
    }
}

impl<R: Rng> FilterController<R> {
    /// Create a controller drawing noise from `rng`
    pub fn with_rng(
        config: FilterConfig,
        motion: MotionModelConfig,
        sensor: SensorModelConfig,
        resampler: ResamplerConfig,
        rng: R,
    ) -> Self {
        FilterController {
            config,
            state: FilterState::Unseeded,
            particles: ParticleSet::default(),
            motion: MotionModel::new(motion),
            sensor: SensorModel::new(sensor),
            resampler: Resampler::new(resampler),
            estimator: PoseEstimator::new(),
            rng,
            odom_pose: None,
            pose_hint: None,
            estimate: None,
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    /// Most recent best estimate
    pub fn estimate(&self) -> Option<PoseEstimate> {
        self.estimate
    }

    /// Odometry pose at the last particle update
    pub fn odom_baseline(&self) -> Option<Pose2D> {
        self.motion.baseline()
    }

    /// Whether `odom` is far enough from the baseline to justify an update
    pub fn moved_far_enough(&self, odom: &Pose2D) -> bool {
        let Some(base) = self.motion.baseline() else {
            return false;
        };
        (odom.x - base.x).abs() >= self.config.linear_threshold
            || (odom.y - base.y).abs() >= self.config.linear_threshold
            || (odom.theta - base.theta).abs() >= self.config.angular_threshold
    }

    /// Run one cycle for an odometry pose and the scan taken with it
    pub fn process(
        &mut self,
        odom: Pose2D,
        scan: &RangeMeasurement,
        map: &dyn ObstacleDistance,
        correction: &dyn CorrectionSink,
    ) -> CycleOutcome {
        self.odom_pose = Some(odom);

        match self.state {
            FilterState::Unseeded => {
                self.motion.set_baseline(odom);
                self.state = FilterState::AwaitingFirstCloud;
                log::info!("Odometry baseline recorded at {:?}", odom);
                CycleOutcome::BaselineRecorded
            }
            FilterState::AwaitingFirstCloud => {
                let center = self.pose_hint.take().unwrap_or(odom);
                self.initialize_cloud(center, correction);
                CycleOutcome::CloudInitialized {
                    center,
                    count: self.particles.len(),
                }
            }
            FilterState::Tracking if !self.moved_far_enough(&odom) => {
                log::debug!("Odometry change below thresholds, skipping update");
                CycleOutcome::Skipped
            }
            FilterState::Tracking => {
                self.motion.apply(odom, &mut self.particles, &mut self.rng);
                self.sensor.weigh(&mut self.particles, scan, map);
                self.update_robot_pose(correction);
                self.resample();
                log::debug!(
                    "Filter updated: {} particles, estimate {:?}",
                    self.particles.len(),
                    self.estimate.map(|e| e.pose)
                );
                CycleOutcome::Updated {
                    estimate: self.estimate,
                    count: self.particles.len(),
                }
            }
        }
    }

    /// Rebuild the cloud around an external pose hint
    ///
    /// The odometry baseline is kept. Before any odometry has been seen the
    /// hint is held and used when the first cloud is built.
    pub fn reseed(&mut self, hint: Pose2D, correction: &dyn CorrectionSink) {
        match self.state {
            FilterState::Unseeded => {
                log::info!("Holding pose hint {:?} until odometry arrives", hint);
                self.pose_hint = Some(hint);
            }
            FilterState::AwaitingFirstCloud | FilterState::Tracking => {
                self.initialize_cloud(hint, correction);
            }
        }
    }

    fn initialize_cloud(&mut self, center: Pose2D, correction: &dyn CorrectionSink) {
        self.particles = ParticleSet::around(
            &center,
            self.config.num_particles,
            self.config.initial_spread_xy,
            self.config.initial_spread_theta,
            &mut self.rng,
        );
        self.state = FilterState::Tracking;
        log::info!(
            "Initialized {} particles around {:?}",
            self.particles.len(),
            center
        );
        self.update_robot_pose(correction);
    }

    /// Normalize, take the mode, and hand it to the correction sink
    fn update_robot_pose(&mut self, correction: &dyn CorrectionSink) {
        self.particles.normalize();
        self.estimate = self.estimator.estimate(&self.particles);
        if let (Some(estimate), Some(odom)) = (self.estimate, self.odom_pose) {
            correction.fix_map_to_odom(&estimate.pose, &odom);
        }
    }

    fn resample(&mut self) {
        self.particles = self.resampler.resample(&self.particles, &mut self.rng);
        self.particles.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::localization::particle::Particle;
    use crate::perception::sensors::Beam;
    use crate::transform::MapOdomCorrection;
    use approx::assert_relative_eq;

    struct Flat;

    impl ObstacleDistance for Flat {
        fn closest_obstacle_distance(&self, _x: f64, _y: f64) -> Option<f64> {
            Some(0.5)
        }
    }

    fn controller(num_particles: usize) -> FilterController {
        FilterController::with_rng(
            FilterConfig {
                num_particles,
                seed: 42,
                ..FilterConfig::default()
            },
            MotionModelConfig::default(),
            SensorModelConfig::default(),
            ResamplerConfig::default(),
            StdRng::seed_from_u64(42),
        )
    }

    fn scan() -> RangeMeasurement {
        RangeMeasurement::new(vec![Beam::new(1.0, 0.0), Beam::new(2.0, 1.0)])
    }

    #[test]
    fn walks_through_states() {
        let mut c = controller(50);
        let sink = MapOdomCorrection::new();
        assert_eq!(c.state(), FilterState::Unseeded);

        let odom = Pose2D::new(1.0, 2.0, 0.0);
        assert_eq!(c.process(odom, &scan(), &Flat, &sink), CycleOutcome::BaselineRecorded);
        assert_eq!(c.state(), FilterState::AwaitingFirstCloud);
        assert!(c.particles().is_empty());
        assert!(sink.latest().is_none());

        let outcome = c.process(odom, &scan(), &Flat, &sink);
        assert_eq!(
            outcome,
            CycleOutcome::CloudInitialized {
                center: odom,
                count: 50
            }
        );
        assert_eq!(c.state(), FilterState::Tracking);
        assert_relative_eq!(c.particles().total_weight(), 1.0, epsilon = 1e-9);
        assert!(c.estimate().is_some());
        assert!(sink.latest().is_some());

        assert_eq!(c.process(odom, &scan(), &Flat, &sink), CycleOutcome::Skipped);
    }

    #[test]
    fn small_motion_is_skipped_and_large_motion_updates() {
        let mut c = controller(30);
        let sink = MapOdomCorrection::new();
        let start = Pose2D::default();
        c.process(start, &scan(), &Flat, &sink);
        c.process(start, &scan(), &Flat, &sink);
        let before = c.particles().clone();

        let nudge = Pose2D::new(0.1, -0.1, 0.2);
        assert_eq!(c.process(nudge, &scan(), &Flat, &sink), CycleOutcome::Skipped);
        assert_eq!(c.particles(), &before);
        assert_eq!(c.odom_baseline(), Some(start));

        let moved = Pose2D::new(0.2, 0.0, 0.0);
        assert!(c.moved_far_enough(&moved));
        match c.process(moved, &scan(), &Flat, &sink) {
            CycleOutcome::Updated { count, estimate } => {
                assert!(count == 30 || count == 20);
                assert!(estimate.is_some());
            }
            other => panic!("expected an update, got {:?}", other),
        }
        assert_eq!(c.odom_baseline(), Some(moved));
        assert_relative_eq!(c.particles().total_weight(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_alone_triggers_update() {
        let mut c = controller(10);
        let sink = MapOdomCorrection::new();
        c.process(Pose2D::default(), &scan(), &Flat, &sink);
        c.process(Pose2D::default(), &scan(), &Flat, &sink);
        assert!(c.moved_far_enough(&Pose2D::new(0.0, 0.0, PI / 6.0)));
        assert!(!c.moved_far_enough(&Pose2D::new(0.0, 0.0, 0.5)));
    }

    #[test]
    fn uniform_scores_keep_particle_count() {
        // Every particle scores the same, so no weight exceeds the threshold.
        let mut c = controller(40);
        let sink = MapOdomCorrection::new();
        c.process(Pose2D::default(), &scan(), &Flat, &sink);
        c.process(Pose2D::default(), &scan(), &Flat, &sink);
        c.process(Pose2D::new(1.0, 0.0, 0.0), &scan(), &Flat, &sink);
        assert_eq!(c.particles().len(), 40);
    }

    #[test]
    fn reseed_before_odometry_is_used_for_first_cloud() {
        let mut c = controller(5);
        let sink = MapOdomCorrection::new();
        let hint = Pose2D::new(-3.0, 4.0, 1.0);
        c.reseed(hint, &sink);
        assert_eq!(c.state(), FilterState::Unseeded);

        c.process(Pose2D::default(), &scan(), &Flat, &sink);
        let outcome = c.process(Pose2D::default(), &scan(), &Flat, &sink);
        assert_eq!(outcome, CycleOutcome::CloudInitialized { center: hint, count: 5 });
    }

    #[test]
    fn reseed_while_tracking_keeps_baseline() {
        let mut c = controller(60);
        let sink = MapOdomCorrection::new();
        let odom = Pose2D::new(0.5, 0.5, 0.1);
        c.process(odom, &scan(), &Flat, &sink);
        c.process(odom, &scan(), &Flat, &sink);

        let hint = Pose2D::new(10.0, 10.0, 0.0);
        c.reseed(hint, &sink);
        assert_eq!(c.state(), FilterState::Tracking);
        assert_eq!(c.odom_baseline(), Some(odom));
        assert_eq!(c.particles().len(), 60);

        let n = c.particles().len() as f64;
        let mean_x = c.particles().iter().map(|p| p.x).sum::<f64>() / n;
        assert!((mean_x - 10.0).abs() < 0.5);
    }

    #[test]
    fn reseed_restores_configured_particle_count() {
        let mut c = controller(60);
        let sink = MapOdomCorrection::new();
        let odom = Pose2D::new(0.0, 0.0, 0.0);
        c.process(odom, &scan(), &Flat, &sink);
        c.process(odom, &scan(), &Flat, &sink);

        // As after a few concentrated resampling rounds.
        c.particles = ParticleSet::new(vec![Particle::new(0.0, 0.0, 0.0, 1.0 / 7.0); 7]);
        c.reseed(Pose2D::new(1.0, 1.0, 0.0), &sink);
        assert_eq!(c.particles().len(), 60);
    }

    #[test]
    fn update_hands_estimate_to_correction() {
        let mut c = controller(1);
        let sink = MapOdomCorrection::new();
        c.process(Pose2D::default(), &scan(), &Flat, &sink);
        c.process(Pose2D::default(), &scan(), &Flat, &sink);

        let only: Particle = c.particles().as_slice()[0];
        let correction = sink.latest().unwrap();
        assert_relative_eq!(correction.x, only.x, epsilon = 1e-12);
        assert_relative_eq!(correction.y, only.y, epsilon = 1e-12);
    }
}
