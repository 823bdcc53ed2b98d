//! Monte Carlo Localization
//!
//! A particle filter over planar robot poses. Particles are advanced by
//! odometry, weighed against a range scan and an obstacle distance field,
//! and resampled. The most likely particle is the pose estimate.
pub mod controller;
pub mod estimator;
pub mod motion_model;
pub mod particle;
pub mod resampler;
pub mod sensor_model;

pub use self::controller::{CycleOutcome, FilterConfig, FilterController, FilterState};
pub use self::estimator::{PoseEstimate, PoseEstimator};
pub use self::motion_model::{MotionModel, MotionModelConfig, OdometryDelta};
pub use self::particle::{Normalization, Particle, ParticleSet};
pub use self::resampler::{Resampler, ResamplerConfig};
pub use self::sensor_model::{SensorModel, SensorModelConfig};
