//! Odometry motion model
//!
//! Particles are advanced by the rigid displacement between two odometry
//! samples, expressed in the earlier sample's frame and replayed in each
//! particle's own frame, then perturbed with independent Gaussian noise.

use super::particle::{gaussian, ParticleSet};
use crate::common::types::Pose2D;
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Process noise of the motion model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionModelConfig {
    /// Standard deviation added independently to x and y (m)
    pub position_noise: f64,
    /// Standard deviation added to theta (rad)
    pub heading_noise: f64,
}

impl Default for MotionModelConfig {
    fn default() -> Self {
        MotionModelConfig {
            position_noise: 0.1,
            heading_noise: 0.05,
        }
    }
}

/// Rigid displacement between two odometry samples, in the earlier sample's frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryDelta {
    pub dx: f64,
    pub dy: f64,
    /// Raw heading difference, not wrapped
    pub dtheta: f64,
}

impl OdometryDelta {
    /// Displacement taking `prev` to `curr`: `inverse(T_prev) * T_curr`
    pub fn between(prev: &Pose2D, curr: &Pose2D) -> Self {
        let relative = relative_transform(prev, curr);
        OdometryDelta {
            dx: relative[(0, 2)],
            dy: relative[(1, 2)],
            dtheta: curr.theta - prev.theta,
        }
    }
}

/// Homogeneous transform from `prev` to `curr`
pub fn relative_transform(prev: &Pose2D, curr: &Pose2D) -> Matrix3<f64> {
    // A 2D rigid transform is always invertible.
    let prev_inv = prev.to_isometry().inverse().to_homogeneous();
    prev_inv * curr.to_homogeneous()
}

/// Odometry motion model
#[derive(Debug, Clone)]
pub struct MotionModel {
    config: MotionModelConfig,
    baseline: Option<Pose2D>,
}

impl MotionModel {
    /// Create a motion model with no odometry baseline
    pub fn new(config: MotionModelConfig) -> Self {
        MotionModel {
            config,
            baseline: None,
        }
    }

    pub fn config(&self) -> &MotionModelConfig {
        &self.config
    }

    /// Odometry pose at the last particle update
    pub fn baseline(&self) -> Option<Pose2D> {
        self.baseline
    }

    /// Record `odom` as the baseline without touching any particle
    pub fn set_baseline(&mut self, odom: Pose2D) {
        self.baseline = Some(odom);
    }

    /// Advance every particle by the odometry change since the baseline
    ///
    /// The first call only records the baseline and returns `None`.
    pub fn apply<R: Rng>(
        &mut self,
        odom: Pose2D,
        particles: &mut ParticleSet,
        rng: &mut R,
    ) -> Option<OdometryDelta> {
        let Some(prev) = self.baseline.replace(odom) else {
            log::debug!("Recorded odometry baseline {:?}", odom);
            return None;
        };

        let delta = OdometryDelta::between(&prev, &odom);
        let step = Vector3::new(delta.dx, delta.dy, 1.0);

        for p in particles.iter_mut() {
            let moved = p.pose().to_homogeneous() * step;
            p.x = moved.x + gaussian(rng, self.config.position_noise);
            p.y = moved.y + gaussian(rng, self.config.position_noise);
            p.theta += delta.dtheta + gaussian(rng, self.config.heading_noise);
        }

        Some(delta)
    }
}
