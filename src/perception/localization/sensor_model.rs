//! Range sensor model
//!
//! Each particle starts from a score of 1.0. Every beam shorter than the
//! trusted maximum is projected into the map from the particle's pose; when
//! the map knows the distance from the endpoint to the closest obstacle, the
//! cubed Gaussian likelihood of that distance is added to the score. The
//! combination is additive, not a product of likelihoods, and the 1.0 floor
//! keeps every weight strictly positive.

use super::particle::{Particle, ParticleSet};
use crate::map::ObstacleDistance;
use crate::perception::sensors::RangeMeasurement;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Score every particle starts from before any beam is counted
pub const BASE_SCORE: f64 = 1.0;

/// Sensor model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorModelConfig {
    /// Standard deviation of the endpoint-to-obstacle kernel (m)
    pub sigma: f64,
    /// Beams at or beyond this range are ignored (m)
    pub max_range: f64,
}

impl Default for SensorModelConfig {
    fn default() -> Self {
        SensorModelConfig {
            sigma: 0.1,
            max_range: 10.0,
        }
    }
}

/// Scores particles against a range scan
#[derive(Debug, Clone)]
pub struct SensorModel {
    config: SensorModelConfig,
}

impl SensorModel {
    /// Create a new sensor model
    pub fn new(config: SensorModelConfig) -> Self {
        SensorModel { config }
    }

    pub fn config(&self) -> &SensorModelConfig {
        &self.config
    }

    /// Contribution of one beam whose endpoint lies `distance` from an obstacle
    pub fn beam_contribution(&self, distance: f64) -> f64 {
        let sigma = self.config.sigma;
        let v = (-(distance * distance) / (2.0 * sigma * sigma)).exp() / (2.0 * PI * sigma).sqrt();
        v.powi(3)
    }

    /// Unnormalized score of a single particle
    pub fn score(
        &self,
        particle: &Particle,
        scan: &RangeMeasurement,
        map: &dyn ObstacleDistance,
    ) -> f64 {
        scan.iter()
            .filter(|beam| beam.range < self.config.max_range)
            .filter_map(|beam| {
                let heading = beam.bearing + particle.theta;
                let mx = particle.x + beam.range * heading.cos();
                let my = particle.y + beam.range * heading.sin();
                map.closest_obstacle_distance(mx, my)
                    .filter(|d| !d.is_nan())
            })
            .fold(BASE_SCORE, |acc, d| acc + self.beam_contribution(d))
    }

    /// Overwrite every particle's weight with its score
    pub fn weigh(
        &self,
        particles: &mut ParticleSet,
        scan: &RangeMeasurement,
        map: &dyn ObstacleDistance,
    ) {
        for p in particles.iter_mut() {
            p.weight = self.score(p, scan, map);
        }
    }
}
