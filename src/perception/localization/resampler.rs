//! Multinomial resampling with adaptive shrink

use super::particle::ParticleSet;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Resampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerConfig {
    /// Shrink the set when the largest normalized weight exceeds this
    pub concentration_threshold: f64,
    /// The set never shrinks below this many particles
    pub min_particles: usize,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        ResamplerConfig {
            concentration_threshold: 0.4,
            min_particles: 1,
        }
    }
}

/// Draws a new generation proportionally to weight, with replacement
#[derive(Debug, Clone)]
pub struct Resampler {
    config: ResamplerConfig,
}

impl Resampler {
    /// Create a new resampler
    pub fn new(config: ResamplerConfig) -> Self {
        Resampler { config }
    }

    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    /// Size of the next generation for a normalized set
    ///
    /// A confident set (max weight above the threshold) shrinks to two thirds
    /// of its size, rounded down.
    pub fn target_count(&self, particles: &ParticleSet) -> usize {
        let n = particles.len();
        match particles.max_weight() {
            Some(max) if max > self.config.concentration_threshold => {
                (2 * n / 3).max(self.config.min_particles.min(n))
            }
            _ => n,
        }
    }

    /// Draw the next generation from a normalized set
    ///
    /// Selected particles are copied; the returned weights are the copied
    /// weights and still need normalizing.
    pub fn resample<R: Rng>(&self, particles: &ParticleSet, rng: &mut R) -> ParticleSet {
        let target = self.target_count(particles);
        if target < particles.len() {
            log::info!(
                "Distribution concentrated, shrinking particle set {} -> {}",
                particles.len(),
                target
            );
        }
        if particles.is_empty() {
            return ParticleSet::default();
        }

        let source = particles.as_slice();
        match WeightedIndex::new(source.iter().map(|p| p.weight)) {
            Ok(index) => (0..target).map(|_| source[index.sample(rng)]).collect(),
            Err(e) => {
                log::warn!("Cannot sample by weight ({}), drawing uniformly", e);
                (0..target)
                    .map(|_| source[rng.gen_range(0..source.len())])
                    .collect()
            }
        }
    }
}
