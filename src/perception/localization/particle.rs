//! Particle and particle set

use crate::common::types::{Pose2D, Pose3D};
use rand::Rng;
use rand_distr::StandardNormal;

/// A hypothesis of the robot pose in the map frame
///
/// The weight is not kept normalized; see [`ParticleSet::normalize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub weight: f64,
}

impl Particle {
    /// Create a new particle
    pub fn new(x: f64, y: f64, theta: f64, weight: f64) -> Self {
        Particle { x, y, theta, weight }
    }

    /// Planar pose of this particle
    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.theta)
    }

    /// Map-frame pose with the heading as a rotation about +z
    pub fn as_pose(&self) -> Pose3D {
        Pose3D::from_pose2d(&self.pose())
    }
}

/// Result of [`ParticleSet::normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Weights were divided by their positive sum
    Scaled,
    /// The sum was zero or not finite; every weight was reset to 1/N
    UniformFallback,
    /// Nothing to normalize
    Empty,
}

/// Ordered collection of particles
///
/// Order carries no meaning but is stable within a cycle, so index based
/// selection is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleSet {
    particles: Vec<Particle>,
}

impl ParticleSet {
    /// Wrap an existing list of particles
    pub fn new(particles: Vec<Particle>) -> Self {
        ParticleSet { particles }
    }

    /// Draw `count` particles from independent Gaussians around `center`
    ///
    /// Every particle starts with weight `1 / count`.
    pub fn around<R: Rng>(
        center: &Pose2D,
        count: usize,
        spread_xy: f64,
        spread_theta: f64,
        rng: &mut R,
    ) -> Self {
        let weight = 1.0 / count.max(1) as f64;
        let particles = (0..count)
            .map(|_| {
                Particle::new(
                    center.x + gaussian(rng, spread_xy),
                    center.y + gaussian(rng, spread_xy),
                    center.theta + gaussian(rng, spread_theta),
                    weight,
                )
            })
            .collect();
        ParticleSet { particles }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Particle> {
        self.particles.iter_mut()
    }

    /// Particle at `index`
    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    /// Map-frame poses of all particles, in order
    pub fn poses(&self) -> Vec<Pose3D> {
        self.particles.iter().map(Particle::as_pose).collect()
    }

    /// Current weights, in order
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.particles.iter().map(|p| p.weight).sum()
    }

    /// Largest weight, or `None` for an empty set
    pub fn max_weight(&self) -> Option<f64> {
        self.particles.iter().map(|p| p.weight).reduce(f64::max)
    }

    /// Scale weights so they sum to one
    ///
    /// A zero or non-finite total cannot be scaled; the set falls back to a
    /// uniform distribution instead.
    pub fn normalize(&mut self) -> Normalization {
        if self.particles.is_empty() {
            return Normalization::Empty;
        }

        let total = self.total_weight();
        if total > 0.0 && total.is_finite() {
            for p in &mut self.particles {
                p.weight /= total;
            }
            Normalization::Scaled
        } else {
            log::warn!(
                "Particle weights sum to {}, falling back to uniform weights",
                total
            );
            let uniform = 1.0 / self.particles.len() as f64;
            for p in &mut self.particles {
                p.weight = uniform;
            }
            Normalization::UniformFallback
        }
    }
}

impl FromIterator<Particle> for ParticleSet {
    fn from_iter<I: IntoIterator<Item = Particle>>(iter: I) -> Self {
        ParticleSet::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ParticleSet {
    type Item = &'a Particle;
    type IntoIter = std::slice::Iter<'a, Particle>;

    fn into_iter(self) -> Self::IntoIter {
        self.particles.iter()
    }
}

/// Zero-mean Gaussian sample; exactly zero when `sigma` is zero
pub(crate) fn gaussian<R: Rng>(rng: &mut R, sigma: f64) -> f64 {
    if sigma == 0.0 {
        return 0.0;
    }
    let n: f64 = rng.sample(StandardNormal);
    n * sigma
}
