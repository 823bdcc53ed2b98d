//! Best pose extraction

use super::particle::ParticleSet;
use crate::common::types::Pose2D;

/// Pose of the most likely particle and its index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    pub index: usize,
    pub pose: Pose2D,
    pub weight: f64,
}

/// Reduces a particle set to its mode
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseEstimator;

impl PoseEstimator {
    pub fn new() -> Self {
        PoseEstimator
    }

    /// Highest-weight particle; the first one wins a tie
    ///
    /// Returns `None` for an empty set or when no weight is comparable.
    pub fn estimate(&self, particles: &ParticleSet) -> Option<PoseEstimate> {
        let mut best: Option<PoseEstimate> = None;
        for (index, p) in particles.iter().enumerate() {
            if p.weight.is_nan() {
                continue;
            }
            if best.map_or(true, |b| p.weight > b.weight) {
                best = Some(PoseEstimate {
                    index,
                    pose: p.pose(),
                    weight: p.weight,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::localization::particle::Particle;

    #[test]
    fn picks_the_heaviest_particle() {
        let set = ParticleSet::new(vec![
            Particle::new(0.0, 0.0, 0.0, 0.2),
            Particle::new(1.0, 1.0, 1.0, 0.3),
            Particle::new(2.0, 2.0, 2.0, 0.5),
        ]);
        let est = PoseEstimator::new().estimate(&set).unwrap();
        assert_eq!(est.index, 2);
        assert_eq!(est.pose, Pose2D::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let set = ParticleSet::new(vec![
            Particle::new(0.0, 0.0, 0.0, 0.1),
            Particle::new(1.0, 0.0, 0.0, 0.45),
            Particle::new(2.0, 0.0, 0.0, 0.45),
        ]);
        assert_eq!(PoseEstimator::new().estimate(&set).unwrap().index, 1);
    }

    #[test]
    fn empty_set_has_no_estimate() {
        assert!(PoseEstimator::new().estimate(&ParticleSet::default()).is_none());
    }
}
