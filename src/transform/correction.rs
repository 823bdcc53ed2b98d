//! Map to odometry frame correction
//!
//! Odometry drifts; the localizer's estimate does not. The correction is the
//! transform that, composed with the current odometry pose, puts the robot at
//! the estimated map pose.

use crate::common::types::{Pose2D, Stamp};
use nalgebra::Isometry2;
use std::sync::{Mutex, PoisonError};

/// Receives each new pose estimate together with the odometry pose it was computed at
pub trait CorrectionSink: Send + Sync {
    fn fix_map_to_odom(&self, estimate: &Pose2D, odom: &Pose2D);
}

/// A correction ready to be broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct StampedCorrection {
    pub stamp: Stamp,
    pub parent_frame: String,
    pub child_frame: String,
    /// Pose of the odometry frame in the map frame
    pub transform: Pose2D,
}

/// Keeps the latest map->odom correction
#[derive(Debug, Default)]
pub struct MapOdomCorrection {
    latest: Mutex<Option<Isometry2<f64>>>,
}

impl MapOdomCorrection {
    pub fn new() -> Self {
        MapOdomCorrection::default()
    }

    /// Latest correction as a pose of the odometry frame in the map frame
    pub fn latest(&self) -> Option<Pose2D> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Pose2D::from_isometry)
    }

    /// Latest correction stamped for broadcast
    pub fn stamped(&self, stamp: Stamp, map_frame: &str, odom_frame: &str) -> Option<StampedCorrection> {
        self.latest().map(|transform| StampedCorrection {
            stamp,
            parent_frame: map_frame.to_string(),
            child_frame: odom_frame.to_string(),
            transform,
        })
    }
}

impl CorrectionSink for MapOdomCorrection {
    fn fix_map_to_odom(&self, estimate: &Pose2D, odom: &Pose2D) {
        let map_to_odom = estimate.to_isometry() * odom.to_isometry().inverse();
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(map_to_odom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn correction_maps_odom_pose_onto_estimate() {
        let correction = MapOdomCorrection::new();
        assert!(correction.latest().is_none());

        let estimate = Pose2D::new(4.0, 1.0, FRAC_PI_2);
        let odom = Pose2D::new(1.0, -2.0, 0.3);
        correction.fix_map_to_odom(&estimate, &odom);

        let map_to_odom = correction.latest().unwrap().to_isometry();
        let recovered = Pose2D::from_isometry(&(map_to_odom * odom.to_isometry()));
        assert_relative_eq!(recovered.x, estimate.x, epsilon = 1e-12);
        assert_relative_eq!(recovered.y, estimate.y, epsilon = 1e-12);
        assert_relative_eq!(recovered.theta, estimate.theta, epsilon = 1e-12);
    }

    #[test]
    fn stamped_carries_frames() {
        let correction = MapOdomCorrection::new();
        assert!(correction.stamped(1.0, "map", "odom").is_none());
        correction.fix_map_to_odom(&Pose2D::new(1.0, 0.0, 0.0), &Pose2D::default());

        let msg = correction.stamped(1.1, "map", "odom").unwrap();
        assert_eq!(msg.parent_frame, "map");
        assert_eq!(msg.child_frame, "odom");
        assert_relative_eq!(msg.transform.x, 1.0);
    }
}
