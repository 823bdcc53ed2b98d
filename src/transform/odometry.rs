//! Odometry pose lookup by timestamp

use crate::common::math::angle_diff;
use crate::common::types::{Pose2D, Pose3D, Stamp};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Outcome of looking up the odometry pose at a scan timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OdomLookup {
    /// Odometry pose of the base at the requested time
    Ready(Pose3D),
    /// No pose for that time. `delta` is the requested time minus the
    /// nearest retained sample; negative means it will never be available.
    Unavailable { delta: Option<f64> },
}

impl OdomLookup {
    /// The requested time predates every retained sample
    pub fn is_expired(&self) -> bool {
        matches!(self, OdomLookup::Unavailable { delta: Some(d) } if *d < 0.0)
    }
}

/// Source of odometry poses interpolated to a timestamp
pub trait OdometrySource: Send + Sync {
    fn matching_odom_pose(&self, stamp: Stamp) -> OdomLookup;
}

/// Bounded, time-ordered history of odometry poses
#[derive(Debug)]
pub struct OdometryBuffer {
    capacity: usize,
    samples: Mutex<VecDeque<(Stamp, Pose2D)>>,
}

impl OdometryBuffer {
    /// Create a buffer retaining at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        OdometryBuffer {
            capacity: capacity.max(1),
            samples: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Append a sample; samples older than the newest one are ignored
    pub fn push(&self, stamp: Stamp, pose: Pose2D) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&(last, _)) = samples.back() {
            if stamp < last {
                log::debug!("Ignoring out-of-order odometry at {} (newest {})", stamp, last);
                return;
            }
        }
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back((stamp, pose));
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OdometrySource for OdometryBuffer {
    fn matching_odom_pose(&self, stamp: Stamp) -> OdomLookup {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(&(first, _)), Some(&(last, _))) = (samples.front(), samples.back()) else {
            return OdomLookup::Unavailable { delta: None };
        };
        if stamp < first {
            return OdomLookup::Unavailable {
                delta: Some(stamp - first),
            };
        }
        if stamp > last {
            return OdomLookup::Unavailable {
                delta: Some(stamp - last),
            };
        }

        let after = samples.partition_point(|&(t, _)| t < stamp);
        let (t1, p1) = samples[after];
        if t1 == stamp || after == 0 {
            return OdomLookup::Ready(Pose3D::from_pose2d(&p1));
        }
        let (t0, p0) = samples[after - 1];
        let s = (stamp - t0) / (t1 - t0);
        let pose = Pose2D::new(
            p0.x + s * (p1.x - p0.x),
            p0.y + s * (p1.y - p0.y),
            p0.theta + s * angle_diff(p0.theta, p1.theta),
        );
        OdomLookup::Ready(Pose3D::from_pose2d(&pose))
    }
}
