//! Range sensor data and its conversion into the robot frame

use crate::common::types::{Pose2D, Stamp};
use serde::{Deserialize, Serialize};

/// A raw planar laser scan, one range per fixed angular index
#[derive(Debug, Clone, PartialEq)]
pub struct LaserScan {
    pub stamp: Stamp,
    pub frame_id: String,
    pub angle_min: f64,
    pub angle_increment: f64,
    pub range_min: f64,
    pub range_max: f64,
    pub ranges: Vec<f64>,
}

impl LaserScan {
    /// Bearing of beam `index` in the sensor frame
    pub fn bearing(&self, index: usize) -> f64 {
        self.angle_min + index as f64 * self.angle_increment
    }
}

/// A single range reading in the robot body frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beam {
    /// Range in meters
    pub range: f64,
    /// Bearing in radians
    pub bearing: f64,
}

impl Beam {
    pub fn new(range: f64, bearing: f64) -> Self {
        Beam { range, bearing }
    }
}

/// Range readings of one scan in the robot body frame
///
/// May still contain sentinel ranges at or beyond the sensor maximum; the
/// sensor model ignores those.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeMeasurement {
    beams: Vec<Beam>,
}

impl RangeMeasurement {
    pub fn new(beams: Vec<Beam>) -> Self {
        RangeMeasurement { beams }
    }

    /// Pair up parallel range and bearing lists
    pub fn from_polar(ranges: &[f64], bearings: &[f64]) -> Self {
        ranges
            .iter()
            .zip(bearings)
            .map(|(&r, &b)| Beam::new(r, b))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Beam> {
        self.beams.iter()
    }
}

impl FromIterator<Beam> for RangeMeasurement {
    fn from_iter<I: IntoIterator<Item = Beam>>(iter: I) -> Self {
        RangeMeasurement::new(iter.into_iter().collect())
    }
}

/// Converts raw scans into robot-frame `(range, bearing)` pairs
pub trait ScanConverter: Send + Sync {
    fn to_robot_frame(&self, scan: &LaserScan) -> RangeMeasurement;
}

/// Lidar rigidly mounted on the robot base
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LidarMount {
    /// Sensor pose in the base frame
    pub offset: Pose2D,
}

impl LidarMount {
    pub fn new(offset: Pose2D) -> Self {
        LidarMount { offset }
    }
}

impl ScanConverter for LidarMount {
    fn to_robot_frame(&self, scan: &LaserScan) -> RangeMeasurement {
        let mount = self.offset.to_isometry();
        scan.ranges
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_finite() && **r >= scan.range_min)
            .map(|(i, &r)| {
                let (s, c) = scan.bearing(i).sin_cos();
                let p = mount * nalgebra::Point2::new(r * c, r * s);
                Beam::new(p.coords.norm(), p.y.atan2(p.x))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn scan(ranges: Vec<f64>) -> LaserScan {
        LaserScan {
            stamp: 1.0,
            frame_id: "laser".to_string(),
            angle_min: 0.0,
            angle_increment: FRAC_PI_2,
            range_min: 0.1,
            range_max: 12.0,
            ranges,
        }
    }

    #[test]
    fn centered_mount_keeps_polar_readings() {
        let m = LidarMount::default().to_robot_frame(&scan(vec![1.0, 2.0, 3.0]));
        let beams: Vec<_> = m.iter().copied().collect();
        assert_eq!(beams.len(), 3);
        assert_relative_eq!(beams[1].range, 2.0, epsilon = 1e-12);
        assert_relative_eq!(beams[1].bearing, FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(beams[2].bearing, PI, epsilon = 1e-12);
    }

    #[test]
    fn drops_invalid_readings() {
        let raw = scan(vec![0.0, f64::INFINITY, f64::NAN, 4.0]);
        let m = LidarMount::default().to_robot_frame(&raw);
        assert_eq!(m.len(), 1);
        let beam = m.iter().next().unwrap();
        assert_relative_eq!(beam.range, 4.0, epsilon = 1e-12);
        assert_relative_eq!(beam.bearing, -FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn offset_mount_shifts_origin() {
        let mount = LidarMount::new(Pose2D::new(0.5, 0.0, 0.0));
        let m = mount.to_robot_frame(&scan(vec![1.0]));
        let beam = m.iter().next().unwrap();
        assert_relative_eq!(beam.range, 1.5, epsilon = 1e-12);
        assert_relative_eq!(beam.bearing, 0.0, epsilon = 1e-12);
    }
}
