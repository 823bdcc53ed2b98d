//! Common utilities and types for the Prometheus localizer

/// Common types used across the codebase
pub mod types {
    use nalgebra::{Isometry2, Matrix3, Point3, UnitQuaternion, Vector2};
    use serde::{Deserialize, Serialize};

    /// Message timestamp in seconds
    pub type Stamp = f64;

    /// A planar pose (x, y, theta)
    ///
    /// `theta` is not wrapped; callers that need a canonical heading use
    /// [`super::math::normalize_angle`].
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Pose2D {
        pub x: f64,
        pub y: f64,
        pub theta: f64,
    }

    impl Pose2D {
        /// Create a new pose
        pub fn new(x: f64, y: f64, theta: f64) -> Self {
            Pose2D { x, y, theta }
        }

        /// Rigid transform taking points from this pose's frame to its parent frame
        pub fn to_isometry(&self) -> Isometry2<f64> {
            Isometry2::new(Vector2::new(self.x, self.y), self.theta)
        }

        /// Build a pose from a rigid transform
        pub fn from_isometry(iso: &Isometry2<f64>) -> Self {
            Pose2D {
                x: iso.translation.x,
                y: iso.translation.y,
                theta: iso.rotation.angle(),
            }
        }

        /// 3x3 homogeneous matrix of this pose
        pub fn to_homogeneous(&self) -> Matrix3<f64> {
            let (s, c) = self.theta.sin_cos();
            Matrix3::new(c, -s, self.x, s, c, self.y, 0.0, 0.0, 1.0)
        }

        /// Euclidean distance between the positions of two poses
        pub fn distance_to(&self, other: &Pose2D) -> f64 {
            (self.x - other.x).hypot(self.y - other.y)
        }
    }

    /// A full 3D pose as carried by pose messages
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Pose3D {
        pub position: Point3<f64>,
        pub orientation: UnitQuaternion<f64>,
    }

    impl Pose3D {
        /// Create a new 3D pose
        pub fn new(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
            Pose3D {
                position,
                orientation,
            }
        }

        /// Lift a planar pose onto the ground plane, yaw about +z
        pub fn from_pose2d(pose: &Pose2D) -> Self {
            Pose3D {
                position: Point3::new(pose.x, pose.y, 0.0),
                orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, pose.theta),
            }
        }

        /// Project onto the ground plane, keeping only yaw
        pub fn to_pose2d(&self) -> Pose2D {
            let (_, _, yaw) = self.orientation.euler_angles();
            Pose2D::new(self.position.x, self.position.y, yaw)
        }
    }

    impl Default for Pose3D {
        fn default() -> Self {
            Pose3D::new(Point3::origin(), UnitQuaternion::identity())
        }
    }
}

/// Angle helpers
pub mod math {
    use std::f64::consts::PI;

    /// Wrap an angle to [-pi, pi]
    pub fn normalize_angle(angle: f64) -> f64 {
        let mut a = angle % (2.0 * PI);
        if a > PI {
            a -= 2.0 * PI;
        } else if a < -PI {
            a += 2.0 * PI;
        }
        a
    }

    /// Signed shortest rotation taking `from` to `to`
    pub fn angle_diff(from: f64, to: f64) -> f64 {
        normalize_angle(to - from)
    }
}

#[cfg(test)]
mod tests {
    use super::math::{angle_diff, normalize_angle};
    use super::types::{Pose2D, Pose3D};
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn pose3d_roundtrip_keeps_yaw() {
        let pose = Pose2D::new(1.5, -2.0, 2.5);
        let lifted = Pose3D::from_pose2d(&pose);
        assert_relative_eq!(lifted.orientation.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(lifted.orientation.k, (2.5f64 / 2.0).sin(), epsilon = 1e-12);

        let back = lifted.to_pose2d();
        assert_relative_eq!(back.x, 1.5);
        assert_relative_eq!(back.y, -2.0);
        assert_relative_eq!(back.theta, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn homogeneous_matches_isometry() {
        let pose = Pose2D::new(0.3, 0.7, FRAC_PI_2);
        let m = pose.to_homogeneous();
        let iso = pose.to_isometry().to_homogeneous();
        assert_relative_eq!(m, iso, epsilon = 1e-12);
    }

    #[test]
    fn angles_wrap() {
        assert_relative_eq!(normalize_angle(2.5 * PI), FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-FRAC_PI_2), -FRAC_PI_2);
        assert_relative_eq!(angle_diff(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-12);
    }
}
