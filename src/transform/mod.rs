//! Frame bookkeeping collaborators: odometry lookup and map->odom correction
pub mod correction;
pub mod odometry;

pub use self::correction::{CorrectionSink, MapOdomCorrection, StampedCorrection};
pub use self::odometry::{OdomLookup, OdometryBuffer, OdometrySource};
