//! One filter cycle: pick up the pending scan, match odometry, update

use super::mailbox::ScanMailbox;
use super::{Collaborators, ParticleCloud};
use crate::common::types::{Pose2D, Stamp};
use crate::perception::localization::{CycleOutcome, FilterController, PoseEstimate};
use crate::transform::{MapOdomCorrection, OdomLookup};
use std::sync::Arc;

/// What a call to [`LocalizationWorker::run_once`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerStep {
    /// No scan pending
    Idle,
    /// Odometry for the pending scan has not arrived; the scan stays pending
    Deferred { stamp: Stamp, delta: Option<f64> },
    /// The scan predates all retained odometry and was dropped
    Discarded { stamp: Stamp },
    Processed { stamp: Stamp, outcome: CycleOutcome },
}

/// Owns the filter and runs it against the mailbox
pub struct LocalizationWorker {
    controller: FilterController,
    collaborators: Collaborators,
    correction: Arc<MapOdomCorrection>,
    mailbox: Arc<ScanMailbox>,
    map_frame: String,
}

impl LocalizationWorker {
    pub fn new(
        controller: FilterController,
        collaborators: Collaborators,
        correction: Arc<MapOdomCorrection>,
        mailbox: Arc<ScanMailbox>,
        map_frame: impl Into<String>,
    ) -> Self {
        LocalizationWorker {
            controller,
            collaborators,
            correction,
            mailbox,
            map_frame: map_frame.into(),
        }
    }

    pub fn controller(&self) -> &FilterController {
        &self.controller
    }

    pub fn estimate(&self) -> Option<PoseEstimate> {
        self.controller.estimate()
    }

    /// Process the pending scan, if its odometry is available
    pub fn run_once(&mut self) -> WorkerStep {
        let Some(scan) = self.mailbox.peek() else {
            return WorkerStep::Idle;
        };

        let lookup = self.collaborators.odometry.matching_odom_pose(scan.stamp);
        let odom = match lookup {
            OdomLookup::Ready(pose) => pose.to_pose2d(),
            OdomLookup::Unavailable { .. } if lookup.is_expired() => {
                log::warn!("Scan stamped {} is older than all odometry, discarding", scan.stamp);
                self.mailbox.clear();
                return WorkerStep::Discarded { stamp: scan.stamp };
            }
            OdomLookup::Unavailable { delta } => {
                log::debug!("No odometry for scan stamped {} yet, deferring", scan.stamp);
                return WorkerStep::Deferred {
                    stamp: scan.stamp,
                    delta,
                };
            }
        };
        self.mailbox.clear();

        let measurement = self.collaborators.converter.to_robot_frame(&scan);
        let outcome = self.controller.process(
            odom,
            &measurement,
            self.collaborators.map.as_ref(),
            self.correction.as_ref(),
        );

        self.collaborators.output.publish_particles(ParticleCloud {
            stamp: scan.stamp,
            frame_id: self.map_frame.clone(),
            poses: self.controller.particles().poses(),
        });

        WorkerStep::Processed {
            stamp: scan.stamp,
            outcome,
        }
    }

    /// Rebuild the particle cloud around `hint`
    pub fn reseed(&mut self, hint: Pose2D) {
        self.controller.reseed(hint, self.correction.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::localization::{
        FilterConfig, FilterState, MotionModelConfig, ResamplerConfig, SensorModelConfig,
    };
    use crate::perception::sensors::{LaserScan, LidarMount};
    use crate::sim::{RecordingOutput, SimulatedWorld};
    use crate::transform::OdometryBuffer;

    struct Fixture {
        worker: LocalizationWorker,
        mailbox: Arc<ScanMailbox>,
        odometry: Arc<OdometryBuffer>,
        output: Arc<RecordingOutput>,
    }

    fn fixture() -> Fixture {
        let world = SimulatedWorld::box_room(6.0, 4.0, 0.1).unwrap();
        let mailbox = Arc::new(ScanMailbox::new());
        let odometry = Arc::new(OdometryBuffer::new(16));
        let output = Arc::new(RecordingOutput::default());
        let collaborators = Collaborators {
            odometry: odometry.clone(),
            converter: Arc::new(LidarMount::default()),
            map: Arc::new(world.occupancy_field().clone()),
            output: output.clone(),
        };
        let controller = FilterController::new(
            FilterConfig {
                num_particles: 20,
                seed: 3,
                ..FilterConfig::default()
            },
            MotionModelConfig::default(),
            SensorModelConfig::default(),
            ResamplerConfig::default(),
        );
        let worker = LocalizationWorker::new(
            controller,
            collaborators,
            Arc::new(MapOdomCorrection::new()),
            mailbox.clone(),
            "map",
        );
        Fixture {
            worker,
            mailbox,
            odometry,
            output,
        }
    }

    fn scan(stamp: Stamp) -> LaserScan {
        LaserScan {
            stamp,
            frame_id: "laser".to_string(),
            angle_min: 0.0,
            angle_increment: 0.5,
            range_min: 0.05,
            range_max: 8.0,
            ranges: vec![1.0; 12],
        }
    }

    #[test]
    fn idle_without_scan() {
        let mut f = fixture();
        assert_eq!(f.worker.run_once(), WorkerStep::Idle);
        assert!(f.output.clouds().is_empty());
    }

    #[test]
    fn defers_until_odometry_arrives() {
        let mut f = fixture();
        f.odometry.push(1.0, Pose2D::default());
        f.mailbox.offer(scan(1.5));

        assert_eq!(
            f.worker.run_once(),
            WorkerStep::Deferred {
                stamp: 1.5,
                delta: Some(0.5)
            }
        );
        assert!(!f.mailbox.is_empty());

        f.odometry.push(2.0, Pose2D::default());
        assert!(matches!(
            f.worker.run_once(),
            WorkerStep::Processed {
                outcome: CycleOutcome::BaselineRecorded,
                ..
            }
        ));
        assert!(f.mailbox.is_empty());
        assert_eq!(f.worker.controller().state(), FilterState::AwaitingFirstCloud);
    }

    #[test]
    fn discards_scans_older_than_odometry() {
        let mut f = fixture();
        f.odometry.push(5.0, Pose2D::default());
        f.mailbox.offer(scan(4.0));
        assert_eq!(f.worker.run_once(), WorkerStep::Discarded { stamp: 4.0 });
        assert!(f.mailbox.is_empty());
        assert!(f.output.clouds().is_empty());
    }

    #[test]
    fn publishes_cloud_every_processed_cycle() {
        let mut f = fixture();
        for i in 0..4 {
            let t = i as f64;
            f.odometry.push(t, Pose2D::new(3.0, 2.0, 0.0));
            f.mailbox.offer(scan(t));
            assert!(matches!(f.worker.run_once(), WorkerStep::Processed { .. }));
        }
        let clouds = f.output.clouds();
        assert_eq!(clouds.len(), 4);
        assert!(clouds[0].poses.is_empty());
        assert_eq!(clouds[1].poses.len(), 20);
        assert_eq!(clouds[3].stamp, 3.0);
        assert_eq!(clouds[3].frame_id, "map");
    }
}
