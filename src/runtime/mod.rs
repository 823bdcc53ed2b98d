//! Periodic tasks driving the localizer
//!
//! Two tokio tasks run side by side. The worker polls the scan mailbox and
//! runs filter cycles at `worker_period`. The correction publisher re-sends the
//! latest map->odom correction at `correction_period`, stamped slightly ahead
//! of the last scan. Both stop when the [`LocalizationHandle`] is shut down or
//! dropped.
//!
//! A panic inside a filter cycle stops the worker and is recorded on the
//! handle, see [`LocalizationHandle::check`]. The correction publisher stops
//! with it so no frozen correction keeps going out.
pub mod mailbox;
pub mod worker;

pub use self::mailbox::ScanMailbox;
pub use self::worker::{LocalizationWorker, WorkerStep};

use crate::common::types::{Pose2D, Pose3D, Stamp};
use crate::config::LocalizationConfig;
use crate::error::{LocalizationError, Result};
use crate::map::ObstacleDistance;
use crate::perception::localization::{FilterController, PoseEstimate};
use crate::perception::sensors::{LaserScan, ScanConverter};
use crate::transform::{MapOdomCorrection, OdometrySource, StampedCorrection};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

/// Particle poses of one cycle, for visualization
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleCloud {
    pub stamp: Stamp,
    pub frame_id: String,
    pub poses: Vec<Pose3D>,
}

/// Where the localizer sends what it produces
pub trait LocalizationOutput: Send + Sync {
    fn publish_particles(&self, cloud: ParticleCloud);
    fn publish_correction(&self, correction: StampedCorrection);
}

/// External services the localizer depends on
#[derive(Clone)]
pub struct Collaborators {
    pub odometry: Arc<dyn OdometrySource>,
    pub converter: Arc<dyn ScanConverter>,
    pub map: Arc<dyn ObstacleDistance>,
    pub output: Arc<dyn LocalizationOutput>,
}

/// Starts the localizer tasks
pub struct LocalizationRuntime;

impl LocalizationRuntime {
    /// Spawn the worker and correction publisher on the current tokio runtime
    ///
    /// Panics if called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn(
        config: &LocalizationConfig,
        controller: FilterController,
        collaborators: Collaborators,
    ) -> LocalizationHandle {
        let mailbox = Arc::new(ScanMailbox::new());
        let correction = Arc::new(MapOdomCorrection::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reseed_tx, reseed_rx) = mpsc::unbounded_channel();
        let (estimate_tx, estimate_rx) = watch::channel(None);
        let (failure_tx, failure_rx) = watch::channel(None);

        let worker = LocalizationWorker::new(
            controller,
            collaborators.clone(),
            correction.clone(),
            mailbox.clone(),
            config.frames.map_frame.clone(),
        );
        let worker = tokio::spawn(run_worker(
            worker,
            config.timing.worker_interval(),
            reseed_rx,
            estimate_tx,
            failure_tx,
            shutdown_rx.clone(),
        ));

        let publisher = tokio::spawn(run_correction_publisher(
            CorrectionPublisher {
                correction: correction.clone(),
                mailbox: mailbox.clone(),
                output: collaborators.output,
                map_frame: config.frames.map_frame.clone(),
                odom_frame: config.frames.odom_frame.clone(),
                lead: config.timing.correction_lead,
            },
            config.timing.correction_interval(),
            failure_rx.clone(),
            shutdown_rx,
        ));

        LocalizationHandle {
            mailbox,
            correction,
            reseed_tx,
            estimate_rx,
            failure_rx,
            shutdown_tx,
            worker,
            publisher,
        }
    }
}

/// Control surface of running localizer tasks
pub struct LocalizationHandle {
    mailbox: Arc<ScanMailbox>,
    correction: Arc<MapOdomCorrection>,
    reseed_tx: mpsc::UnboundedSender<Pose2D>,
    estimate_rx: watch::Receiver<Option<PoseEstimate>>,
    failure_rx: watch::Receiver<Option<String>>,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
    publisher: JoinHandle<()>,
}

impl LocalizationHandle {
    /// Hand a new scan to the worker; dropped if one is still pending
    pub fn offer_scan(&self, scan: LaserScan) -> bool {
        self.mailbox.offer(scan)
    }

    /// Re-seed the particle cloud around `hint`
    pub fn set_pose(&self, hint: Pose2D) -> Result<()> {
        self.reseed_tx
            .send(hint)
            .map_err(|_| LocalizationError::WorkerFailed("worker is not running".to_string()))
    }

    /// Latest pose estimate
    pub fn estimate(&self) -> Option<PoseEstimate> {
        *self.estimate_rx.borrow()
    }

    /// Receiver notified on every new estimate
    pub fn subscribe_estimates(&self) -> watch::Receiver<Option<PoseEstimate>> {
        self.estimate_rx.clone()
    }

    /// Whether the worker task is still alive
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Reason the worker stopped on its own, if it did
    pub fn failure(&self) -> Option<String> {
        self.failure_rx.borrow().clone()
    }

    /// Fail if the worker died without being asked to stop
    pub fn check(&self) -> Result<()> {
        if let Some(reason) = self.failure() {
            return Err(LocalizationError::WorkerFailed(reason));
        }
        if self.worker.is_finished() && !*self.shutdown_tx.borrow() {
            return Err(LocalizationError::WorkerFailed(
                "worker task exited unexpectedly".to_string(),
            ));
        }
        Ok(())
    }

    /// Latest map->odom correction
    pub fn correction(&self) -> Option<Pose2D> {
        self.correction.latest()
    }

    /// Ask both tasks to stop after their current iteration
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Stop both tasks and wait for them
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        let worker = self.worker.await.map_err(|e| task_failed("worker", e));
        let publisher = self.publisher.await.map_err(|e| task_failed("correction publisher", e));
        if let Some(reason) = self.failure_rx.borrow().clone() {
            return Err(LocalizationError::WorkerFailed(reason));
        }
        worker.and(publisher)
    }
}

/// Run one worker step, turning a panic into an error message
fn guarded<T>(what: &str, step: impl FnOnce() -> T) -> std::result::Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(step))
        .map_err(|payload| format!("{} panicked: {}", what, panic_reason(payload.as_ref())))
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown cause".to_string()
    }
}

fn task_failed(task: &str, err: JoinError) -> LocalizationError {
    if err.is_panic() {
        LocalizationError::WorkerFailed(format!("{} task panicked", task))
    } else {
        LocalizationError::WorkerFailed(format!("{} task was cancelled", task))
    }
}

async fn run_worker(
    mut worker: LocalizationWorker,
    period: Duration,
    mut reseed_rx: mpsc::UnboundedReceiver<Pose2D>,
    estimate_tx: watch::Sender<Option<PoseEstimate>>,
    failure_tx: watch::Sender<Option<String>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::info!("Localization worker started, period {:?}", period);

    let outcome = loop {
        tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            Some(hint) = reseed_rx.recv() => {
                log::info!("Re-seeding particles around {:?}", hint);
                if let Err(reason) = guarded("re-seed", || worker.reseed(hint)) {
                    break Err(reason);
                }
                estimate_tx.send_replace(worker.estimate());
            }
            _ = ticker.tick() => {
                match guarded("filter cycle", || worker.run_once()) {
                    Ok(WorkerStep::Processed { .. }) => {
                        estimate_tx.send_replace(worker.estimate());
                    }
                    Ok(_) => {}
                    Err(reason) => break Err(reason),
                }
            }
        }
    };

    match outcome {
        Ok(()) => log::info!("Localization worker stopped"),
        Err(reason) => {
            log::error!("Localization worker failed: {}", reason);
            // The filter state is unknown now, stop serving its last estimate.
            estimate_tx.send_replace(None);
            failure_tx.send_replace(Some(reason));
        }
    }
}

struct CorrectionPublisher {
    correction: Arc<MapOdomCorrection>,
    mailbox: Arc<ScanMailbox>,
    output: Arc<dyn LocalizationOutput>,
    map_frame: String,
    odom_frame: String,
    lead: f64,
}

impl CorrectionPublisher {
    /// Publish the correction if a scan has been seen and an estimate exists
    fn publish(&self) -> bool {
        let Some(last_scan) = self.mailbox.last_stamp() else {
            return false;
        };
        match self
            .correction
            .stamped(last_scan + self.lead, &self.map_frame, &self.odom_frame)
        {
            Some(msg) => {
                self.output.publish_correction(msg);
                true
            }
            None => false,
        }
    }
}

async fn run_correction_publisher(
    publisher: CorrectionPublisher,
    period: Duration,
    mut worker_failure: watch::Receiver<Option<String>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            // Fires on a recorded failure and when the worker task is gone.
            _ = worker_failure.changed() => break,
            _ = ticker.tick() => {
                publisher.publish();
            }
        }
    }
    log::debug!("Correction publisher stopped");
}
