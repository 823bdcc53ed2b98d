//! Perception module for the Prometheus robot
pub mod localization;
pub mod sensors;

use self::localization::{FilterController, PoseEstimate};
use crate::config::LocalizationConfig;
use crate::error::{LocalizationError, Result};
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use crate::runtime::{Collaborators, LocalizationHandle, LocalizationRuntime};
use std::any::Any;

/// Localization stack for the robot
///
/// Configuring builds the particle filter, activating starts the localizer
/// tasks on the ambient tokio runtime, deactivating stops them.
pub struct PerceptionStack {
    base: LifecycleNodeBase,
    config: LocalizationConfig,
    collaborators: Collaborators,
    controller: Option<FilterController>,
    handle: Option<LocalizationHandle>,
}

impl PerceptionStack {
    /// Create a new perception stack
    pub fn new(config: LocalizationConfig, collaborators: Collaborators) -> Self {
        PerceptionStack {
            base: LifecycleNodeBase::new("perception_stack"),
            config,
            collaborators,
            controller: None,
            handle: None,
        }
    }

    pub fn config(&self) -> &LocalizationConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.base.get_state()
    }

    /// Running localizer, present while active
    pub fn handle(&self) -> Option<&LocalizationHandle> {
        self.handle.as_ref()
    }

    /// Get the current pose estimate
    pub fn estimate(&self) -> Option<PoseEstimate> {
        self.handle.as_ref().and_then(LocalizationHandle::estimate)
    }

    /// Stop the localizer tasks and wait for them to finish
    ///
    /// Deactivation only signals the tasks; call this first to observe
    /// worker failures.
    pub async fn stop_runtime(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.shutdown().await,
            None => Ok(()),
        }
    }
}

impl LifecycleNode for PerceptionStack {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn on_configure(&mut self) -> Result<()> {
        self.config.validate()?;
        self.base.transition(State::Inactive)?;
        self.controller = Some(FilterController::new(
            self.config.filter,
            self.config.motion,
            self.config.sensor,
            self.config.resampler,
        ));
        log::info!(
            "Configured perception stack with {} particles",
            self.config.filter.num_particles
        );
        Ok(())
    }

    fn on_activate(&mut self) -> Result<()> {
        if self.controller.is_none() {
            return Err(LocalizationError::NotConfigured("particle filter"));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(LocalizationError::WorkerFailed(
                "activation requires a tokio runtime".to_string(),
            ));
        }
        self.base.transition(State::Active)?;

        let Some(controller) = self.controller.take() else {
            return Err(LocalizationError::NotConfigured("particle filter"));
        };
        self.handle = Some(LocalizationRuntime::spawn(
            &self.config,
            controller,
            self.collaborators.clone(),
        ));
        log::info!("Activated perception stack");
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<()> {
        self.base.transition(State::Inactive)?;
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        // The running filter is gone; a later activation starts from scratch.
        self.controller = Some(FilterController::new(
            self.config.filter,
            self.config.motion,
            self.config.sensor,
            self.config.resampler,
        ));
        log::info!("Deactivated perception stack");
        Ok(())
    }

    fn on_cleanup(&mut self) -> Result<()> {
        self.base.transition(State::Unconfigured)?;
        self.controller = None;
        log::info!("Cleaned up perception stack");
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::sensors::LidarMount;
    use crate::sim::{RecordingOutput, SimulatedWorld};
    use crate::transform::OdometryBuffer;
    use std::sync::Arc;

    fn stack() -> PerceptionStack {
        let world = SimulatedWorld::box_room(4.0, 4.0, 0.2).unwrap();
        PerceptionStack::new(
            LocalizationConfig::default(),
            Collaborators {
                odometry: Arc::new(OdometryBuffer::new(8)),
                converter: Arc::new(LidarMount::default()),
                map: Arc::new(world.occupancy_field().clone()),
                output: Arc::new(RecordingOutput::default()),
            },
        )
    }

    #[test]
    fn activation_requires_configuration() {
        let mut stack = stack();
        assert!(matches!(
            stack.on_activate(),
            Err(LocalizationError::NotConfigured(_))
        ));
        assert_eq!(stack.state(), State::Unconfigured);
    }

    #[test]
    fn activation_requires_runtime() {
        let mut stack = stack();
        stack.on_configure().unwrap();
        assert!(matches!(
            stack.on_activate(),
            Err(LocalizationError::WorkerFailed(_))
        ));
        assert_eq!(stack.state(), State::Inactive);
    }

    #[test]
    fn invalid_config_is_rejected_on_configure() {
        let mut stack = stack();
        stack.config.filter.num_particles = 0;
        assert!(stack.on_configure().is_err());
        assert_eq!(stack.state(), State::Unconfigured);
    }

    #[tokio::test]
    async fn full_lifecycle_on_tokio() {
        let mut stack = stack();
        stack.on_configure().unwrap();
        stack.on_activate().unwrap();
        assert!(stack.handle().is_some());
        assert!(stack.estimate().is_none());

        stack.stop_runtime().await.unwrap();
        stack.on_deactivate().unwrap();
        stack.on_cleanup().unwrap();
        assert_eq!(stack.state(), State::Unconfigured);
    }
}
