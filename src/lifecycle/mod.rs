//! Lifecycle management for localizer components

use crate::error::{LocalizationError, Result};
use std::any::Any;

/// Trait for components that follow a lifecycle pattern
pub trait LifecycleNode: Send {
    /// Node name used in logs
    fn name(&self) -> &str;

    /// Configure the node
    fn on_configure(&mut self) -> Result<()>;

    /// Activate the node
    fn on_activate(&mut self) -> Result<()>;

    /// Deactivate the node
    fn on_deactivate(&mut self) -> Result<()>;

    /// Clean up the node
    fn on_cleanup(&mut self) -> Result<()>;

    /// Convert to Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Base implementation for lifecycle nodes
#[derive(Debug)]
pub struct LifecycleNodeBase {
    pub name: String,
    state: State,
}

/// State of a lifecycle node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Inactive,
    Active,
    Finalized,
}

impl State {
    fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Unconfigured, Inactive)
                | (Inactive, Active)
                | (Active, Inactive)
                | (Inactive, Unconfigured)
                | (Unconfigured, Finalized)
                | (Inactive, Finalized)
        )
    }
}

impl LifecycleNodeBase {
    /// Create a new lifecycle node base
    pub fn new(name: &str) -> Self {
        LifecycleNodeBase {
            name: name.to_string(),
            state: State::Unconfigured,
        }
    }

    /// Get the current state
    pub fn get_state(&self) -> State {
        self.state
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, to: State) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(LocalizationError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        log::debug!("{}: {:?} -> {:?}", self.name, self.state, to);
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_configure_activate_cycle() {
        let mut base = LifecycleNodeBase::new("node");
        base.transition(State::Inactive).unwrap();
        base.transition(State::Active).unwrap();
        base.transition(State::Inactive).unwrap();
        base.transition(State::Unconfigured).unwrap();
        assert_eq!(base.get_state(), State::Unconfigured);
    }

    #[test]
    fn rejects_activation_before_configure() {
        let mut base = LifecycleNodeBase::new("node");
        let err = base.transition(State::Active).unwrap_err();
        assert!(matches!(
            err,
            LocalizationError::InvalidTransition {
                from: State::Unconfigured,
                to: State::Active
            }
        ));
        assert_eq!(base.get_state(), State::Unconfigured);
    }
}
