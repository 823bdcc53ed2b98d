//! Monte Carlo Localization for the Prometheus mobile robot
pub mod common;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod map;
pub mod perception;
pub mod runtime;
pub mod sim;
pub mod transform;

use crate::error::Result;
use crate::lifecycle::LifecycleNode;
use crate::perception::PerceptionStack;

/// Core functionality for the Prometheus localizer
#[derive(Default)]
pub struct MclCore {
    components: Vec<Box<dyn LifecycleNode>>,
}

impl MclCore {
    /// Create a new instance of MclCore
    pub fn new() -> Self {
        MclCore::default()
    }

    /// Register a component with the core
    pub fn register<T: LifecycleNode + 'static>(&mut self, component: T) {
        log::debug!("Registered {}", component.name());
        self.components.push(Box::new(component));
    }

    /// Configure and activate all registered components, in registration order
    pub fn init(&mut self) -> Result<()> {
        for component in &mut self.components {
            component.on_configure()?;
            component.on_activate()?;
        }
        log::info!("Initialized {} components", self.components.len());
        Ok(())
    }

    /// Deactivate and clean up all registered components, in reverse order
    pub fn shutdown(&mut self) -> Result<()> {
        for component in self.components.iter_mut().rev() {
            component.on_deactivate()?;
            component.on_cleanup()?;
        }
        log::info!("Shut down {} components", self.components.len());
        Ok(())
    }

    /// Get a reference to the perception stack
    pub fn perception_stack_mut(&mut self) -> Option<&mut PerceptionStack> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<PerceptionStack>())
    }
}
