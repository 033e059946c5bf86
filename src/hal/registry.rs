use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

use super::mock::{SimulatedDriver, SimulatedProfile};
use super::traits::AcquisitionDriver;
use super::types::BackendKind;

pub type DriverFactory = Box<dyn Fn() -> Result<Arc<dyn AcquisitionDriver>> + Send + Sync>;

/// Factories for the backend families, keyed by [`BackendKind`]
pub struct DriverRegistry {
    factories: HashMap<BackendKind, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with an in-process simulated driver for every backend
    pub fn with_simulated_backends() -> Self {
        let mut registry = Self::new();
        for kind in BackendKind::ALL {
            registry.register(kind, move || {
                let driver = SimulatedDriver::new(SimulatedProfile::for_backend(kind))?;
                Ok(Arc::new(driver) as Arc<dyn AcquisitionDriver>)
            });
        }
        registry
    }

    pub fn register<F>(&mut self, kind: BackendKind, factory: F)
    where
        F: Fn() -> Result<Arc<dyn AcquisitionDriver>> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn create(&self, kind: BackendKind) -> Result<Arc<dyn AcquisitionDriver>> {
        self.factories
            .get(&kind)
            .ok_or_else(|| anyhow!("No driver registered for backend: {}", kind))
            .and_then(|factory| factory())
    }

    pub fn list_backends(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.name());
        kinds
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
