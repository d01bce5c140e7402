use super::{DeviceSource, SocketDevice};
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Name the UDP socket source is registered under
pub const SOCKET_SOURCE: &str = "EphysSocket";

type SourceFactory = Box<dyn Fn() -> Box<dyn DeviceSource> + Send + Sync>;

/// Registry of source factories the host can instantiate by name
pub struct DeviceRegistry {
    sources: HashMap<String, SourceFactory>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Registry with the socket source pre-registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_source(SOCKET_SOURCE, || Box::new(SocketDevice::new()));
        registry
    }

    pub fn register_source<F>(&mut self, device_type: &str, factory: F)
    where
        F: Fn() -> Box<dyn DeviceSource> + Send + Sync + 'static,
    {
        self.sources.insert(device_type.to_string(), Box::new(factory));
    }

    pub fn create_source(&self, device_type: &str) -> Result<Box<dyn DeviceSource>> {
        self.sources
            .get(device_type)
            .ok_or_else(|| anyhow!("Unknown source type: {}", device_type))
            .map(|factory| factory())
    }

    pub fn list_sources(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
