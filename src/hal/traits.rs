use async_trait::async_trait;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::DataFrame;

/// Lifecycle state of a pluggable source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Unopened,
    Opened,
    Running,
    Stopped,
    Closed,
    Error(String),
}

/// Trait implemented by every source the host pipeline can plug in
#[async_trait]
pub trait DeviceSource: Send {
    /// Apply a JSON configuration; only valid before open or while stopped
    async fn configure(&mut self, config: Value) -> Result<()>;

    /// Acquire resources (sockets, buffers)
    async fn open(&mut self) -> Result<()>;

    /// Begin streaming
    async fn start(&mut self) -> Result<()>;

    /// Wait for the next frame of samples
    async fn read_frame(&mut self) -> Result<DataFrame>;

    /// Stop streaming; a stopped source can be started again
    async fn stop(&mut self) -> Result<()>;

    /// Release resources
    async fn close(&mut self) -> Result<()>;

    fn state(&self) -> DeviceState;
}
