use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use crossbeam_channel::Receiver;
use serde_json::Value;

use super::{DeviceSource, DeviceState};
use crate::acquisition::SocketSource;
use crate::config::{SocketConfig, INITIAL_SINK_CAPACITY};
use crate::core::DataFrame;
use crate::sink::DataBuffer;
use crate::status::ChannelStatus;

/// Delay between sink polls while waiting for the next frame
const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Host adapter exposing a [`SocketSource`] as a pluggable [`DeviceSource`].
///
/// Socket work blocks (command writes wait for writability, rebinds wait for
/// first data), so start/stop run on tokio's blocking pool.
pub struct SocketDevice {
    state: DeviceState,
    config: SocketConfig,
    buffer: Arc<DataBuffer>,
    status: ChannelStatus,
    status_rx: Receiver<String>,
    source: Option<SocketSource>,
    frame_counter: u64,
}

impl SocketDevice {
    pub fn new() -> Self {
        let config = SocketConfig::default();
        let (status, status_rx) = ChannelStatus::new();
        Self {
            state: DeviceState::Unopened,
            buffer: Arc::new(DataBuffer::new(
                config.acquisition.channel_count,
                INITIAL_SINK_CAPACITY,
            )),
            config,
            status,
            status_rx,
            source: None,
            frame_counter: 0,
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn source(&self) -> Option<&SocketSource> {
        self.source.as_ref()
    }

    /// Status messages reported since the last call
    pub fn drain_status(&self) -> Vec<String> {
        self.status_rx.try_iter().collect()
    }

    async fn with_source<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SocketSource) -> T + Send + 'static,
    {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| anyhow!("Socket source not opened"))?;
        let joined = tokio::task::spawn_blocking(move || {
            let output = op(&mut source);
            (source, output)
        })
        .await;

        match joined {
            Ok((source, output)) => {
                self.source = Some(source);
                Ok(output)
            }
            Err(e) => {
                // The source went down with the task; only close can follow.
                self.state = DeviceState::Error(format!("socket source lost: {}", e));
                Err(e.into())
            }
        }
    }
}

impl Default for SocketDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceSource for SocketDevice {
    async fn configure(&mut self, config: Value) -> Result<()> {
        match self.state {
            DeviceState::Unopened | DeviceState::Opened | DeviceState::Stopped => {}
            _ => return Err(anyhow!("Cannot configure source in state {:?}", self.state)),
        }

        let config = SocketConfig::from_json(config)?;
        if let Some(source) = self.source.as_mut() {
            source.configure(config.clone())?;
        }
        self.config = config;
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        if self.state != DeviceState::Unopened {
            return Err(anyhow!("Cannot open source in state {:?}", self.state));
        }

        let config = self.config.clone();
        let sink = self.buffer.clone();
        let status = Arc::new(self.status.clone());
        let source =
            tokio::task::spawn_blocking(move || SocketSource::new(config, sink, status)).await??;

        self.source = Some(source);
        self.state = DeviceState::Opened;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.state != DeviceState::Opened && self.state != DeviceState::Stopped {
            return Err(anyhow!("Cannot start source in state {:?}", self.state));
        }

        self.with_source(|source| source.start()).await??;
        self.frame_counter = 0;
        self.state = DeviceState::Running;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<DataFrame> {
        let frame_size = self.config.acquisition.samples_per_packet;

        loop {
            if self.state != DeviceState::Running {
                return Err(anyhow!("Source not running"));
            }

            if let Some(block) = self.buffer.read(frame_size) {
                let mut frame = DataFrame::from_block(&block, self.frame_counter);
                frame.metadata.insert(
                    "sample_rate".to_string(),
                    self.config.acquisition.sample_rate.to_string(),
                );
                frame.metadata.insert(
                    "bit_volts".to_string(),
                    self.config.acquisition.data_scale.to_string(),
                );
                self.frame_counter += 1;
                return Ok(frame);
            }

            tokio::time::sleep(READ_POLL_INTERVAL).await;
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state != DeviceState::Running {
            return Ok(());
        }

        // The worker is halted even when the stop command fails.
        let stopped = self.with_source(|source| source.stop()).await?;
        self.state = DeviceState::Stopped;
        stopped?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == DeviceState::Running {
            self.stop().await?;
        }
        self.source = None;
        self.state = DeviceState::Closed;
        Ok(())
    }

    fn state(&self) -> DeviceState {
        self.state.clone()
    }
}
