use super::{DeviceSource, DeviceState};
use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use crate::core::DataFrame;

/// Host-side guard around a pluggable source.
///
/// Start failures leave the state untouched so the host can retry. A failed
/// read moves to `Error`; from there the source can still be stopped (its
/// acquisition thread may be alive) and closed.
pub struct ManagedSource {
    inner: Box<dyn DeviceSource>,
    state: DeviceState,
}

impl ManagedSource {
    pub fn new(source: Box<dyn DeviceSource>) -> Self {
        Self {
            inner: source,
            state: DeviceState::Unopened,
        }
    }

    pub async fn configure(&mut self, config: Value) -> Result<()> {
        match self.state {
            DeviceState::Unopened | DeviceState::Opened | DeviceState::Stopped => {
                self.inner.configure(config).await
            }
            _ => Err(anyhow!("Cannot configure source while {:?}", self.state)),
        }
    }

    pub async fn open(&mut self) -> Result<()> {
        if self.state != DeviceState::Unopened {
            return Err(anyhow!("Source already opened ({:?})", self.state));
        }
        self.inner.open().await?;
        self.state = DeviceState::Opened;
        Ok(())
    }

    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Opened | DeviceState::Stopped => {}
            _ => return Err(anyhow!("Cannot start source while {:?}", self.state)),
        }
        self.inner.start().await?;
        self.state = DeviceState::Running;
        Ok(())
    }

    pub async fn read_frame(&mut self) -> Result<DataFrame> {
        self.ensure_running()?;
        match self.inner.read_frame().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.state = DeviceState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Forward frames to `tx` until the receiver is dropped. Returns the
    /// number of frames delivered. A silent peer does not keep the stream
    /// alive once the consumer has gone away.
    pub async fn run_streaming(&mut self, tx: mpsc::Sender<DataFrame>) -> Result<u64> {
        self.ensure_running()?;

        let mut delivered = 0;
        loop {
            let frame = tokio::select! {
                _ = tx.closed() => break,
                frame = self.read_frame() => frame?,
            };
            if tx.send(frame).await.is_err() {
                break;
            }
            delivered += 1;
        }

        Ok(delivered)
    }

    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Running | DeviceState::Error(_) => {}
            _ => return Ok(()),
        }
        let result = self.inner.stop().await;
        self.state = DeviceState::Stopped;
        result
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.state == DeviceState::Closed {
            return Ok(());
        }
        let stopped = self.stop().await;
        self.inner.close().await?;
        self.state = DeviceState::Closed;
        stopped
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state != DeviceState::Running {
            return Err(anyhow!("Source not running ({:?})", self.state));
        }
        Ok(())
    }
}
