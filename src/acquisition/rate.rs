use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, info, warn};

/// Expected-over-received sample ratio. 1.0 means the peer delivers exactly
/// the configured rate; `None` until at least one sample has arrived.
pub fn estimate_rate(sample_rate: f32, elapsed: Duration, total_samples: u64) -> Option<f32> {
    if total_samples == 0 {
        return None;
    }
    Some(sample_rate * elapsed.as_secs_f32() / total_samples as f32)
}

/// Observes the running sample counter; never modifies it.
#[derive(Debug, Clone)]
pub struct RateMonitor {
    sample_rate: f32,
    total_samples: Arc<AtomicU64>,
    started: Instant,
    latest: Arc<AtomicU32>,
}

impl RateMonitor {
    pub fn new(sample_rate: f32, total_samples: Arc<AtomicU64>) -> Self {
        Self {
            sample_rate,
            total_samples,
            started: Instant::now(),
            latest: Arc::new(AtomicU32::new(f32::NAN.to_bits())),
        }
    }

    /// Begin a new measurement window, forgetting the last estimate.
    pub fn restart(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.started = Instant::now();
        self.latest.store(f32::NAN.to_bits(), Ordering::Relaxed);
    }

    pub fn estimate_rate(&self) -> Option<f32> {
        estimate_rate(
            self.sample_rate,
            self.started.elapsed(),
            self.total_samples.load(Ordering::Acquire),
        )
    }

    /// Estimate stored by the most recent periodic tick.
    pub fn latest(&self) -> Option<f32> {
        let value = f32::from_bits(self.latest.load(Ordering::Relaxed));
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    /// Spawn a thread that records and logs an estimate every `period`.
    pub fn spawn_periodic(&self, period: Duration) -> Option<RateReporter> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let monitor = self.clone();

        let spawned = thread::Builder::new()
            .name("ephys-socket-rate".to_string())
            .spawn(move || {
                let ticker = tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            match monitor.estimate_rate() {
                                Some(rate) => {
                                    monitor.latest.store(rate.to_bits(), Ordering::Relaxed);
                                    info!("Relative sample rate: {:.4}", rate);
                                }
                                None => debug!("No samples received yet"),
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            });

        match spawned {
            Ok(handle) => Some(RateReporter { stop_tx, handle }),
            Err(e) => {
                warn!("Could not start rate monitor: {}", e);
                None
            }
        }
    }
}

/// Handle to a running periodic rate monitor.
pub struct RateReporter {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl RateReporter {
    pub fn stop(self) {
        drop(self.stop_tx);
        if self.handle.join().is_err() {
            warn!("Rate monitor thread panicked");
        }
    }
}
