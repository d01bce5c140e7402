use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::buffers::{CapacityManager, WorkingBuffers};
use super::converter::SampleConverter;
use super::rate::{RateMonitor, RateReporter};
use super::worker::{AcquisitionLoop, PacketProcessor};
use crate::config::{ChannelKind, SocketConfig, INITIAL_SINK_CAPACITY};
use crate::error::{AcquisitionError, Result};
use crate::net::{CommandChannel, CommandKind, ConnectionManager, Readiness};
use crate::sink::SampleSink;
use crate::status::StatusReporter;

/// How long a stop waits for the acquisition thread to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl AcquisitionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }
}

struct Worker {
    exit: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: JoinHandle<WorkingBuffers>,
}

/// UDP sample source: drives the peer with control datagrams and runs the
/// acquisition thread that fills the sink.
///
/// Configuration and capacity changes are only accepted while idle. A stop
/// raises the worker's exit flag and wakes it with an empty datagram, so it
/// does not depend on the peer still sending. A stop gives up waiting after
/// [`STOP_TIMEOUT`].
pub struct SocketSource {
    config: SocketConfig,
    state: AcquisitionState,
    connection: ConnectionManager,
    commands: CommandChannel,
    capacity: CapacityManager,
    buffers: Option<WorkingBuffers>,
    sink: Arc<dyn SampleSink>,
    status: Arc<dyn StatusReporter>,
    total_samples: Arc<AtomicU64>,
    rate: RateMonitor,
    worker: Option<Worker>,
    reporter: Option<RateReporter>,
}

impl SocketSource {
    /// Build a source and make a best-effort attempt to bind the data port.
    /// A failed bind is logged and retried by the next start.
    pub fn new(
        config: SocketConfig,
        sink: Arc<dyn SampleSink>,
        status: Arc<dyn StatusReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let acquisition = config.acquisition;
        sink.resize(acquisition.channel_count, INITIAL_SINK_CAPACITY);
        let total_samples = Arc::new(AtomicU64::new(0));

        let mut connection = ConnectionManager::new(
            config.data_port,
            config.local_address,
            config.connect_timeout(),
        );
        match connection.bind(config.data_port, config.local_address) {
            Ok(_) => {
                if let Ok(Readiness::Ready) = connection.wait_ready(true, config.connect_timeout()) {
                    info!("Data already arriving on port {}", config.data_port);
                }
            }
            Err(e) => warn!("{}", e),
        }

        Ok(Self {
            commands: CommandChannel::new(config.peer, acquisition.sample_rate, config.debug),
            capacity: CapacityManager::new(config.sink_capacity),
            buffers: Some(WorkingBuffers::new(
                acquisition.channel_count,
                acquisition.samples_per_packet,
            )),
            rate: RateMonitor::new(acquisition.sample_rate, total_samples.clone()),
            connection,
            config,
            state: AcquisitionState::Idle,
            sink,
            status,
            total_samples,
            worker: None,
            reporter: None,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Replace the configuration. Only allowed while idle; the new packet
    /// shape is applied by the capacity resize at the next start.
    pub fn configure(&mut self, config: SocketConfig) -> Result<()> {
        if self.state != AcquisitionState::Idle {
            return Err(AcquisitionError::InvalidState("acquisition is running"));
        }
        config.validate()?;

        self.connection
            .set_target(config.data_port, config.local_address, config.connect_timeout());
        self.commands = CommandChannel::new(config.peer, config.acquisition.sample_rate, config.debug);
        self.capacity = CapacityManager::new(config.sink_capacity);
        self.config = config;
        Ok(())
    }

    /// Size the working buffers and the sink for the configured packet shape.
    pub fn resize_capacity(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(AcquisitionError::InvalidState("acquisition is running"));
        }
        let buffers = self.buffers.get_or_insert_with(WorkingBuffers::default);
        self.capacity
            .resize(buffers, self.sink.as_ref(), &self.config.acquisition);
        Ok(())
    }

    /// Start acquisition. Starting while already running restarts from a
    /// zeroed sample counter on a freshly bound socket.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            info!("Restarting acquisition");
            self.stop_reporter();
            if let Err(e) = self.halt_worker() {
                self.report(&format!("Ephys Socket: {}", e));
            }
        }

        self.state = AcquisitionState::Starting;
        if let Err(e) = self.resize_capacity() {
            self.state = AcquisitionState::Idle;
            return Err(e);
        }
        self.total_samples.store(0, Ordering::Release);

        if let Err(e) = self.commands.send_command(CommandKind::Start) {
            self.report("Ephys Socket: Cannot send start signal");
            self.state = AcquisitionState::Idle;
            return Err(e);
        }

        match self.connection.reconnect() {
            Ok(true) => debug!("Peer already streaming"),
            Ok(false) => {}
            Err(e) => {
                self.report(&format!("Ephys Socket: {}", e));
                self.state = AcquisitionState::Idle;
                return Err(e);
            }
        }

        if let Err(e) = self.spawn_worker() {
            self.report(&format!("Ephys Socket: {}", e));
            self.state = AcquisitionState::Idle;
            return Err(e);
        }

        self.rate.restart(self.config.acquisition.sample_rate);
        if let Some(period) = self.config.rate_monitor_period() {
            self.reporter = self.rate.spawn_periodic(period);
        }

        self.state = AcquisitionState::Running;
        Ok(())
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let socket = self.connection.socket().ok_or_else(|| {
            AcquisitionError::InvalidState("data socket is not bound")
        })?;
        socket.set_read_timeout(self.config.recv_poll_interval())?;

        let buffers = self.buffers.take().unwrap_or_default();
        let processor = PacketProcessor::new(
            self.config.peer,
            SampleConverter::from_config(&self.config.acquisition, self.config.scale_mode),
            buffers,
            self.sink.clone(),
            self.status.clone(),
            self.total_samples.clone(),
        );
        let exit = Arc::new(AtomicBool::new(false));
        let worker = AcquisitionLoop::new(socket, exit.clone(), processor);
        let (done_tx, done) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("ephys-socket-acq".to_string())
            .spawn(move || {
                // Dropped on exit (or unwind) to wake the stopping thread.
                let _done = done_tx;
                worker.run()
            })?;

        self.worker = Some(Worker { exit, done, handle });
        Ok(())
    }

    /// Stop acquisition and clear the sink. The stop command is best
    /// effort: the acquisition thread is stopped even if it fails to send.
    /// The sample counter is left as is until the next start.
    pub fn stop(&mut self) -> Result<()> {
        if self.worker.is_none() {
            debug!("Stop requested while {}", self.state.name());
            self.state = AcquisitionState::Idle;
            return Ok(());
        }

        self.state = AcquisitionState::Stopping;
        let command = self.commands.send_command(CommandKind::Stop);
        match &command {
            Ok(()) => info!("Stop command sent"),
            Err(_) => self.report("Ephys Socket: Cannot send stop signal"),
        }

        self.stop_reporter();
        let halted = self.halt_worker();
        if let Err(e) = &halted {
            self.report(&format!("Ephys Socket: {}", e));
        }
        self.sink.clear();
        self.state = AcquisitionState::Idle;

        command.and(halted)
    }

    fn halt_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.exit.store(true, Ordering::Release);
        if let Err(e) = self.connection.wake_receiver() {
            warn!("Could not wake acquisition thread: {}", e);
        }

        match worker.done.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match worker.handle.join() {
                Ok(buffers) => {
                    self.buffers = Some(buffers);
                    Ok(())
                }
                Err(_) => Err(AcquisitionError::WorkerPanicked),
            },
            Err(RecvTimeoutError::Timeout) => {
                // The thread keeps its own buffers and socket handle and
                // exits on its next wakeup; the next start reallocates.
                warn!("Acquisition thread still running, detaching it");
                Err(AcquisitionError::ThreadJoin(STOP_TIMEOUT.as_millis() as u64))
            }
        }
    }

    fn stop_reporter(&mut self) {
        if let Some(reporter) = self.reporter.take() {
            reporter.stop();
        }
    }

    fn report(&self, message: &str) {
        self.status.report_status(message);
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AcquisitionState::Running
    }

    /// Samples appended since the last start.
    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Acquire)
    }

    /// Expected-over-received sample ratio since the last start.
    pub fn estimate_rate(&self) -> Option<f32> {
        self.rate.estimate_rate()
    }

    /// Last value recorded by the periodic rate monitor, if enabled.
    pub fn last_rate_estimate(&self) -> Option<f32> {
        self.rate.latest()
    }

    pub fn local_data_addr(&self) -> Option<SocketAddr> {
        self.connection.local_addr()
    }

    /// Working buffers, unless the acquisition thread currently owns them.
    pub fn working_buffers(&self) -> Option<&WorkingBuffers> {
        self.buffers.as_ref()
    }

    pub fn sink(&self) -> Arc<dyn SampleSink> {
        self.sink.clone()
    }

    pub fn found_input_source(&self) -> bool {
        true
    }

    pub fn num_channels(&self) -> usize {
        self.config.acquisition.channel_count
    }

    pub fn data_outputs(&self, kind: ChannelKind) -> usize {
        self.config.acquisition.data_outputs(kind)
    }

    pub fn ttl_outputs(&self) -> usize {
        0
    }

    pub fn sample_rate(&self) -> f32 {
        self.config.acquisition.sample_rate
    }

    pub fn bit_volts(&self) -> f32 {
        self.config.acquisition.data_scale
    }
}

impl Drop for SocketSource {
    fn drop(&mut self) {
        self.stop_reporter();
        if let Some(worker) = self.worker.take() {
            worker.exit.store(true, Ordering::Release);
            let _ = self.connection.wake_receiver();
        }
        self.connection.shutdown();
    }
}
