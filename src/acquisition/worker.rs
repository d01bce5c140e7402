//! Body of the acquisition thread.
//!
//! The thread blocks on `recv_from` and only checks its exit flag between
//! receives. With a receive timeout configured, a stop request is observed
//! within one timeout interval; without one, the stopping side wakes the
//! thread with an empty datagram. Anything received after the flag is
//! raised is discarded.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rustix::io::Errno;

use super::buffers::WorkingBuffers;
use super::converter::{fill_timestamps, SampleConverter};
use crate::config::Endpoint;
use crate::error::AcquisitionError;
use crate::sink::SampleSink;
use crate::status::StatusReporter;

/// Stream id attached to every append.
pub const STREAM_ID: u32 = 1;

/// Pause after an unexpected socket error before receiving again.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// What happened to one received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Accepted,
    ForeignOrigin,
    Framing { expected: usize, received: usize },
}

/// Validates, converts and forwards packets sitting in the receive buffer.
pub struct PacketProcessor {
    peer: Endpoint,
    converter: SampleConverter,
    buffers: WorkingBuffers,
    sink: Arc<dyn SampleSink>,
    status: Arc<dyn StatusReporter>,
    total_samples: Arc<AtomicU64>,
}

impl PacketProcessor {
    pub fn new(
        peer: Endpoint,
        converter: SampleConverter,
        buffers: WorkingBuffers,
        sink: Arc<dyn SampleSink>,
        status: Arc<dyn StatusReporter>,
        total_samples: Arc<AtomicU64>,
    ) -> Self {
        Self {
            peer,
            converter,
            buffers,
            sink,
            status,
            total_samples,
        }
    }

    pub fn recv_buffer(&mut self) -> &mut [u8] {
        self.buffers.recv_mut()
    }

    /// Handle a datagram of `len` bytes from `from`, already copied into the
    /// receive buffer.
    pub fn handle_datagram(&mut self, len: usize, from: SocketAddr) -> PacketOutcome {
        if !self.peer.is_origin_of(&from) {
            debug!("{}", AcquisitionError::OriginMismatch { from });
            return PacketOutcome::ForeignOrigin;
        }

        let expected = self.buffers.packet_bytes();
        if len != expected {
            self.report_framing(expected, len);
            return PacketOutcome::Framing {
                expected,
                received: len,
            };
        }

        self.ingest();
        PacketOutcome::Accepted
    }

    /// Report a datagram the kernel refused to fit in the receive buffer.
    pub fn report_oversized(&self) -> PacketOutcome {
        let expected = self.buffers.packet_bytes();
        self.report_framing(expected, expected + 1);
        PacketOutcome::Framing {
            expected,
            received: expected + 1,
        }
    }

    fn report_framing(&self, expected: usize, received: usize) {
        let error = AcquisitionError::Framing { expected, received };
        warn!("{}", error);
        self.status.report_status(&format!("Ephys Socket: {}", error));
    }

    fn ingest(&mut self) {
        let samples_per_packet = self.buffers.samples_per_packet();
        let first = self.total_samples.load(Ordering::Acquire);

        let (raw, samples, timestamps) = self.buffers.packet_views();
        self.converter.convert_packet(raw, samples);
        fill_timestamps(first as i64, timestamps);

        self.sink.append(
            self.buffers.samples(),
            self.buffers.timestamps(),
            self.buffers.event_words(),
            samples_per_packet,
            STREAM_ID,
        );

        self.total_samples
            .fetch_add(samples_per_packet as u64, Ordering::AcqRel);
    }

    pub fn into_buffers(self) -> WorkingBuffers {
        self.buffers
    }
}

/// Platforms that refuse to truncate a datagram fail the receive instead.
fn is_oversized(error: &io::Error) -> bool {
    error.raw_os_error() == Some(Errno::MSGSIZE.raw_os_error())
}

/// Receive loop run on the dedicated acquisition thread.
pub struct AcquisitionLoop {
    socket: Arc<UdpSocket>,
    exit: Arc<AtomicBool>,
    processor: PacketProcessor,
}

impl AcquisitionLoop {
    pub fn new(socket: Arc<UdpSocket>, exit: Arc<AtomicBool>, processor: PacketProcessor) -> Self {
        Self {
            socket,
            exit,
            processor,
        }
    }

    /// Run until the exit flag is raised, then give the buffers back.
    pub fn run(mut self) -> WorkingBuffers {
        info!("Acquisition thread started");
        let mut accepted: u64 = 0;

        while !self.exit.load(Ordering::Acquire) {
            let received = self.socket.recv_from(self.processor.recv_buffer());
            match received {
                Ok((len, from)) => {
                    if self.exit.load(Ordering::Acquire) {
                        break;
                    }
                    if self.processor.handle_datagram(len, from) == PacketOutcome::Accepted {
                        accepted += 1;
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) if is_oversized(&e) => {
                    self.processor.report_oversized();
                }
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    self.processor
                        .status
                        .report_status(&format!("Ephys Socket: receive failed: {}", e));
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        info!("Acquisition thread exiting after {} packets", accepted);
        self.processor.into_buffers()
    }
}
