use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failures raised by the acquisition core.
///
/// None of these are fatal to the process. Start/stop transitions report
/// them through the status channel and leave the source in a state from
/// which a later request can retry.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("could not bind data socket to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("command datagram not sent: {reason}")]
    CommandSend { reason: String },

    #[error("datagram from unexpected sender {from}")]
    OriginMismatch { from: SocketAddr },

    #[error("data shape mismatch: expected {expected} bytes, received {received}")]
    Framing { expected: usize, received: usize },

    #[error("socket readiness check failed: {0}")]
    Readiness(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("operation not allowed while {0}")]
    InvalidState(&'static str),

    #[error("acquisition thread did not exit within {0} ms")]
    ThreadJoin(u64),

    #[error("acquisition thread panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
