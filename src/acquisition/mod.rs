pub mod buffers;
pub mod converter;
pub mod rate;
pub mod source;
pub mod worker;

pub use buffers::{CapacityManager, WorkingBuffers};
pub use converter::{fill_timestamps, SampleConverter};
pub use rate::{estimate_rate, RateMonitor, RateReporter};
pub use source::{AcquisitionState, SocketSource, STOP_TIMEOUT};
pub use worker::{AcquisitionLoop, PacketOutcome, PacketProcessor, STREAM_ID};
