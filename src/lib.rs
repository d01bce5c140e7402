pub mod acquisition;
pub mod config;
pub mod core;
pub mod error;
pub mod hal;
pub mod net;
pub mod sink;
pub mod status;

pub use acquisition::{AcquisitionState, SocketSource};
pub use config::{AcquisitionConfig, ChannelKind, Endpoint, ScaleMode, SocketConfig};
pub use error::{AcquisitionError, Result};
pub use sink::{DataBuffer, SampleSink};
pub use status::{ChannelStatus, LogStatus, StatusReporter};
