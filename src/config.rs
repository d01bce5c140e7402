use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AcquisitionError, Result};

pub const DEFAULT_DATA_PORT: u16 = 9001;
pub const DEFAULT_COMMAND_PORT: u16 = 3333;
pub const DEFAULT_NUM_CHANNELS: usize = 64;
pub const DEFAULT_NUM_SAMPLES: usize = 256;
pub const DEFAULT_SAMPLE_RATE: f32 = 30000.0;
pub const DEFAULT_DATA_OFFSET: i32 = 32768;
pub const DEFAULT_DATA_SCALE: f32 = 0.195;

/// Sink capacity (samples per channel) set by the capacity manager.
pub const DEFAULT_SINK_CAPACITY: usize = 100_000;
/// Sink capacity used at construction, before the first resize.
pub const INITIAL_SINK_CAPACITY: usize = 10_000;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// Network peer identified by IP address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub const fn localhost(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Whether a datagram sender is this peer. Only the address is compared,
    /// the peer streams from an ephemeral port.
    pub fn is_origin_of(&self, from: &SocketAddr) -> bool {
        from.ip() == self.address
    }
}

/// How raw words map onto output floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// `raw - offset`
    #[default]
    Unscaled,
    /// `scale * (raw - offset)`
    Scaled,
}

/// Channel classification used by the host when laying out outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Headstage,
    Aux,
    Adc,
}

impl ChannelKind {
    /// Only headstage channels are carried on the wire.
    pub fn carries_stream_data(&self) -> bool {
        matches!(self, ChannelKind::Headstage)
    }
}

/// Shape and conversion parameters of the sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub channel_count: usize,
    pub samples_per_packet: usize,
    pub sample_rate: f32,
    pub data_offset: i32,
    pub data_scale: f32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_NUM_CHANNELS,
            samples_per_packet: DEFAULT_NUM_SAMPLES,
            sample_rate: DEFAULT_SAMPLE_RATE,
            data_offset: DEFAULT_DATA_OFFSET,
            data_scale: DEFAULT_DATA_SCALE,
        }
    }
}

impl AcquisitionConfig {
    /// Raw words in one packet (channels x samples).
    pub fn words_per_packet(&self) -> usize {
        self.channel_count * self.samples_per_packet
    }

    /// Exact size of a well-formed data datagram.
    pub fn packet_bytes(&self) -> usize {
        self.words_per_packet() * 2
    }

    pub fn data_outputs(&self, kind: ChannelKind) -> usize {
        if kind.carries_stream_data() {
            self.channel_count
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(AcquisitionError::InvalidConfig(
                "channel_count must be positive".to_string(),
            ));
        }
        if self.samples_per_packet == 0 {
            return Err(AcquisitionError::InvalidConfig(
                "samples_per_packet must be positive".to_string(),
            ));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AcquisitionError::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.packet_bytes() > MAX_DATAGRAM_PAYLOAD {
            return Err(AcquisitionError::InvalidConfig(format!(
                "{} channels x {} samples does not fit in one datagram",
                self.channel_count, self.samples_per_packet
            )));
        }
        Ok(())
    }
}

/// Full configuration surface of a socket source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Local port the data socket binds to
    pub data_port: u16,

    /// Restrict the data socket to one interface
    pub local_address: Option<IpAddr>,

    /// Trusted peer; `peer.port` is its command port
    pub peer: Endpoint,

    #[serde(flatten)]
    pub acquisition: AcquisitionConfig,

    pub scale_mode: ScaleMode,

    /// Value of the debug byte in command datagrams
    pub debug: bool,

    pub sink_capacity: usize,

    /// How long a (re)bind waits for the first datagram before moving on
    pub connect_timeout_ms: u64,

    /// Receive timeout of the acquisition thread; `None` blocks until data arrives
    pub recv_poll_interval_ms: Option<u64>,

    /// Period of the rate monitor; `None` disables it
    pub rate_monitor_period_ms: Option<u64>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            data_port: DEFAULT_DATA_PORT,
            local_address: None,
            peer: Endpoint::new(
                IpAddr::V4(Ipv4Addr::new(192, 168, 137, 2)),
                DEFAULT_COMMAND_PORT,
            ),
            acquisition: AcquisitionConfig::default(),
            scale_mode: ScaleMode::default(),
            debug: true,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            connect_timeout_ms: 500,
            recv_poll_interval_ms: Some(250),
            rate_monitor_period_ms: None,
        }
    }
}

impl SocketConfig {
    /// Build from a JSON object, filling unspecified keys with defaults.
    pub fn from_json(config: Value) -> Result<Self> {
        let config: SocketConfig = serde_json::from_value(config)
            .map_err(|e| AcquisitionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.acquisition.validate()?;
        if self.sink_capacity == 0 {
            return Err(AcquisitionError::InvalidConfig(
                "sink_capacity must be positive".to_string(),
            ));
        }
        if self.recv_poll_interval_ms == Some(0) {
            return Err(AcquisitionError::InvalidConfig(
                "recv_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.rate_monitor_period_ms == Some(0) {
            return Err(AcquisitionError::InvalidConfig(
                "rate_monitor_period_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn recv_poll_interval(&self) -> Option<Duration> {
        self.recv_poll_interval_ms.map(Duration::from_millis)
    }

    pub fn rate_monitor_period(&self) -> Option<Duration> {
        self.rate_monitor_period_ms.map(Duration::from_millis)
    }
}
