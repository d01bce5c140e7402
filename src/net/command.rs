//! Control datagrams sent to the acquisition peer.
//!
//! Layout (all single bytes):
//!
//! | offset | Start                   | Stop          |
//! |--------|-------------------------|---------------|
//! | 0      | `0x40` (bit 6)          | `0x80` (bit 7)|
//! | 1      | debug flag              | debug flag    |
//! | 2      | sample rate / 1000      | sample rate / 1000 |
//! | 3..67  | 32 x (channel, flags)   | -             |

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::{debug, info, warn};

use super::connection::{wait_ready, Readiness};
use crate::config::Endpoint;
use crate::error::{AcquisitionError, Result};

pub const HEADER_LEN: usize = 3;
pub const CHANNEL_TABLE_ENTRIES: usize = 32;
pub const START_COMMAND_LEN: usize = HEADER_LEN + CHANNEL_TABLE_ENTRIES * 2;
pub const WRITE_READY_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Stop,
}

impl CommandKind {
    pub fn tag(self) -> u8 {
        match self {
            CommandKind::Start => 1 << 6,
            CommandKind::Stop => 1 << 7,
        }
    }
}

/// Sample rate in kHz, truncated to one byte.
pub fn sample_rate_index(sample_rate: f32) -> u8 {
    (sample_rate / 1000.0) as i32 as u8
}

pub fn encode_command(kind: CommandKind, sample_rate: f32, debug: bool) -> Vec<u8> {
    let capacity = match kind {
        CommandKind::Start => START_COMMAND_LEN,
        CommandKind::Stop => HEADER_LEN,
    };
    let mut datagram = Vec::with_capacity(capacity);
    datagram.push(kind.tag());
    datagram.push(debug as u8);
    datagram.push(sample_rate_index(sample_rate));

    if kind == CommandKind::Start {
        for channel in 0..CHANNEL_TABLE_ENTRIES as u8 {
            datagram.push(channel);
            datagram.push(0);
        }
    }

    datagram
}

/// Sends start/stop requests to the peer's command port.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    peer: Endpoint,
    sample_rate: f32,
    debug: bool,
}

impl CommandChannel {
    pub fn new(peer: Endpoint, sample_rate: f32, debug: bool) -> Self {
        Self {
            peer,
            sample_rate,
            debug,
        }
    }

    pub fn peer(&self) -> Endpoint {
        self.peer
    }

    /// Send one command over a short-lived socket. Not retried.
    pub fn send_command(&self, kind: CommandKind) -> Result<()> {
        let datagram = encode_command(kind, self.sample_rate, self.debug);

        let any: IpAddr = match self.peer.address {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(any, 0)).map_err(|e| {
            AcquisitionError::CommandSend {
                reason: format!("could not open send socket: {}", e),
            }
        })?;

        debug!("Waiting to write {:?} command", kind);
        match wait_ready(&socket, false, WRITE_READY_TIMEOUT)? {
            Readiness::Ready => {}
            Readiness::Timeout => {
                warn!("Socket is not ready to write within {:?}", WRITE_READY_TIMEOUT);
                return Err(AcquisitionError::CommandSend {
                    reason: "socket not writable".to_string(),
                });
            }
        }

        let sent = socket
            .send_to(&datagram, self.peer.socket_addr())
            .map_err(|e| AcquisitionError::CommandSend {
                reason: e.to_string(),
            })?;
        if sent != datagram.len() {
            return Err(AcquisitionError::CommandSend {
                reason: format!("short write: {} of {} bytes", sent, datagram.len()),
            });
        }

        info!("{:?} command sent to {}", kind, self.peer.socket_addr());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_command_layout() {
        let datagram = encode_command(CommandKind::Start, 30000.0, true);

        assert_eq!(datagram.len(), 67);
        assert_eq!(datagram[0], 0x40);
        assert_eq!(datagram[1], 1);
        assert_eq!(datagram[2], 30);
        for channel in 0..32 {
            assert_eq!(datagram[3 + channel * 2], channel as u8);
            assert_eq!(datagram[4 + channel * 2], 0);
        }
    }

    #[test]
    fn test_stop_command_layout() {
        let datagram = encode_command(CommandKind::Stop, 20000.0, false);
        assert_eq!(datagram, vec![0x80, 0, 20]);
    }

    #[test]
    fn test_sample_rate_index_truncates() {
        assert_eq!(sample_rate_index(30000.0), 30);
        assert_eq!(sample_rate_index(2500.0), 2);
        assert_eq!(sample_rate_index(999.0), 0);
        // 300 kHz wraps to 300 - 256
        assert_eq!(sample_rate_index(300_000.0), 44);
    }

    #[test]
    fn test_send_command_reaches_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = peer.local_addr().unwrap().port();

        let channel = CommandChannel::new(Endpoint::localhost(port), 30000.0, true);
        channel.send_command(CommandKind::Start).unwrap();
        channel.send_command(CommandKind::Stop).unwrap();

        let mut buf = [0u8; 128];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(len, START_COMMAND_LEN);
        assert_eq!(buf[0], 0x40);

        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(len, HEADER_LEN);
        assert_eq!(&buf[..3], &[0x80, 1, 30]);
    }
}
