//! Receive-socket lifecycle for the data stream.
//!
//! The manager owns the bound socket behind an [`Arc`] so the acquisition
//! thread can hold its own handle. [`ConnectionManager::shutdown`] releases
//! the manager's handle only; the OS socket closes once the acquisition
//! thread has also let go of it. A thread blocked without a receive timeout
//! is released with [`ConnectionManager::wake_receiver`].

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::os::fd::AsFd;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::Errno;

use crate::error::{AcquisitionError, Result};

/// Outcome of a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Timeout,
}

/// Poll a socket for read or write readiness without consuming data.
pub fn wait_ready<Fd: AsFd>(fd: &Fd, for_read: bool, timeout: Duration) -> Result<Readiness> {
    let interest = if for_read { PollFlags::IN } else { PollFlags::OUT };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let mut fds = [PollFd::new(fd, interest)];

    loop {
        match poll(&mut fds, timeout_ms) {
            Ok(0) => return Ok(Readiness::Timeout),
            Ok(_) => {
                let revents = fds[0].revents();
                if revents.intersects(PollFlags::ERR | PollFlags::NVAL) {
                    return Err(AcquisitionError::Readiness(io::Error::new(
                        io::ErrorKind::Other,
                        format!("socket reported {:?}", revents),
                    )));
                }
                return Ok(Readiness::Ready);
            }
            Err(Errno::INTR) => continue,
            Err(errno) => return Err(AcquisitionError::Readiness(errno.into())),
        }
    }
}

/// Binds, rebinds and tears down the data socket.
pub struct ConnectionManager {
    port: u16,
    local_address: Option<IpAddr>,
    connect_timeout: Duration,
    socket: Option<Arc<UdpSocket>>,
}

impl ConnectionManager {
    pub fn new(port: u16, local_address: Option<IpAddr>, connect_timeout: Duration) -> Self {
        Self {
            port,
            local_address,
            connect_timeout,
            socket: None,
        }
    }

    /// Change the bind target. Takes effect on the next bind or reconnect.
    pub fn set_target(&mut self, port: u16, local_address: Option<IpAddr>, connect_timeout: Duration) {
        self.port = port;
        self.local_address = local_address;
        self.connect_timeout = connect_timeout;
    }

    /// Open a socket on `port`, optionally restricted to `local_address`.
    /// Any previously bound socket is released first.
    pub fn bind(&mut self, port: u16, local_address: Option<IpAddr>) -> Result<SocketAddr> {
        self.shutdown();

        let address = local_address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let socket = UdpSocket::bind(SocketAddr::new(address, port))
            .map_err(|source| AcquisitionError::Bind { port, source })?;
        let bound = socket.local_addr()?;

        info!("Socket bound to {}", bound);
        self.port = port;
        self.local_address = local_address;
        self.socket = Some(Arc::new(socket));
        Ok(bound)
    }

    pub fn wait_ready(&self, for_read: bool, timeout: Duration) -> Result<Readiness> {
        let socket = self.socket.as_ref().ok_or_else(|| {
            AcquisitionError::Readiness(io::Error::new(
                io::ErrorKind::NotConnected,
                "data socket is not bound",
            ))
        })?;
        wait_ready(&**socket, for_read, timeout)
    }

    /// Drop the current socket, bind a fresh one and check whether data is
    /// already arriving. Returns `Ok(false)` when bound but nothing arrived
    /// within the connect timeout; only a bind failure is an error.
    pub fn reconnect(&mut self) -> Result<bool> {
        self.bind(self.port, self.local_address)?;

        match self.wait_ready(true, self.connect_timeout) {
            Ok(Readiness::Ready) => {
                info!("Socket connected.");
                Ok(true)
            }
            Ok(Readiness::Timeout) => {
                info!("Socket bound, no data within {:?}", self.connect_timeout);
                Ok(false)
            }
            Err(e) => {
                warn!("Socket readiness check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Unblock a thread parked in `recv_from` on the bound socket by sending
    /// it an empty datagram from a throwaway socket.
    pub fn wake_receiver(&self) -> Result<()> {
        let Some(bound) = self.local_addr() else {
            return Ok(());
        };
        let target = match bound.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
            }
            IpAddr::V6(ip) if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
            }
            _ => bound,
        };
        let any = match target.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        let waker = UdpSocket::bind(SocketAddr::new(any, 0))?;
        waker.send_to(&[], target)?;
        debug!("Sent wakeup datagram to {}", target);
        Ok(())
    }

    /// Release the socket. Safe to call when nothing is bound.
    pub fn shutdown(&mut self) {
        if let Some(socket) = self.socket.take() {
            debug!("Releasing data socket {:?}", socket.local_addr().ok());
        }
    }

    pub fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let mut conn = ConnectionManager::new(0, loopback(), Duration::from_millis(10));
        let bound = conn.bind(0, loopback()).unwrap();

        assert!(conn.is_bound());
        assert_ne!(bound.port(), 0);
        assert_eq!(conn.local_addr(), Some(bound));
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = holder.local_addr().unwrap().port();

        let mut conn = ConnectionManager::new(taken, loopback(), Duration::from_millis(10));
        let result = conn.bind(taken, loopback());

        assert!(matches!(result, Err(AcquisitionError::Bind { port, .. }) if port == taken));
        assert!(!conn.is_bound());
    }

    #[test]
    fn test_wait_ready_read_times_out_then_sees_data() {
        let mut conn = ConnectionManager::new(0, loopback(), Duration::from_millis(10));
        let bound = conn.bind(0, loopback()).unwrap();

        let ready = conn.wait_ready(true, Duration::from_millis(20)).unwrap();
        assert_eq!(ready, Readiness::Timeout);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[1, 2, 3, 4], bound).unwrap();

        let ready = conn.wait_ready(true, Duration::from_millis(500)).unwrap();
        assert_eq!(ready, Readiness::Ready);

        // Readiness does not consume the datagram
        let mut buf = [0u8; 8];
        let (len, _) = conn.socket().unwrap().recv_from(&mut buf).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn test_wait_ready_write_is_immediate() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let ready = wait_ready(&socket, false, Duration::from_millis(1000)).unwrap();
        assert_eq!(ready, Readiness::Ready);
    }

    #[test]
    fn test_wait_ready_unbound_is_error() {
        let conn = ConnectionManager::new(0, None, Duration::from_millis(10));
        assert!(conn.wait_ready(true, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_reconnect_replaces_socket() {
        let mut conn = ConnectionManager::new(0, loopback(), Duration::from_millis(10));
        conn.bind(0, loopback()).unwrap();
        let first = conn.socket().unwrap();

        let connected = conn.reconnect().unwrap();
        assert!(!connected);

        let second = conn.socket().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_wake_receiver_unblocks_recv() {
        let mut conn = ConnectionManager::new(0, loopback(), Duration::from_millis(10));
        conn.bind(0, loopback()).unwrap();
        let socket = conn.socket().unwrap();

        let receiver = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            socket.recv_from(&mut buf).map(|(len, _)| len)
        });
        std::thread::sleep(Duration::from_millis(50));

        conn.wake_receiver().unwrap();
        assert_eq!(receiver.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn test_wake_receiver_unbound_is_noop() {
        let conn = ConnectionManager::new(0, None, Duration::from_millis(10));
        assert!(conn.wake_receiver().is_ok());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut conn = ConnectionManager::new(0, loopback(), Duration::from_millis(10));
        conn.shutdown();
        conn.bind(0, loopback()).unwrap();
        conn.shutdown();
        conn.shutdown();
        assert!(!conn.is_bound());
    }
}
