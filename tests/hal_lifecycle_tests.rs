use ephys_socket::hal::{
    DeviceRegistry, DeviceSource, DeviceState, ManagedSource, SocketDevice, SOCKET_SOURCE,
};
use anyhow::Result;
use async_trait::async_trait;
use ephys_socket::core::DataFrame;
use serde_json::json;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

#[tokio::test]
async fn test_registry_defaults() {
    let registry = DeviceRegistry::with_defaults();

    let sources = registry.list_sources();
    assert_eq!(sources, vec![SOCKET_SOURCE.to_string()]);

    let source = registry.create_source(SOCKET_SOURCE).unwrap();
    assert_eq!(source.state(), DeviceState::Unopened);

    assert!(registry.create_source("NonExistent").is_err());
    assert!(DeviceRegistry::new().list_sources().is_empty());
}

#[tokio::test]
async fn test_managed_source_enforces_ordering() {
    let registry = DeviceRegistry::with_defaults();
    let mut source = ManagedSource::new(registry.create_source(SOCKET_SOURCE).unwrap());

    assert!(source.start().await.is_err());
    assert!(source.read_frame().await.is_err());
    assert_eq!(source.state(), &DeviceState::Unopened);

    // Stop before start is a no-op
    assert!(source.stop().await.is_ok());
    source.close().await.unwrap();
    assert_eq!(source.state(), &DeviceState::Closed);
}

#[tokio::test]
async fn test_managed_source_start_failure_is_retryable() {
    let registry = DeviceRegistry::with_defaults();
    let mut source = ManagedSource::new(registry.create_source(SOCKET_SOURCE).unwrap());

    source
        .configure(json!({
            "data_port": 0,
            "local_address": "127.0.0.1",
            "peer": {"address": "255.255.255.255", "port": 3333},
            "connect_timeout_ms": 10
        }))
        .await
        .unwrap();
    source.open().await.unwrap();

    assert!(source.start().await.is_err());
    assert_eq!(source.state(), &DeviceState::Opened);

    source.close().await.unwrap();
}

#[tokio::test]
async fn test_managed_source_streams_frames() {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut device = SocketDevice::new();
    let mut config = json!({
        "data_port": 0,
        "local_address": "127.0.0.1",
        "peer": {"address": "127.0.0.1", "port": peer.local_addr().unwrap().port()},
        "channel_count": 1,
        "samples_per_packet": 3,
        "connect_timeout_ms": 10,
        "recv_poll_interval_ms": 20
    });

    // Open once to learn a free data port, then reuse it behind the wrapper
    device.configure(config.clone()).await.unwrap();
    device.open().await.unwrap();
    let port = device.source().unwrap().local_data_addr().unwrap().port();
    device.close().await.unwrap();
    config["data_port"] = json!(port);

    let mut source = ManagedSource::new(Box::new(SocketDevice::new()));
    source.configure(config).await.unwrap();
    source.open().await.unwrap();
    source.start().await.unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    let streaming = tokio::spawn(async move {
        let result = source.run_streaming(tx).await;
        (source, result)
    });

    let words: Vec<u8> = [32768u16, 32769, 32770]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();
    peer.send_to(&words, ("127.0.0.1", port)).unwrap();

    let frame = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.channel(0), Some(&vec![0.0, 1.0, 2.0]));

    // No more data: dropping the receiver alone ends the stream
    drop(rx);
    let (mut source, result) = timeout(Duration::from_secs(2), streaming)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap(), 1);

    source.stop().await.unwrap();
    assert_eq!(source.state(), &DeviceState::Stopped);
    source.close().await.unwrap();
}

struct FailingSource {
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl DeviceSource for FailingSource {
    async fn configure(&mut self, _config: serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<DataFrame> {
        anyhow::bail!("sink disconnected")
    }

    async fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> DeviceState {
        DeviceState::Running
    }
}

#[tokio::test]
async fn test_failed_read_still_stops_source() {
    let stops = Arc::new(AtomicUsize::new(0));
    let mut source = ManagedSource::new(Box::new(FailingSource {
        stops: stops.clone(),
    }));
    source.open().await.unwrap();
    source.start().await.unwrap();

    let (tx, _rx) = mpsc::channel(1);
    assert!(source.run_streaming(tx).await.is_err());
    assert!(matches!(source.state(), DeviceState::Error(_)));
    assert!(source.start().await.is_err());

    source.close().await.unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(source.state(), &DeviceState::Closed);
}
