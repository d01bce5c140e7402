use std::env;
use std::time::Duration;

use env_logger::Env;
use ephys_socket::hal::{DeviceRegistry, ManagedSource, SOCKET_SOURCE};
use log::{info, warn};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

const RUN_TIME: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().filter_or("LOG_LEVEL", "info"));

    // Usage: ephys-socket [peer-address] [data-port]
    let mut args = env::args().skip(1);
    let peer = args.next().unwrap_or_else(|| "192.168.137.2".to_string());
    let data_port: u16 = match args.next() {
        Some(port) => port.parse()?,
        None => 9001,
    };

    let registry = DeviceRegistry::with_defaults();
    let mut source = ManagedSource::new(registry.create_source(SOCKET_SOURCE)?);

    source
        .configure(json!({
            "data_port": data_port,
            "peer": {"address": peer, "port": 3333},
            "rate_monitor_period_ms": 5000
        }))
        .await?;
    source.open().await?;
    source.start().await?;
    info!("Acquiring from {} for {:?}", peer, RUN_TIME);

    let (tx, mut rx) = mpsc::channel(64);
    let streaming = tokio::spawn(async move {
        let streamed = source.run_streaming(tx).await;
        (source, streamed)
    });

    let deadline = Instant::now() + RUN_TIME;
    let mut samples = 0usize;
    while let Ok(Some(frame)) = timeout_at(deadline, rx.recv()).await {
        samples += frame.num_samples();
    }
    drop(rx);

    let (mut source, streamed) = streaming.await?;
    match streamed {
        Ok(frames) => info!("Received {} frames ({} samples per channel)", frames, samples),
        Err(e) => warn!("Streaming ended early: {}", e),
    }
    source.stop().await?;
    source.close().await?;
    Ok(())
}
