use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::client::GatewayClient;
use crate::config::Config;
use crate::decimate::Decimator;
use crate::model::Quantity;
use crate::server::{wait_for_healthy, LiveServer};
use crate::storage::HistoryStore;
use crate::weighter::ExponentialCutoffWeighter;
use crate::Result;

const STARTUP_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the sampling loop until the task is cancelled or a fatal error
/// surfaces. One tick = fetch snapshot, decimate, persist, publish.
///
/// Gateway and storage failures are fatal; a live-view failure is only
/// logged, a broken viewer must never cost history.
pub async fn run(config: Config) -> Result<()> {
    let client = GatewayClient::new(
        &config.gateway.host,
        config.gateway.port,
        config.gateway.timeout(),
    )?;
    let device_id = client.summary_device_id().await?;
    info!(device_id, "resolved summary device");

    let weighter = ExponentialCutoffWeighter::new(config.weighter.start(), config.weighter.factor);
    let mut decimator = Decimator::new(config.thresholds.as_array(), weighter);
    let mut store = HistoryStore::open(&config.storage.dir)?;

    let server = LiveServer::new();
    let addr: SocketAddr = format!("{}:{}", config.ui.host, config.ui.port).parse()?;
    {
        let server = server.clone();
        tokio::spawn(async move { server.serve(addr).await });
    }
    wait_for_healthy(&config.ui.host, config.ui.port, STARTUP_HEALTH_TIMEOUT).await?;
    info!(%addr, "live view listening");

    // Establish the complete baseline before the first regular tick.
    let baseline = client.snapshot(device_id).await?;
    let (descriptors, points) = decimator.initialize(&baseline);
    store.register_quantities(&descriptors)?;
    if !points.is_empty() {
        store.append_points(&points)?;
    }
    info!(points = points.len(), "baseline recorded");
    if let Err(e) = server.publish(&baseline) {
        warn!(error = %e, "live view update failed");
    }

    let mut ticker = tokio::time::interval(config.sample_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        let snapshot = client.snapshot(device_id).await?;
        if let Some(level) = snapshot.get(Quantity::BatteryLevel) {
            info!(battery_level = level, "tick");
        }

        let points = decimator.process(&snapshot);
        if !points.is_empty() {
            store.append_points(&points)?;
            info!(points = points.len(), "points recorded");
        }

        if let Err(e) = server.publish(&snapshot) {
            warn!(error = %e, "live view update failed");
        }
    }
}
