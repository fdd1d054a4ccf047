use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::model::{Quantity, Snapshot};
use crate::{Error, Result};

const BROADCAST_CAPACITY: usize = 16;

/// Live-view fan-out: every processed snapshot is pushed as JSON to all
/// connected websocket viewers. Fully independent of the sampling state;
/// the only shared data is the already-serialized snapshot.
#[derive(Clone)]
pub struct LiveServer {
    tx: broadcast::Sender<String>,
}

impl LiveServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Push the latest snapshot to all connected viewers. A lagging or
    /// absent viewer is never an error.
    pub fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        let mut body = serde_json::Map::new();
        body.insert("timestamp_ms".into(), snapshot.timestamp_ms.into());
        for q in Quantity::ALL {
            body.insert(q.name().into(), snapshot.get(q).into());
        }
        // send only fails when no viewer is subscribed.
        let _ = self.tx.send(serde_json::to_string(&body)?);
        Ok(())
    }

    pub async fn serve(&self, addr: SocketAddr) {
        let index = warp::get()
            .and(warp::path::end())
            .map(|| warp::reply::html(INDEX_HTML));

        let health = warp::get()
            .and(warp::path("health"))
            .map(|| StatusCode::NO_CONTENT);

        let ws = warp::path("ws")
            .and(warp::ws())
            .and(with_tx(self.tx.clone()))
            .map(|ws: warp::ws::Ws, tx: broadcast::Sender<String>| {
                ws.on_upgrade(move |socket| handle_viewer(socket, tx.subscribe()))
            });

        let routes = index.or(health).or(ws);
        warp::serve(routes).run(addr).await;
    }
}

impl Default for LiveServer {
    fn default() -> Self {
        Self::new()
    }
}

fn with_tx(
    tx: broadcast::Sender<String>,
) -> impl Filter<Extract = (broadcast::Sender<String>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || tx.clone())
}

async fn handle_viewer(socket: WebSocket, mut updates: broadcast::Receiver<String>) {
    let viewer = Uuid::new_v4();
    tracing::info!(%viewer, "viewer connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(text) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%viewer, skipped, "viewer lagging behind updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => tracing::warn!(%viewer, "ignoring received message"),
                _ => break,
            },
        }
    }

    tracing::info!(%viewer, "viewer disconnected");
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn is_healthy(host: &str, port: u16) -> bool {
    // Bounded like every other network call; a hung probe must not
    // stall startup or the health subcommand.
    let Ok(client) = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() else {
        return false;
    };
    let url = format!("http://{}:{}/health", host, port);
    match client.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Poll /health until the server answers or the deadline passes.
pub async fn wait_for_healthy(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if is_healthy(host, port).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::ServerUnhealthy);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>heliostat</title>
<style>
  body { font-family: monospace; background: #111; color: #ddd; margin: 2em; }
  table { border-collapse: collapse; }
  td { padding: 0.3em 1em; border-bottom: 1px solid #333; }
  td.v { text-align: right; }
</style>
</head>
<body>
<h1>heliostat</h1>
<table>
  <tr><td>grid power</td><td class="v" id="grid_power">-</td><td>W</td></tr>
  <tr><td>battery power</td><td class="v" id="battery_power">-</td><td>W</td></tr>
  <tr><td>pv power</td><td class="v" id="pv_power">-</td><td>W</td></tr>
  <tr><td>load power</td><td class="v" id="load_power">-</td><td>W</td></tr>
  <tr><td>battery level</td><td class="v" id="battery_level">-</td><td>%</td></tr>
</table>
<p id="updated">waiting for data...</p>
<script>
  const ws = new WebSocket(`ws://${location.host}/ws`);
  ws.onmessage = (event) => {
    const s = JSON.parse(event.data);
    for (const k of ["grid_power", "battery_power", "pv_power", "load_power"]) {
      if (s[k] !== null) document.getElementById(k).textContent = s[k].toFixed(0);
    }
    if (s.battery_level !== null) {
      document.getElementById("battery_level").textContent = (s.battery_level * 100).toFixed(1);
    }
    document.getElementById("updated").textContent =
      "updated " + new Date(s.timestamp_ms).toLocaleTimeString();
  };
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_as_json() {
        let server = LiveServer::new();
        let mut rx = server.tx.subscribe();

        let mut snapshot = Snapshot::new(42_000);
        snapshot.set(Quantity::GridPower, 1200.0);
        snapshot.set(Quantity::BatteryLevel, 0.76);
        server.publish(&snapshot).unwrap();

        let body: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(body["timestamp_ms"], 42_000);
        assert_eq!(body["grid_power"], 1200.0);
        // f32 values widen to f64 in JSON, so compare against the widened value.
        assert_eq!(body["battery_level"].as_f64().unwrap(), f64::from(0.76f32));
        // Unobserved quantities come through as null, not zero.
        assert_eq!(body["pv_power"], serde_json::Value::Null);
    }

    #[test]
    fn publish_without_viewers_is_not_an_error() {
        let server = LiveServer::new();
        assert!(server.publish(&Snapshot::new(1)).is_ok());
    }

    #[tokio::test]
    async fn wait_for_healthy_gives_up_at_the_deadline() {
        // Nothing listens on port 1; the wait must end with an error
        // instead of probing forever.
        let err = wait_for_healthy("127.0.0.1", 1, Duration::ZERO).await;
        assert!(matches!(err, Err(Error::ServerUnhealthy)));
    }
}
