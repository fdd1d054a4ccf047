use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::debug;

use crate::model::{Quantity, Snapshot};
use crate::{Error, Result};

// The gateway device type that carries the plant-wide summary registers.
const SUMMARY_DEVICE_TYPE: u32 = 35;

// Register i18n codes, kW unless noted.
const KEY_GRID_EXPORT: &str = "I18N_COMMON_FEED_NETWORK_TOTAL_ACTIVE_POWER";
const KEY_GRID_IMPORT: &str = "I18N_CONFIG_KEY_4060";
const KEY_BATTERY_CHARGE: &str = "I18N_CONFIG_KEY_3921";
const KEY_BATTERY_DISCHARGE: &str = "I18N_CONFIG_KEY_3907";
const KEY_PV_POWER: &str = "I18N_COMMON_TOTAL_DCPOWER";
const KEY_LOAD_POWER: &str = "I18N_COMMON_LOAD_TOTAL_ACTIVE_POWER";
const KEY_BATTERY_SOC: &str = "I18N_COMMON_BATTERY_SOC"; // percent

#[derive(Deserialize, Debug)]
struct Device {
    id: i64,
    #[serde(rename = "type")]
    device_type: u32,
}

#[derive(Deserialize, Debug)]
struct Measurement {
    i18n_code: String,
    /// The gateway reports every register as a string.
    value: String,
}

/// HTTP client for the local inverter gateway.
pub struct GatewayClient {
    base: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base: format!("http://{}:{}", host, port), http })
    }

    /// Resolve the summary device on the gateway. Called once at startup.
    pub async fn summary_device_id(&self) -> Result<i64> {
        let url = format!("{}/api/v1/devices", self.base);
        let devices: Vec<Device> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        devices
            .iter()
            .find(|d| d.device_type == SUMMARY_DEVICE_TYPE)
            .map(|d| d.id)
            .ok_or(Error::NoSummaryDevice)
    }

    /// Fetch the current register values and derive one snapshot.
    pub async fn snapshot(&self, device_id: i64) -> Result<Snapshot> {
        let url = format!(
            "{}/api/v1/devices/{}/real?services=real,real_battery",
            self.base, device_id
        );
        let measurements: Vec<Measurement> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(count = measurements.len(), "fetched gateway registers");

        let mut snapshot = Snapshot::new(now_ms());
        snapshot.values = derive_quantities(&measurements);
        Ok(snapshot)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Derive the tracked quantities from raw gateway registers.
///
/// Malformed register values are skipped. A quantity whose registers are
/// all absent yields `None` (no observation this cycle) instead of an
/// implicit zero; within a present quantity an individual missing
/// register counts as zero, matching the gateway's sparse reporting of
/// signed flows as two one-sided registers.
fn derive_quantities(measurements: &[Measurement]) -> [Option<f32>; crate::model::QUANTITY_COUNT] {
    let mut registers = HashMap::new();
    for m in measurements {
        let Ok(v) = m.value.parse::<f32>() else { continue };
        registers.insert(m.i18n_code.as_str(), v);
    }

    let reg = |key: &str| registers.get(key).copied().unwrap_or(0.0);
    let derive = |keys: &[&str], f: &dyn Fn() -> f32| {
        keys.iter()
            .any(|k| registers.contains_key(*k))
            .then(f)
    };

    let mut values = [None; crate::model::QUANTITY_COUNT];
    values[Quantity::GridPower.ordinal()] = derive(
        &[KEY_GRID_IMPORT, KEY_GRID_EXPORT],
        &|| (reg(KEY_GRID_IMPORT) - reg(KEY_GRID_EXPORT)) * 1e3,
    );
    values[Quantity::BatteryPower.ordinal()] = derive(
        &[KEY_BATTERY_CHARGE, KEY_BATTERY_DISCHARGE],
        &|| (reg(KEY_BATTERY_CHARGE) - reg(KEY_BATTERY_DISCHARGE)) * 1e3,
    );
    values[Quantity::PvPower.ordinal()] =
        derive(&[KEY_PV_POWER], &|| reg(KEY_PV_POWER) * 1e3);
    values[Quantity::LoadPower.ordinal()] =
        derive(&[KEY_LOAD_POWER], &|| reg(KEY_LOAD_POWER) * 1e3);
    values[Quantity::BatteryLevel.ordinal()] =
        derive(&[KEY_BATTERY_SOC], &|| reg(KEY_BATTERY_SOC) * 1e-2);

    values
}
