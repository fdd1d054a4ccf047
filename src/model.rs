use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Tracked plant quantities. Fixed at compile time; ordinals are stable
/// and double as storage ids (1-based, see [`Quantity::id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    GridPower,
    BatteryPower,
    PvPower,
    LoadPower,
    BatteryLevel,
}

pub const QUANTITY_COUNT: usize = 5;

impl Quantity {
    pub const ALL: [Quantity; QUANTITY_COUNT] = [
        Quantity::GridPower,
        Quantity::BatteryPower,
        Quantity::PvPower,
        Quantity::LoadPower,
        Quantity::BatteryLevel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Quantity::GridPower => "grid_power",
            Quantity::BatteryPower => "battery_power",
            Quantity::PvPower => "pv_power",
            Quantity::LoadPower => "load_power",
            Quantity::BatteryLevel => "battery_level",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::BatteryLevel => "ratio",
            _ => "watts",
        }
    }

    /// Ordinal position, used to index per-quantity state arrays.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Stable storage id (1-based so that 0 never appears in the log).
    pub fn id(self) -> u32 {
        self as u32 + 1
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Catalog entry handed to the storage backend at registration time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuantityDescriptor {
    pub id: u32,
    pub name: String,
    pub unit: String,
}

impl From<Quantity> for QuantityDescriptor {
    fn from(q: Quantity) -> Self {
        Self {
            id: q.id(),
            name: q.name().to_string(),
            unit: q.unit().to_string(),
        }
    }
}

/// One point-in-time observation of all quantities.
///
/// `None` means the gateway produced no usable value for that quantity
/// this cycle; the decimation engine skips it rather than assuming zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Epoch milliseconds.
    pub timestamp_ms: u64,
    pub values: [Option<f32>; QUANTITY_COUNT],
}

impl Snapshot {
    pub fn new(timestamp_ms: u64) -> Self {
        Self { timestamp_ms, values: [None; QUANTITY_COUNT] }
    }

    pub fn get(&self, q: Quantity) -> Option<f32> {
        self.values[q.ordinal()]
    }

    pub fn set(&mut self, q: Quantity, v: f32) {
        self.values[q.ordinal()] = Some(v);
    }
}

/// The atomic unit of the stored history.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[archive(check_bytes)]
pub struct SampledPoint {
    pub quantity_id: u32,
    /// Epoch milliseconds.
    pub timestamp_ms: u64,
    pub value: f32,
}
