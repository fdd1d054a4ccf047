use std::time::Duration;

use crate::model::{Quantity, QuantityDescriptor, SampledPoint, Snapshot, QUANTITY_COUNT};
use crate::weighter::ExponentialCutoffWeighter;

/// Last (timestamp, value) recorded for one quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Recorded {
    timestamp_ms: u64,
    value: f32,
}

/// Adaptive dead-band compression over the quantity catalog.
///
/// Owns the per-quantity sampling state plus the shared last-observation
/// cursor. A value is recorded only when it deviates from the last
/// recorded value by more than the base threshold scaled by the decay
/// weighter; on a trip the old point is replayed first so the stored
/// history reconstructs a step-wise-constant signal exactly.
pub struct Decimator {
    thresholds: [f64; QUANTITY_COUNT],
    weighter: ExponentialCutoffWeighter,
    recorded: [Option<Recorded>; QUANTITY_COUNT],
    last_tick_ms: u64,
}

impl Decimator {
    pub fn new(thresholds: [f64; QUANTITY_COUNT], weighter: ExponentialCutoffWeighter) -> Self {
        Self {
            thresholds,
            weighter,
            recorded: [None; QUANTITY_COUNT],
            last_tick_ms: 0,
        }
    }

    /// Timestamp of the most recent snapshot processed, epoch milliseconds.
    pub fn last_tick_ms(&self) -> u64 {
        self.last_tick_ms
    }

    /// Seed the sampling state from the first snapshot.
    ///
    /// Emits one point per observed quantity, all timestamped at the
    /// baseline, and never suppresses anything. Returns the full catalog
    /// descriptors for the storage backend to register alongside the
    /// initial points.
    pub fn initialize(&mut self, baseline: &Snapshot) -> (Vec<QuantityDescriptor>, Vec<SampledPoint>) {
        let descriptors = Quantity::ALL.iter().map(|&q| q.into()).collect();

        let mut points = Vec::with_capacity(QUANTITY_COUNT);
        for q in Quantity::ALL {
            let Some(value) = baseline.get(q) else { continue };
            self.recorded[q.ordinal()] = Some(Recorded {
                timestamp_ms: baseline.timestamp_ms,
                value,
            });
            points.push(SampledPoint {
                quantity_id: q.id(),
                timestamp_ms: baseline.timestamp_ms,
                value,
            });
        }
        self.last_tick_ms = baseline.timestamp_ms;

        (descriptors, points)
    }

    /// Decide which quantities moved enough to persist.
    ///
    /// Suppressed quantities keep their state entry untouched, so the
    /// elapsed interval keeps growing and the effective tolerance keeps
    /// shrinking until even a small drift trips. A trip emits the pair
    /// (t_last, v_last) then (t_now, v_now) and resets the entry. The
    /// shared cursor advances unconditionally.
    pub fn process(&mut self, snapshot: &Snapshot) -> Vec<SampledPoint> {
        let t = snapshot.timestamp_ms;

        let mut points = Vec::new();
        for q in Quantity::ALL {
            let Some(value) = snapshot.get(q) else { continue };

            let Some(last) = self.recorded[q.ordinal()] else {
                // Quantity surfaced for the first time after setup.
                self.recorded[q.ordinal()] = Some(Recorded { timestamp_ms: t, value });
                points.push(SampledPoint { quantity_id: q.id(), timestamp_ms: t, value });
                continue;
            };

            if t < last.timestamp_ms {
                // Clock regression; recording here would put a point
                // before the quantity's last recorded timestamp.
                continue;
            }

            let elapsed = Duration::from_millis(t - last.timestamp_ms);
            let allowed = self.thresholds[q.ordinal()] * self.weighter.weight(elapsed);
            if f64::from((last.value - value).abs()) <= allowed {
                continue;
            }

            points.push(SampledPoint {
                quantity_id: q.id(),
                timestamp_ms: last.timestamp_ms,
                value: last.value,
            });
            points.push(SampledPoint { quantity_id: q.id(), timestamp_ms: t, value });
            self.recorded[q.ordinal()] = Some(Recorded { timestamp_ms: t, value });
        }

        self.last_tick_ms = t;

        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_MS: u64 = 60_000;
    const T0: u64 = 1_700_000_000_000;

    fn decimator() -> Decimator {
        // Thresholds and weighter from the default configuration.
        Decimator::new(
            [50.0, 50.0, 50.0, 50.0, 0.5e-2],
            ExponentialCutoffWeighter::new(Duration::from_secs(300), 2.0),
        )
    }

    fn full_snapshot(t: u64, v: f32) -> Snapshot {
        let mut s = Snapshot::new(t);
        for q in Quantity::ALL {
            s.set(q, v);
        }
        s.set(Quantity::BatteryLevel, 0.8);
        s
    }

    #[test]
    fn baseline_emits_one_point_per_quantity() {
        let mut d = decimator();
        let baseline = full_snapshot(T0, 100.0);
        let (descriptors, points) = d.initialize(&baseline);

        assert_eq!(descriptors.len(), QUANTITY_COUNT);
        assert_eq!(points.len(), QUANTITY_COUNT);
        for (q, p) in Quantity::ALL.iter().zip(&points) {
            assert_eq!(p.quantity_id, q.id());
            assert_eq!(p.timestamp_ms, T0);
            assert_eq!(Some(p.value), baseline.get(*q));
        }
        assert_eq!(d.last_tick_ms(), T0);
    }

    #[test]
    fn small_change_is_suppressed() {
        // Scenario A: delta 20 against allowed 50 at full weight.
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));

        let mut next = full_snapshot(T0 + MIN_MS, 120.0);
        next.set(Quantity::BatteryLevel, 0.8);
        let points = d.process(&next);

        assert!(points.iter().all(|p| p.quantity_id != Quantity::GridPower.id()));
        assert_eq!(d.last_tick_ms(), T0 + MIN_MS);
    }

    #[test]
    fn decayed_threshold_trips_and_replays_old_point() {
        // Scenario B: after the suppressed tick the state still holds
        // (t0, 100), so at t0+10min the weight is 2^-1 and allowed = 25.
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));
        d.process(&full_snapshot(T0 + MIN_MS, 120.0));

        let points = d.process(&full_snapshot(T0 + 10 * MIN_MS, 200.0));

        let grid: Vec<_> = points
            .iter()
            .filter(|p| p.quantity_id == Quantity::GridPower.id())
            .collect();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0].timestamp_ms, T0);
        assert_eq!(grid[0].value, 100.0);
        assert_eq!(grid[1].timestamp_ms, T0 + 10 * MIN_MS);
        assert_eq!(grid[1].value, 200.0);
    }

    #[test]
    fn tripped_state_resets_the_interval() {
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));
        d.process(&full_snapshot(T0 + 10 * MIN_MS, 200.0));

        // Right after a trip the full threshold applies again.
        let points = d.process(&full_snapshot(T0 + 11 * MIN_MS, 230.0));
        assert!(points.iter().all(|p| p.quantity_id != Quantity::GridPower.id()));
    }

    #[test]
    fn unchanged_value_never_trips() {
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));

        // Zero delta stays within any positive allowed tolerance, even
        // after the weight has decayed for a long time.
        for days in 1..=5u64 {
            let points = d.process(&full_snapshot(T0 + days * 24 * 60 * MIN_MS, 100.0));
            assert!(points.is_empty());
        }
    }

    #[test]
    fn last_tick_advances_even_when_nothing_is_emitted() {
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));

        let points = d.process(&full_snapshot(T0 + 5_000, 100.0));
        assert!(points.is_empty());
        assert_eq!(d.last_tick_ms(), T0 + 5_000);
    }

    #[test]
    fn missing_quantity_is_skipped_not_zeroed() {
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));

        let mut partial = full_snapshot(T0 + 5_000, 100.0);
        partial.values[Quantity::GridPower.ordinal()] = None;
        let points = d.process(&partial);

        // A dropped observation is not a jump to zero.
        assert!(points.is_empty());

        // And the old state is still in place for the next full snapshot.
        let points = d.process(&full_snapshot(T0 + 10_000, 100.0));
        assert!(points.is_empty());
    }

    #[test]
    fn late_first_observation_seeds_with_a_single_point() {
        let mut d = decimator();
        let mut baseline = full_snapshot(T0, 100.0);
        baseline.values[Quantity::PvPower.ordinal()] = None;
        let (_, points) = d.initialize(&baseline);
        assert_eq!(points.len(), QUANTITY_COUNT - 1);

        let next = full_snapshot(T0 + 5_000, 100.0);
        let points = d.process(&next);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].quantity_id, Quantity::PvPower.id());
        assert_eq!(points[0].timestamp_ms, T0 + 5_000);
    }

    #[test]
    fn clock_regression_never_records_backwards() {
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));

        // A snapshot dated before the last recorded point is ignored for
        // recording, however large the jump; the cursor still follows it.
        let points = d.process(&full_snapshot(T0 - 10 * MIN_MS, 10_000.0));
        assert!(points.is_empty());
        assert_eq!(d.last_tick_ms(), T0 - 10 * MIN_MS);

        // State is untouched, so a normal later snapshot measures its
        // interval from the original baseline.
        let points = d.process(&full_snapshot(T0 + MIN_MS, 120.0));
        assert!(points.is_empty());
    }

    #[test]
    fn battery_level_uses_its_own_threshold() {
        let mut d = decimator();
        d.initialize(&full_snapshot(T0, 100.0));

        // 0.3 percentage points stays inside the 0.5e-2 ratio band.
        let mut s = full_snapshot(T0 + MIN_MS, 100.0);
        s.set(Quantity::BatteryLevel, 0.803);
        assert!(d.process(&s).is_empty());

        // A full percentage point trips it.
        let mut s = full_snapshot(T0 + 2 * MIN_MS, 100.0);
        s.set(Quantity::BatteryLevel, 0.81);
        let points = d.process(&s);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].quantity_id, Quantity::BatteryLevel.id());
        assert_eq!(points[0].timestamp_ms, T0);
        assert_eq!(points[0].value, 0.8);
        assert_eq!(points[1].value, 0.81);
    }
}
