use std::time::Duration;

/// Decaying multiplier applied to a quantity's base dead-band threshold.
///
/// The effective tolerance stays at the full base threshold while a
/// quantity was recorded recently, then shrinks exponentially the longer
/// it stays silent, so even a slow drift is eventually recorded.
///
/// w(d <= start) = 1
/// w(d = 2*start) = 1 / factor
/// w(d -> oo) -> 0
#[derive(Debug, Clone, Copy)]
pub struct ExponentialCutoffWeighter {
    start: Duration,
    factor: f64,
}

impl ExponentialCutoffWeighter {
    /// Callers must supply `factor > 1` and a non-zero `start`; both are
    /// enforced by config validation before the engine starts ticking.
    pub fn new(start: Duration, factor: f64) -> Self {
        Self { start, factor }
    }

    pub fn weight(&self, elapsed: Duration) -> f64 {
        if elapsed <= self.start {
            return 1.0;
        }
        self.factor
            .powf(1.0 - elapsed.as_secs_f64() / self.start.as_secs_f64())
    }
}
