/// Turns variable frame deltas into whole steps of a fixed interval. Backlog beyond `max_steps`
/// intervals is dropped so a long stall does not replay as a burst of catch-up steps.
#[derive(Clone, Debug)]
pub struct FixedTimer {
    interval: f32,
    accumulator: f32,
    max_steps: u32,
}

impl FixedTimer {
    pub const DEFAULT_MAX_STEPS: u32 = 8;

    pub fn from_millis(interval_ms: f32) -> Self {
        Self::new(interval_ms / 1000.0, Self::DEFAULT_MAX_STEPS)
    }

    pub fn new(interval: f32, max_steps: u32) -> Self {
        let interval = if interval.is_finite() && interval > 0.0 { interval } else { 1.0 / 60.0 };
        Self { interval, accumulator: 0.0, max_steps: max_steps.max(1) }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn pending(&self) -> f32 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Add `dt` seconds and return how many full intervals are now due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        if dt.is_finite() && dt > 0.0 {
            self.accumulator += dt;
        }
        let cap = self.interval * self.max_steps as f32;
        if self.accumulator > cap {
            log::debug!("[timer] dropping {:.3}s of backlog", self.accumulator - cap);
            self.accumulator = cap;
        }
        let mut steps = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            steps += 1;
        }
        steps
    }
}
