use std::collections::VecDeque;
use std::time::Instant;

/// Passes remembered per unit; `average_ms` and `max_ms` cover only these.
pub const PROFILE_WINDOW: usize = 120;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitTimingSummary {
    pub unit: &'static str,
    pub last_ms: f32,
    pub average_ms: f32,
    pub max_ms: f32,
    pub samples: u64,
}

struct UnitTiming {
    unit: &'static str,
    recent: VecDeque<f32>,
    samples: u64,
}

impl UnitTiming {
    fn summarize(&self) -> UnitTimingSummary {
        let last_ms = self.recent.back().copied().unwrap_or(0.0);
        let average_ms =
            if self.recent.is_empty() { 0.0 } else { self.recent.iter().sum::<f32>() / self.recent.len() as f32 };
        let max_ms = self.recent.iter().copied().fold(0.0, f32::max);
        UnitTimingSummary { unit: self.unit, last_ms, average_ms, max_ms, samples: self.samples }
    }
}

/// Wall-clock cost of each producer pass over a sliding window. Units are listed in the order the
/// scheduler first ran them, which is the per-frame order after the first few frames.
pub struct UnitProfiler {
    units: Vec<UnitTiming>,
    window: usize,
}

impl UnitProfiler {
    pub fn new() -> Self {
        Self::with_window(PROFILE_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self { units: Vec::new(), window: window.max(1) }
    }

    pub fn scope(&mut self, unit: &'static str) -> UnitProfileScope<'_> {
        UnitProfileScope { unit, profiler: self, start: Instant::now() }
    }

    fn record(&mut self, unit: &'static str, duration_ms: f32) {
        let index = match self.units.iter().position(|timing| timing.unit == unit) {
            Some(index) => index,
            None => {
                let recent = VecDeque::with_capacity(self.window);
                self.units.push(UnitTiming { unit, recent, samples: 0 });
                self.units.len() - 1
            }
        };
        let timing = &mut self.units[index];
        if timing.recent.len() == self.window {
            timing.recent.pop_front();
        }
        timing.recent.push_back(duration_ms);
        timing.samples += 1;
    }

    pub fn summary(&self, unit: &str) -> Option<UnitTimingSummary> {
        self.units.iter().find(|timing| timing.unit == unit).map(UnitTiming::summarize)
    }

    pub fn summaries(&self) -> Vec<UnitTimingSummary> {
        self.units.iter().map(UnitTiming::summarize).collect()
    }

    /// Unit with the highest windowed average, for a one-line overlay.
    pub fn slowest(&self) -> Option<UnitTimingSummary> {
        self.summaries().into_iter().max_by(|a, b| a.average_ms.total_cmp(&b.average_ms))
    }

    pub fn reset(&mut self) {
        self.units.clear();
    }
}

impl Default for UnitProfiler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct UnitProfileScope<'a> {
    unit: &'static str,
    profiler: &'a mut UnitProfiler,
    start: Instant,
}

impl Drop for UnitProfileScope<'_> {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f32() * 1000.0;
        self.profiler.record(self.unit, duration_ms);
    }
}
