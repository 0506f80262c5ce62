use crate::channels::{ChannelStore, EYES_CLOSED, EYE_BLINK_LEFT, EYE_BLINK_RIGHT};
use crate::config::BlinkConfig;
use crate::model::{BlinkPreset, ModelKey};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq)]
enum BlinkState {
    Stopped,
    Waiting { remaining: f32 },
    Pulsing { elapsed: f32 },
}

/// Periodic eye-closure pulses: wait `interval + jitter`, then run a `sin(progress * PI)` pulse.
pub struct BlinkUnit {
    interval: f32,
    jitter: f32,
    pulse: f32,
    cap: f32,
    eyes_closed_cap: f32,
    rng: StdRng,
    state: BlinkState,
    pulses: u64,
    target: Option<ModelKey>,
}

impl BlinkUnit {
    pub fn new(config: &BlinkConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let defaults = BlinkPreset::default();
        Self {
            interval: (config.interval_ms / 1000.0).max(0.0),
            jitter: (config.jitter_ms / 1000.0).max(0.0),
            pulse: (config.pulse_ms / 1000.0).max(f32::EPSILON),
            cap: defaults.cap,
            eyes_closed_cap: defaults.eyes_closed_cap(),
            rng,
            state: BlinkState::Stopped,
            pulses: 0,
            target: None,
        }
    }

    pub fn retarget(&mut self, key: ModelKey, tuning: &BlinkPreset) {
        self.cap = tuning.cap.clamp(0.0, 1.0);
        self.eyes_closed_cap = tuning.eyes_closed_cap().clamp(0.0, 1.0);
        self.target = Some(key);
    }

    pub fn target(&self) -> Option<&ModelKey> {
        self.target.as_ref()
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, BlinkState::Stopped)
    }

    pub fn is_pulsing(&self) -> bool {
        matches!(self.state, BlinkState::Pulsing { .. })
    }

    pub fn pulses_started(&self) -> u64 {
        self.pulses
    }

    pub fn cap(&self) -> f32 {
        self.cap
    }

    /// Begin (or restart) the cycle. Any pulse in flight is dropped and its channels zeroed,
    /// so a restart can never overlap two pulses.
    pub fn start(&mut self, channels: Option<&mut ChannelStore>) {
        if self.is_pulsing() {
            if let Some(channels) = channels {
                write_pulse(channels, 0.0, 0.0);
            }
        }
        self.state = BlinkState::Waiting { remaining: self.next_wait() };
    }

    /// Synchronous: channels are zero when this returns.
    pub fn stop(&mut self, channels: Option<&mut ChannelStore>) {
        self.state = BlinkState::Stopped;
        if let Some(channels) = channels {
            write_pulse(channels, 0.0, 0.0);
        }
    }

    /// Advance by `dt` seconds. Returns the pulse value written this tick, if any.
    pub fn tick(&mut self, dt: f32, channels: &mut ChannelStore) -> Option<f32> {
        let dt = dt.max(0.0);
        match self.state {
            BlinkState::Stopped => None,
            BlinkState::Waiting { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    self.state = BlinkState::Waiting { remaining };
                    return None;
                }
                self.pulses += 1;
                self.advance_pulse(-remaining, channels)
            }
            BlinkState::Pulsing { elapsed } => self.advance_pulse(elapsed + dt, channels),
        }
    }

    fn advance_pulse(&mut self, elapsed: f32, channels: &mut ChannelStore) -> Option<f32> {
        let progress = elapsed / self.pulse;
        if progress >= 1.0 {
            write_pulse(channels, 0.0, 0.0);
            self.state = BlinkState::Waiting { remaining: self.next_wait() };
            return Some(0.0);
        }
        let value = (progress * PI).sin().max(0.0);
        write_pulse(channels, value * self.cap, value * self.eyes_closed_cap);
        self.state = BlinkState::Pulsing { elapsed };
        Some(value * self.cap)
    }

    fn next_wait(&mut self) -> f32 {
        let jitter = if self.jitter > 0.0 { self.rng.gen_range(0.0..self.jitter) } else { 0.0 };
        self.interval + jitter
    }
}

fn write_pulse(channels: &mut ChannelStore, eyes: f32, closed: f32) {
    channels.set(EYE_BLINK_LEFT, eyes);
    channels.set(EYE_BLINK_RIGHT, eyes);
    channels.set(EYES_CLOSED, closed);
}
