use crate::channels::{ChannelStore, GazeChannel};
use crate::config::EyeTrackingConfig;
use crate::model::{EyeTrackingPreset, ModelKey};
use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GazeInputs {
    pub camera: Vec3,
    pub head: Vec3,
    pub forward: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GazeSide {
    Center,
    /// Camera on the character's left: left eye looks out, right eye looks in.
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GazeReading {
    pub angle: f32,
    pub side: GazeSide,
    pub weight: f32,
}

/// Ease-out response: `1 - (1 - raw)^(10/3)` with `raw = min(|angle| * gain, 1)`, capped at `max_weight`.
pub fn gaze_weight(angle: f32, gain: f32, max_weight: f32) -> f32 {
    let raw = (angle.abs() * gain).min(1.0);
    let eased = 1.0 - (1.0 - raw).powf(10.0 / 3.0);
    eased.min(max_weight).clamp(0.0, 1.0)
}

pub struct EyeTrackingUnit {
    enabled: bool,
    dead_zone: f32,
    tuning: EyeTrackingPreset,
    last: Option<GazeReading>,
    target: Option<ModelKey>,
}

impl EyeTrackingUnit {
    pub fn new(config: &EyeTrackingConfig) -> Self {
        Self {
            enabled: config.enabled,
            dead_zone: config.dead_zone_degrees.to_radians().abs(),
            tuning: EyeTrackingPreset::default(),
            last: None,
            target: None,
        }
    }

    pub fn retarget(&mut self, key: ModelKey, tuning: &EyeTrackingPreset) {
        self.tuning = tuning.clone();
        self.target = Some(key);
        self.last = None;
    }

    pub fn target(&self) -> Option<&ModelKey> {
        self.target.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling releases the gaze: all four horizontal channels are zeroed immediately.
    pub fn set_enabled(&mut self, enabled: bool, channels: Option<&mut ChannelStore>) {
        self.enabled = enabled;
        if !enabled {
            self.last = None;
            if let Some(channels) = channels {
                zero_horizontal(channels);
            }
        }
    }

    pub fn last_reading(&self) -> Option<GazeReading> {
        self.last
    }

    /// Signed horizontal angle from the character's forward axis to the camera, bias applied.
    /// Positive when the camera is on the character's left.
    pub fn gaze_angle(&self, inputs: &GazeInputs) -> f32 {
        let head = inputs.head + Vec3::Y * self.tuning.head_height_offset;
        let to_camera = inputs.camera - head;
        let forward = Vec3::new(inputs.forward.x, 0.0, inputs.forward.z).normalize_or_zero();
        let forward = if forward == Vec3::ZERO { Vec3::Z } else { forward };
        let left = Vec3::Y.cross(forward);
        let angle = to_camera.dot(left).atan2(to_camera.dot(forward));
        let biased = angle + self.tuning.bias_degrees.to_radians();
        biased.sin().atan2(biased.cos())
    }

    pub fn tick(&mut self, inputs: &GazeInputs, channels: &mut ChannelStore) -> Option<GazeReading> {
        if !self.enabled {
            return None;
        }
        let angle = self.gaze_angle(inputs);
        zero_horizontal(channels);
        if angle.abs() < self.dead_zone {
            let reading = GazeReading { angle, side: GazeSide::Center, weight: 0.0 };
            self.last = Some(reading);
            return Some(reading);
        }

        let weight = gaze_weight(angle, self.tuning.gain, self.tuning.max_weight);
        let (side, pair) = if angle > 0.0 {
            (GazeSide::Left, [GazeChannel::LookOutLeft, GazeChannel::LookInRight])
        } else {
            (GazeSide::Right, [GazeChannel::LookInLeft, GazeChannel::LookOutRight])
        };
        for channel in pair {
            channels.set(channel.name(), weight);
        }
        let reading = GazeReading { angle, side, weight };
        self.last = Some(reading);
        Some(reading)
    }
}

fn zero_horizontal(channels: &mut ChannelStore) {
    for channel in GazeChannel::HORIZONTAL {
        channels.set(channel.name(), 0.0);
    }
}
