use crate::channels::{sanitize_weight, ChannelStore, MOUTH_CLOSE, MOUTH_OPEN};
use crate::config::LipSyncConfig;
use crate::model::ModelKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Viseme {
    Sil,
    Aa,
    E,
    I,
    O,
    U,
}

impl Viseme {
    pub const ALL: [Viseme; 6] = [Viseme::Sil, Viseme::Aa, Viseme::E, Viseme::I, Viseme::O, Viseme::U];

    pub fn channel(self) -> &'static str {
        match self {
            Viseme::Sil => "viseme_sil",
            Viseme::Aa => "viseme_aa",
            Viseme::E => "viseme_E",
            Viseme::I => "viseme_I",
            Viseme::O => "viseme_O",
            Viseme::U => "viseme_U",
        }
    }

    pub fn from_channel(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|viseme| viseme.channel() == name)
    }

    /// Bucket a volume sample into a mouth shape. Louder samples map to wider vowels.
    pub fn classify(amplitude: f32) -> Self {
        let amplitude = sanitize_weight(amplitude);
        if amplitude < 0.05 {
            Viseme::Sil
        } else if amplitude < 0.15 {
            Viseme::U
        } else if amplitude < 0.3 {
            Viseme::O
        } else if amplitude < 0.45 {
            Viseme::E
        } else if amplitude < 0.6 {
            Viseme::I
        } else {
            Viseme::Aa
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

const SETTLED_EPSILON: f32 = 1e-3;

fn lerp(current: f32, target: f32, t: f32) -> f32 {
    current + (target - current) * t
}

pub struct LipSyncUnit {
    gain: f32,
    smoothing: f32,
    amplitude: f32,
    viseme: Viseme,
    mouth_open: f32,
    visemes: [f32; 6],
    active: bool,
    target: Option<ModelKey>,
}

impl LipSyncUnit {
    pub fn new(config: &LipSyncConfig) -> Self {
        Self {
            gain: config.gain.max(0.0),
            smoothing: config.smoothing.clamp(0.0, 1.0),
            amplitude: 0.0,
            viseme: Viseme::Sil,
            mouth_open: 0.0,
            visemes: [0.0; 6],
            active: false,
            target: None,
        }
    }

    pub fn set_input(&mut self, amplitude: f32, viseme: Viseme) {
        self.amplitude = sanitize_weight(amplitude);
        self.viseme = viseme;
        if self.amplitude > 0.0 {
            self.active = true;
        }
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.set_input(amplitude, Viseme::classify(amplitude));
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn viseme(&self) -> Viseme {
        self.viseme
    }

    pub fn mouth_open(&self) -> f32 {
        self.mouth_open
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target(&self) -> Option<&ModelKey> {
        self.target.as_ref()
    }

    pub fn retarget(&mut self, key: ModelKey) {
        self.target = Some(key);
        if self.mouth_open > 0.0 || self.visemes.iter().any(|weight| *weight > 0.0) {
            self.active = true;
        }
    }

    /// Ease the mouth toward the current volume. Once speech has stopped and every weight has
    /// settled at zero the unit stops writing, leaving the mouth channels to other producers.
    pub fn tick(&mut self, channels: &mut ChannelStore) {
        if !self.active {
            return;
        }
        let target = sanitize_weight(self.amplitude * self.gain);
        self.mouth_open = lerp(self.mouth_open, target, self.smoothing);
        for viseme in Viseme::ALL {
            let goal = if viseme == self.viseme { target } else { 0.0 };
            let slot = viseme.slot();
            self.visemes[slot] = lerp(self.visemes[slot], goal, self.smoothing);
        }

        let settled = target == 0.0
            && self.mouth_open < SETTLED_EPSILON
            && self.visemes.iter().all(|weight| *weight < SETTLED_EPSILON);
        if settled {
            self.mouth_open = 0.0;
            self.visemes = [0.0; 6];
            self.active = false;
        }

        channels.set(MOUTH_OPEN, self.mouth_open);
        if channels.contains(MOUTH_CLOSE) {
            channels.set(MOUTH_CLOSE, self.mouth_open);
        }
        for viseme in Viseme::ALL {
            channels.set(viseme.channel(), self.visemes[viseme.slot()]);
        }
    }
}
