use crate::lip_sync::Viseme;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub const EYE_BLINK_LEFT: &str = "eyeBlinkLeft";
pub const EYE_BLINK_RIGHT: &str = "eyeBlinkRight";
pub const EYES_CLOSED: &str = "eyesClosed";
pub const MOUTH_OPEN: &str = "mouthOpen";
pub const MOUTH_CLOSE: &str = "mouthClose";

pub const BLINK_CHANNELS: [&str; 3] = [EYE_BLINK_LEFT, EYE_BLINK_RIGHT, EYES_CLOSED];

/// The closed set of gaze channels. Procedural eye tracking owns these; nothing else may write them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GazeChannel {
    LookInLeft,
    LookOutLeft,
    LookUpLeft,
    LookDownLeft,
    LookInRight,
    LookOutRight,
    LookUpRight,
    LookDownRight,
}

impl GazeChannel {
    pub const ALL: [GazeChannel; 8] = [
        GazeChannel::LookInLeft,
        GazeChannel::LookOutLeft,
        GazeChannel::LookUpLeft,
        GazeChannel::LookDownLeft,
        GazeChannel::LookInRight,
        GazeChannel::LookOutRight,
        GazeChannel::LookUpRight,
        GazeChannel::LookDownRight,
    ];

    /// The four horizontal channels driven by eye tracking.
    pub const HORIZONTAL: [GazeChannel; 4] = [
        GazeChannel::LookOutLeft,
        GazeChannel::LookInRight,
        GazeChannel::LookInLeft,
        GazeChannel::LookOutRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GazeChannel::LookInLeft => "eyeLookInLeft",
            GazeChannel::LookOutLeft => "eyeLookOutLeft",
            GazeChannel::LookUpLeft => "eyeLookUpLeft",
            GazeChannel::LookDownLeft => "eyeLookDownLeft",
            GazeChannel::LookInRight => "eyeLookInRight",
            GazeChannel::LookOutRight => "eyeLookOutRight",
            GazeChannel::LookUpRight => "eyeLookUpRight",
            GazeChannel::LookDownRight => "eyeLookDownRight",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.name() == name)
    }
}

/// Channel name -> morph-target index, shared by every sub-mesh of one model.
#[derive(Debug, Clone, Default)]
pub struct ChannelIndexMap {
    indices: HashMap<Arc<str>, u32>,
    gaze_aliases: HashSet<Arc<str>>,
}

impl ChannelIndexMap {
    pub fn new<'a>(
        channels: impl IntoIterator<Item = (&'a str, u32)>,
        gaze_aliases: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            indices: channels.into_iter().map(|(name, index)| (Arc::<str>::from(name), index)).collect(),
            gaze_aliases: gaze_aliases.into_iter().map(Arc::<str>::from).collect(),
        }
    }

    pub fn from_table(channels: &BTreeMap<String, u32>, gaze_aliases: &[String]) -> Self {
        Self::new(
            channels.iter().map(|(name, index)| (name.as_str(), *index)),
            gaze_aliases.iter().map(String::as_str),
        )
    }

    pub fn index(&self, name: &str) -> Option<u32> {
        self.indices.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Exact-set membership against the gaze enum plus the model's declared aliases.
    pub fn is_gaze(&self, name: &str) -> bool {
        GazeChannel::from_name(name).is_some() || self.gaze_aliases.contains(name)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.indices.iter().map(|(name, index)| (name.as_ref(), *index))
    }
}

#[derive(Debug, Clone)]
struct ChannelSlot {
    name: Arc<str>,
    morph_index: u32,
    weight: f32,
    dirty: bool,
    gaze: bool,
}

/// Current weight of every channel the model supports. Writes are clamped to [0, 1];
/// writes to channels the model lacks are dropped.
#[derive(Debug, Clone, Default)]
pub struct ChannelStore {
    slots: Vec<ChannelSlot>,
    by_name: HashMap<Arc<str>, usize>,
}

pub fn sanitize_weight(weight: f32) -> f32 {
    if weight.is_finite() {
        weight.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl ChannelStore {
    pub fn new(map: &ChannelIndexMap) -> Self {
        let mut entries: Vec<(&str, u32)> = map.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        let mut slots = Vec::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());
        for (name, morph_index) in entries {
            let name: Arc<str> = Arc::from(name);
            by_name.insert(Arc::clone(&name), slots.len());
            slots.push(ChannelSlot { gaze: map.is_gaze(&name), name, morph_index, weight: 0.0, dirty: true });
        }
        Self { slots, by_name }
    }

    /// Returns false when the model has no such channel.
    pub fn set(&mut self, name: &str, weight: f32) -> bool {
        let Some(&slot) = self.by_name.get(name) else {
            return false;
        };
        let slot = &mut self.slots[slot];
        let weight = sanitize_weight(weight);
        if slot.weight.to_bits() != weight.to_bits() {
            slot.weight = weight;
            slot.dirty = true;
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.by_name.get(name).map(|&slot| self.slots[slot].weight)
    }

    pub fn weight(&self, name: &str) -> f32 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn is_gaze(&self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(&slot) => self.slots[slot].gaze,
            None => GazeChannel::from_name(name).is_some(),
        }
    }

    pub fn is_viseme(&self, name: &str) -> bool {
        Viseme::from_channel(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.slots.iter().map(|slot| (slot.name.as_ref(), slot.weight))
    }

    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> + '_ {
        self.slots.iter().map(|slot| &slot.name)
    }

    pub fn zero(&mut self, names: &[&str]) {
        for name in names {
            self.set(name, 0.0);
        }
    }

    /// Yield `(morph_index, weight)` for every channel written since the last drain.
    pub(crate) fn drain_dirty(&mut self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.slots.iter_mut().filter(|slot| slot.dirty).map(|slot| {
            slot.dirty = false;
            (slot.morph_index, slot.weight)
        })
    }
}
