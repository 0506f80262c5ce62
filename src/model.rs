use crate::bone_map::{BoneNameMapping, HEAD_BONE};
use crate::channels::{ChannelIndexMap, ChannelStore};
use crate::compositor::MorphMesh;
use crate::pose_correction::PoseCorrectionTable;
use crate::skeleton::Skeleton;
use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MODEL_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Names one loaded instance of a character model. Reloading the same model yields a new generation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelKey {
    name: Arc<str>,
    generation: u64,
}

impl ModelKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into(), generation: NEXT_MODEL_GENERATION.fetch_add(1, Ordering::Relaxed) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EyeTrackingPreset {
    #[serde(default)]
    pub bias_degrees: f32,
    #[serde(default = "EyeTrackingPreset::default_gain")]
    pub gain: f32,
    #[serde(default = "EyeTrackingPreset::default_max_weight")]
    pub max_weight: f32,
    #[serde(default = "EyeTrackingPreset::default_head_height_offset")]
    pub head_height_offset: f32,
}

impl EyeTrackingPreset {
    const fn default_gain() -> f32 {
        1.5
    }

    const fn default_max_weight() -> f32 {
        1.0
    }

    const fn default_head_height_offset() -> f32 {
        0.08
    }
}

impl Default for EyeTrackingPreset {
    fn default() -> Self {
        Self {
            bias_degrees: 0.0,
            gain: Self::default_gain(),
            max_weight: Self::default_max_weight(),
            head_height_offset: Self::default_head_height_offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlinkPreset {
    #[serde(default = "BlinkPreset::default_cap")]
    pub cap: f32,
    /// Cap for the combined `eyesClosed` channel; falls back to `cap`.
    #[serde(default)]
    pub eyes_closed_cap: Option<f32>,
}

impl BlinkPreset {
    const fn default_cap() -> f32 {
        1.0
    }

    pub fn eyes_closed_cap(&self) -> f32 {
        self.eyes_closed_cap.unwrap_or(self.cap)
    }
}

impl Default for BlinkPreset {
    fn default() -> Self {
        Self { cap: Self::default_cap(), eyes_closed_cap: None }
    }
}

/// Everything the rig needs to know about one character model before it touches the scene.
/// The numbers are tuned per asset and are treated as opaque data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelPreset {
    pub name: String,
    #[serde(default)]
    pub channels: BTreeMap<String, u32>,
    #[serde(default)]
    pub gaze_aliases: Vec<String>,
    #[serde(default)]
    pub pose_corrections: PoseCorrectionTable,
    #[serde(default)]
    pub eye_tracking: EyeTrackingPreset,
    #[serde(default)]
    pub blink: BlinkPreset,
    #[serde(default)]
    pub camera_offset: [f32; 3],
    #[serde(default)]
    pub materials: Value,
    #[serde(default)]
    pub lighting: Value,
}

impl ModelPreset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read model preset {}", path.display()))?;
        Self::from_json_slice(&bytes).with_context(|| format!("Failed to parse model preset {}", path.display()))
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let preset: ModelPreset = serde_json::from_slice(bytes)?;
        anyhow::ensure!(!preset.name.is_empty(), "model preset is missing a name");
        Ok(preset)
    }

    pub fn channel_map(&self) -> ChannelIndexMap {
        ChannelIndexMap::from_table(&self.channels, &self.gaze_aliases)
    }

    pub fn camera_offset(&self) -> Vec3 {
        Vec3::from_array(self.camera_offset)
    }
}

/// Output of the asset loader for one model: skeleton plus the morph-carrying sub-meshes.
pub struct LoadedModel {
    pub skeleton: Skeleton,
    pub meshes: Vec<MorphMesh>,
}

/// A model as it lives in the scene: loaded data, its preset, and the state derived from both.
pub struct CharacterInstance {
    pub key: ModelKey,
    pub preset: Arc<ModelPreset>,
    pub skeleton: Skeleton,
    pub meshes: Vec<MorphMesh>,
    pub channel_map: ChannelIndexMap,
    pub channels: ChannelStore,
    pub bone_map: BoneNameMapping,
}

impl CharacterInstance {
    pub fn assemble(preset: Arc<ModelPreset>, loaded: LoadedModel) -> Self {
        let LoadedModel { mut skeleton, meshes } = loaded;
        skeleton.update_world_matrices();
        let channel_map = preset.channel_map();
        let channels = ChannelStore::new(&channel_map);
        let bone_map = BoneNameMapping::resolve(&skeleton);
        Self { key: ModelKey::new(preset.name.as_str()), preset, skeleton, meshes, channel_map, channels, bone_map }
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn head_bone(&self) -> Option<u32> {
        self.bone_map.target(HEAD_BONE).map(|target| target.index)
    }

    pub fn head_position(&self) -> Vec3 {
        self.head_bone().and_then(|index| self.skeleton.world_position(index)).unwrap_or(Vec3::ZERO)
    }

    pub fn forward(&self) -> Vec3 {
        self.skeleton.forward()
    }
}
