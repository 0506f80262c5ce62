#![allow(dead_code)]

use anyhow::{anyhow, Result};
use avatar_rig::bone_map::{MIXAMO_BONES, MIXAMO_PREFIX};
use avatar_rig::compositor::MorphMesh;
use avatar_rig::model::{BlinkPreset, EyeTrackingPreset};
use avatar_rig::model_switch::{ModelSource, PendingLoad};
use avatar_rig::pose_correction::PoseCorrectionTable;
use avatar_rig::skeleton::Skeleton;
use avatar_rig::{LoadedModel, ModelPreset, RigConfig};
use glam::{Quat, Vec3};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::task::Poll;

pub const WOMAN_CHANNELS: &[&str] = &[
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyesClosed",
    "eyeLookInLeft",
    "eyeLookOutLeft",
    "eyeLookInRight",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeTrackX",
    "mouthSmileLeft",
    "mouthSmileRight",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "browInnerUp",
    "browDownLeft",
    "browDownRight",
    "jawOpen",
    "mouthOpen",
    "mouthClose",
    "viseme_sil",
    "viseme_aa",
    "viseme_E",
    "viseme_I",
    "viseme_O",
    "viseme_U",
];

pub const MAN_CHANNELS: &[&str] = &[
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookInLeft",
    "eyeLookOutLeft",
    "eyeLookInRight",
    "eyeLookOutRight",
    "mouthSmile",
    "cheekSquintLeft",
    "browInnerUp",
    "jawOpen",
    "mouthOpen",
    "viseme_sil",
    "viseme_aa",
    "viseme_O",
];

pub fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "expected {b}, got {a}");
}

pub fn approx_quat(a: Quat, b: Quat, eps: f32) {
    // q and -q are the same rotation.
    let dot = a.dot(b).abs();
    assert!((1.0 - dot) <= eps, "quaternions differ: {a:?} vs {b:?}");
}

pub fn channel_table(names: &[&str]) -> BTreeMap<String, u32> {
    names.iter().enumerate().map(|(index, name)| (name.to_string(), index as u32)).collect()
}

/// "woman": prefixed bones, capped blink with no `eyesClosed` motion, capped gaze, a gaze alias.
pub fn woman_preset() -> ModelPreset {
    ModelPreset {
        name: "woman".into(),
        channels: channel_table(WOMAN_CHANNELS),
        gaze_aliases: vec!["eyeTrackX".into()],
        pose_corrections: PoseCorrectionTable::new().with_offset("mixamorigLeftArm", Vec3::new(0.0, 0.0, 5.0)),
        eye_tracking: EyeTrackingPreset { bias_degrees: 2.0, max_weight: 0.7, ..EyeTrackingPreset::default() },
        blink: BlinkPreset { cap: 0.7, eyes_closed_cap: Some(0.0) },
        camera_offset: [0.0, 1.55, 1.8],
        ..ModelPreset::default()
    }
}

/// "man": unprefixed bones, default caps, a smaller channel set split across two sub-meshes.
pub fn man_preset() -> ModelPreset {
    ModelPreset {
        name: "man".into(),
        channels: channel_table(MAN_CHANNELS),
        camera_offset: [0.0, 1.7, 2.0],
        ..ModelPreset::default()
    }
}

/// A Mixamo-shaped skeleton. Every bone's rest rotation is `rest`, so two rigs built with different
/// `rest` values disagree on bind pose.
pub fn mixamo_skeleton(prefixed: bool, rest: Quat) -> Result<Skeleton> {
    let mut skeleton = Skeleton::new();
    let mut indices: HashMap<&str, u32> = HashMap::new();
    for bone in MIXAMO_BONES {
        let name =
            if prefixed { bone.id.to_string() } else { bone.id.trim_start_matches(MIXAMO_PREFIX).to_string() };
        let parent = match bone.parent {
            Some(parent) => Some(*indices.get(parent).ok_or_else(|| anyhow!("parent {parent} not built yet"))?),
            None => None,
        };
        let translation = if parent.is_none() { Vec3::new(0.0, 1.0, 0.0) } else { Vec3::new(0.0, 0.1, 0.0) };
        let index = skeleton.add_bone(name, parent, translation, rest)?;
        indices.insert(bone.id, index);
    }
    skeleton.update_world_matrices();
    Ok(skeleton)
}

pub fn loaded_for(preset: &ModelPreset) -> Result<LoadedModel> {
    let prefixed = preset.name != "man";
    let rest = if prefixed { Quat::IDENTITY } else { Quat::from_rotation_x(0.3) };
    let skeleton = mixamo_skeleton(prefixed, rest)?;
    let targets = preset.channels.len();
    let meshes = if prefixed {
        vec![MorphMesh::new("body", targets)]
    } else {
        vec![MorphMesh::new("head", targets), MorphMesh::new("teeth", targets)]
    };
    Ok(LoadedModel { skeleton, meshes })
}

pub fn test_config() -> RigConfig {
    let mut config = RigConfig::default();
    config.blink.seed = Some(7);
    config
}

struct Delayed<T> {
    polls_left: u32,
    result: Option<Result<T>>,
}

impl<T> PendingLoad<T> for Delayed<T> {
    fn poll(&mut self) -> Poll<Result<T>> {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return Poll::Pending;
        }
        match self.result.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Ready(Err(anyhow!("polled after completion"))),
        }
    }
}

/// Knobs shared between a test and the source it handed to the rig.
#[derive(Default)]
pub struct SourceControl {
    pub latency: u32,
    pub fail_preset: Option<String>,
    pub fail_model: Option<String>,
    pub preset_requests: Vec<String>,
    pub model_requests: Vec<String>,
}

/// Serves the "woman" and "man" fixtures, each load pending for `latency` polls.
pub struct MemorySource {
    presets: HashMap<String, ModelPreset>,
    control: Rc<RefCell<SourceControl>>,
}

impl MemorySource {
    pub fn new() -> (Self, Rc<RefCell<SourceControl>>) {
        let control = Rc::new(RefCell::new(SourceControl::default()));
        let mut presets = HashMap::new();
        for preset in [woman_preset(), man_preset()] {
            presets.insert(preset.name.clone(), preset);
        }
        (Self { presets, control: Rc::clone(&control) }, control)
    }
}

impl ModelSource for MemorySource {
    fn load_preset(&mut self, name: &str) -> Box<dyn PendingLoad<ModelPreset>> {
        let mut control = self.control.borrow_mut();
        control.preset_requests.push(name.to_string());
        let result = if control.fail_preset.as_deref() == Some(name) {
            Err(anyhow!("preset '{name}' unavailable"))
        } else {
            self.presets.get(name).cloned().ok_or_else(|| anyhow!("unknown model '{name}'"))
        };
        Box::new(Delayed { polls_left: control.latency, result: Some(result) })
    }

    fn load_model(&mut self, preset: &ModelPreset) -> Box<dyn PendingLoad<LoadedModel>> {
        let mut control = self.control.borrow_mut();
        control.model_requests.push(preset.name.clone());
        let result = if control.fail_model.as_deref() == Some(preset.name.as_str()) {
            Err(anyhow!("mesh for '{}' failed to decode", preset.name))
        } else {
            loaded_for(preset)
        };
        Box::new(Delayed { polls_left: control.latency, result: Some(result) })
    }
}
