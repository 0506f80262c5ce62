use glam::{EulerRot, Quat, Vec3};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Per-model fixed Euler offsets (degrees, XYZ order) keyed by canonical bone id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct PoseCorrectionTable {
    offsets: BTreeMap<String, [f32; 3]>,
}

impl PoseCorrectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(mut self, bone: &str, euler_degrees: Vec3) -> Self {
        self.offsets.insert(bone.to_string(), euler_degrees.to_array());
        self
    }

    pub fn offset_degrees(&self, bone: &str) -> Option<Vec3> {
        self.offsets.get(bone).map(|value| Vec3::from_array(*value))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec3)> + '_ {
        self.offsets.iter().map(|(bone, value)| (bone.as_str(), Vec3::from_array(*value)))
    }
}

pub fn euler_degrees_to_quat(euler_degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        euler_degrees.x.to_radians(),
        euler_degrees.y.to_radians(),
        euler_degrees.z.to_radians(),
    )
}

/// Supplies the active model's corrections. Swapped wholesale at a skeleton swap; never blended.
#[derive(Debug, Clone, Default)]
pub struct PoseCorrector {
    model: Option<Arc<str>>,
    rotations: HashMap<String, Quat>,
}

impl PoseCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&mut self, model: Arc<str>, table: &PoseCorrectionTable) {
        self.rotations =
            table.iter().map(|(bone, euler)| (bone.to_string(), euler_degrees_to_quat(euler))).collect();
        self.model = Some(model);
    }

    pub fn clear(&mut self) {
        self.model = None;
        self.rotations.clear();
    }

    pub fn active_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn correction(&self, bone: &str) -> Option<Quat> {
        self.rotations.get(bone).copied()
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}
