use anyhow::{ensure, Result};
use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SKELETON_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one loaded skeleton instance. Two skeletons built from the same asset still get distinct ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SkeletonId(u64);

impl SkeletonId {
    fn next() -> Self {
        Self(NEXT_SKELETON_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: Arc<str>,
    pub parent: Option<u32>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    world: Mat4,
}

impl Bone {
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }
}

/// A bone tree stored parent-first: every bone's parent index is smaller than its own index,
/// so world matrices can be propagated in a single forward pass.
pub struct Skeleton {
    id: SkeletonId,
    bones: Vec<Bone>,
    by_name: HashMap<Arc<str>, u32>,
    origin_translation: Vec3,
    origin_rotation: Quat,
}

impl Skeleton {
    pub fn new() -> Self {
        Self {
            id: SkeletonId::next(),
            bones: Vec::new(),
            by_name: HashMap::new(),
            origin_translation: Vec3::ZERO,
            origin_rotation: Quat::IDENTITY,
        }
    }

    pub fn id(&self) -> SkeletonId {
        self.id
    }

    pub fn add_bone(
        &mut self,
        name: impl Into<Arc<str>>,
        parent: Option<u32>,
        translation: Vec3,
        rotation: Quat,
    ) -> Result<u32> {
        let name = name.into();
        let index = self.bones.len() as u32;
        if let Some(parent) = parent {
            ensure!(parent < index, "bone '{name}' references parent {parent} which is not yet defined");
        }
        ensure!(!self.by_name.contains_key(&name), "duplicate bone name '{name}'");
        self.by_name.insert(Arc::clone(&name), index);
        self.bones.push(Bone {
            name,
            parent,
            translation,
            rotation: rotation.normalize(),
            scale: Vec3::ONE,
            world: Mat4::IDENTITY,
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: u32) -> Option<&Bone> {
        self.bones.get(index as usize)
    }

    pub fn bone_mut(&mut self, index: u32) -> Option<&mut Bone> {
        self.bones.get_mut(index as usize)
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.bones.iter().map(|bone| bone.name.as_ref())
    }

    pub fn set_origin(&mut self, translation: Vec3, rotation: Quat) {
        self.origin_translation = translation;
        self.origin_rotation = rotation.normalize();
    }

    pub fn origin_rotation(&self) -> Quat {
        self.origin_rotation
    }

    /// Facing direction of the character in world space.
    pub fn forward(&self) -> Vec3 {
        self.origin_rotation * Vec3::Z
    }

    /// World rotation of `index`, composed from the current local rotations rather than the cached
    /// matrices, so edits made earlier in the same pass are visible to children.
    pub fn world_rotation(&self, index: u32) -> Quat {
        let mut rotation = Quat::IDENTITY;
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            let Some(bone) = self.bones.get(current as usize) else {
                break;
            };
            rotation = bone.rotation * rotation;
            cursor = bone.parent;
        }
        (self.origin_rotation * rotation).normalize()
    }

    pub fn world_position(&self, index: u32) -> Option<Vec3> {
        self.bones.get(index as usize).map(|bone| bone.world.w_axis.truncate())
    }

    pub fn update_world_matrices(&mut self) {
        let origin = Mat4::from_rotation_translation(self.origin_rotation, self.origin_translation);
        for index in 0..self.bones.len() {
            let local = self.bones[index].local_matrix();
            let parent_world = match self.bones[index].parent {
                Some(parent) => self.bones[parent as usize].world,
                None => origin,
            };
            self.bones[index].world = parent_world * local;
        }
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new()
    }
}
