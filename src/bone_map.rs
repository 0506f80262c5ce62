use crate::skeleton::{Skeleton, SkeletonId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const MIXAMO_PREFIX: &str = "mixamorig";
pub const HIERARCHY_ROOT: &str = "mixamorigHips";
pub const HEAD_BONE: &str = "mixamorigHead";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanonicalBone {
    pub id: &'static str,
    pub parent: Option<&'static str>,
    pub skip_rotation: bool,
}

const fn bone(id: &'static str, parent: &'static str) -> CanonicalBone {
    CanonicalBone { id, parent: Some(parent), skip_rotation: false }
}

const fn fixed(id: &'static str, parent: &'static str) -> CanonicalBone {
    CanonicalBone { id, parent: Some(parent), skip_rotation: true }
}

/// Known hierarchy, ordered parent-first.
pub const MIXAMO_BONES: &[CanonicalBone] = &[
    CanonicalBone { id: HIERARCHY_ROOT, parent: None, skip_rotation: false },
    bone("mixamorigSpine", "mixamorigHips"),
    bone("mixamorigSpine1", "mixamorigSpine"),
    bone("mixamorigSpine2", "mixamorigSpine1"),
    bone("mixamorigNeck", "mixamorigSpine2"),
    bone("mixamorigHead", "mixamorigNeck"),
    bone("mixamorigLeftShoulder", "mixamorigSpine2"),
    bone("mixamorigLeftArm", "mixamorigLeftShoulder"),
    bone("mixamorigLeftForeArm", "mixamorigLeftArm"),
    bone("mixamorigLeftHand", "mixamorigLeftForeArm"),
    bone("mixamorigRightShoulder", "mixamorigSpine2"),
    bone("mixamorigRightArm", "mixamorigRightShoulder"),
    bone("mixamorigRightForeArm", "mixamorigRightArm"),
    bone("mixamorigRightHand", "mixamorigRightForeArm"),
    bone("mixamorigLeftUpLeg", "mixamorigHips"),
    bone("mixamorigLeftLeg", "mixamorigLeftUpLeg"),
    bone("mixamorigLeftFoot", "mixamorigLeftLeg"),
    fixed("mixamorigLeftToeBase", "mixamorigLeftFoot"),
    fixed("mixamorigLeftToe_End", "mixamorigLeftToeBase"),
    bone("mixamorigRightUpLeg", "mixamorigHips"),
    bone("mixamorigRightLeg", "mixamorigRightUpLeg"),
    bone("mixamorigRightFoot", "mixamorigRightLeg"),
    fixed("mixamorigRightToeBase", "mixamorigRightFoot"),
    fixed("mixamorigRightToe_End", "mixamorigRightToeBase"),
];

pub fn canonical_bone(id: &str) -> Option<&'static CanonicalBone> {
    MIXAMO_BONES.iter().find(|bone| bone.id == id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamingConvention {
    Unprefixed,
    Prefixed,
    Explicit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoneTarget {
    pub name: Arc<str>,
    pub index: u32,
    pub convention: NamingConvention,
}

/// Canonical bone id -> bone of one concrete skeleton. Built once per skeleton instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoneNameMapping {
    skeleton: Option<SkeletonId>,
    entries: HashMap<Arc<str>, BoneTarget>,
}

impl BoneNameMapping {
    /// Probe the skeleton for each canonical bone, preferring the unprefixed spelling.
    pub fn resolve(skeleton: &Skeleton) -> Self {
        let names: HashSet<&str> = skeleton.names().collect();
        let mut entries = HashMap::with_capacity(MIXAMO_BONES.len());
        for canonical in MIXAMO_BONES {
            let unprefixed = canonical.id.strip_prefix(MIXAMO_PREFIX).unwrap_or(canonical.id);
            let (found, convention) = if names.contains(unprefixed) {
                (unprefixed, NamingConvention::Unprefixed)
            } else if names.contains(canonical.id) {
                (canonical.id, NamingConvention::Prefixed)
            } else {
                continue;
            };
            let Some(index) = skeleton.find(found) else {
                continue;
            };
            entries.insert(Arc::<str>::from(canonical.id), BoneTarget { name: Arc::from(found), index, convention });
        }
        Self { skeleton: Some(skeleton.id()), entries }
    }

    /// Build a mapping from explicit `(source, target)` pairs for rigs outside the known conventions.
    /// Pairs whose target bone does not exist are dropped.
    pub fn from_pairs<'a>(skeleton: &Skeleton, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut entries = HashMap::new();
        for (source, target) in pairs {
            if let Some(index) = skeleton.find(target) {
                entries.insert(
                    Arc::<str>::from(source),
                    BoneTarget { name: Arc::from(target), index, convention: NamingConvention::Explicit },
                );
            }
        }
        Self { skeleton: Some(skeleton.id()), entries }
    }

    pub fn skeleton(&self) -> Option<SkeletonId> {
        self.skeleton
    }

    pub fn target(&self, source: &str) -> Option<&BoneTarget> {
        self.entries.get(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoneTarget)> + '_ {
        self.entries.iter().map(|(source, target)| (source.as_ref(), target))
    }
}
