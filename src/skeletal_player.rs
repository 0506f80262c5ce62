use crate::bone_map::{BoneNameMapping, MIXAMO_BONES};
use crate::model::ModelKey;
use crate::pose_correction::{PoseCorrectionTable, PoseCorrector};
use crate::skeleton::Skeleton;
use anyhow::{Context, Result};
use glam::{Quat, Vec3, Vec4};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One streamed frame: a world-space orientation per canonical bone, optionally a root position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSample {
    pub rotations: HashMap<String, Quat>,
    pub root_position: Option<Vec3>,
}

impl FrameSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rotation(mut self, bone: &str, rotation: Quat) -> Self {
        self.rotations.insert(bone.to_string(), rotation);
        self
    }

    pub fn with_root_position(mut self, position: Vec3) -> Self {
        self.root_position = Some(position);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionKey<T> {
    pub time: f32,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionTrack {
    pub bone: String,
    pub positions: Vec<MotionKey<Vec3>>,
    pub rotations: Vec<MotionKey<Quat>>,
}

impl MotionTrack {
    pub fn new(bone: &str) -> Self {
        Self { bone: bone.to_string(), positions: Vec::new(), rotations: Vec::new() }
    }

    pub fn with_rotation(mut self, time: f32, rotation: Quat) -> Self {
        self.rotations.push(MotionKey { time, value: rotation });
        self
    }

    pub fn with_position(mut self, time: f32, position: Vec3) -> Self {
        self.positions.push(MotionKey { time, value: position });
        self
    }
}

/// Unit-length copy of `rotation`, or `None` when it is zero-length or not finite.
fn usable_rotation(rotation: Quat) -> Option<Quat> {
    Vec4::from(rotation).try_normalize().map(Quat::from_vec4)
}

fn latest_at<T: Copy>(keys: &[MotionKey<T>], time: f32) -> Option<T> {
    let upper = keys.partition_point(|key| key.time <= time);
    upper.checked_sub(1).map(|index| keys[index].value)
}

#[derive(Deserialize)]
struct BoneTrackPayload {
    #[serde(default)]
    position: Option<BTreeMap<String, [f32; 3]>>,
    #[serde(default)]
    rotation: Option<BTreeMap<String, [f32; 4]>>,
}

/// A one-shot externally supplied motion, keyed by bone name and sampled with step interpolation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionClip {
    tracks: Vec<MotionTrack>,
    timestamps: Vec<f32>,
}

impl MotionClip {
    pub fn from_tracks(tracks: Vec<MotionTrack>) -> Self {
        let mut tracks = tracks;
        let mut timestamps = Vec::new();
        for track in &mut tracks {
            let dropped = track.positions.len() + track.rotations.len();
            track.positions.retain(|key| key.time.is_finite() && key.value.is_finite());
            track.rotations = track
                .rotations
                .iter()
                .filter(|key| key.time.is_finite())
                .filter_map(|key| usable_rotation(key.value).map(|value| MotionKey { time: key.time, value }))
                .collect();
            let dropped = dropped - track.positions.len() - track.rotations.len();
            if dropped > 0 {
                log::debug!("[motion] bone '{}' dropped {dropped} unusable keys", track.bone);
            }
            track.positions.sort_by(|a, b| a.time.total_cmp(&b.time));
            track.rotations.sort_by(|a, b| a.time.total_cmp(&b.time));
            timestamps.extend(track.positions.iter().map(|key| key.time));
            timestamps.extend(track.rotations.iter().map(|key| key.time));
        }
        timestamps.sort_by(f32::total_cmp);
        timestamps.dedup();
        Self { tracks, timestamps }
    }

    /// Parses `{ "<bone>": { "position": { "<t>": [x, y, z] }, "rotation": { "<t>": [x, y, z, w] } } }`.
    /// Timestamps that are not numbers are dropped.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let payload: BTreeMap<String, BoneTrackPayload> =
            serde_json::from_slice(bytes).context("Failed to parse motion clip payload")?;
        let mut tracks = Vec::with_capacity(payload.len());
        for (bone, entry) in payload {
            let mut track = MotionTrack::new(&bone);
            for (stamp, value) in entry.position.unwrap_or_default() {
                match stamp.trim().parse::<f32>() {
                    Ok(time) => track.positions.push(MotionKey { time, value: Vec3::from_array(value) }),
                    Err(_) => log::debug!("[motion] bone '{bone}' has non-numeric position key '{stamp}'"),
                }
            }
            for (stamp, value) in entry.rotation.unwrap_or_default() {
                match stamp.trim().parse::<f32>() {
                    Ok(time) => track.rotations.push(MotionKey { time, value: Quat::from_array(value) }),
                    Err(_) => log::debug!("[motion] bone '{bone}' has non-numeric rotation key '{stamp}'"),
                }
            }
            tracks.push(track);
        }
        Ok(Self::from_tracks(tracks))
    }

    pub fn tracks(&self) -> &[MotionTrack] {
        &self.tracks
    }

    pub fn timestamps(&self) -> &[f32] {
        &self.timestamps
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f32> {
        self.timestamps.last().copied()
    }

    /// Latest timestamp not after `elapsed`.
    pub fn frame_at(&self, elapsed: f32) -> Option<f32> {
        let upper = self.timestamps.partition_point(|time| *time <= elapsed);
        upper.checked_sub(1).map(|index| self.timestamps[index])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipProgress {
    Playing,
    Finished,
}

struct ActiveClip {
    clip: Arc<MotionClip>,
    elapsed: f32,
}

/// Drives bone rotations from streamed frames and one-shot motion clips.
pub struct SkeletalAnimationPlayer {
    corrector: PoseCorrector,
    last_frame: Option<FrameSample>,
    clip: Option<ActiveClip>,
    target: Option<ModelKey>,
}

impl SkeletalAnimationPlayer {
    pub fn new() -> Self {
        Self { corrector: PoseCorrector::new(), last_frame: None, clip: None, target: None }
    }

    pub fn target(&self) -> Option<&ModelKey> {
        self.target.as_ref()
    }

    pub fn corrector(&self) -> &PoseCorrector {
        &self.corrector
    }

    pub fn last_frame(&self) -> Option<&FrameSample> {
        self.last_frame.as_ref()
    }

    pub fn is_playing_clip(&self) -> bool {
        self.clip.is_some()
    }

    pub fn clip_elapsed(&self) -> Option<f32> {
        self.clip.as_ref().map(|active| active.elapsed)
    }

    /// Record the newest streamed frame. It is held and re-applied until a newer one arrives.
    pub fn push_frame(&mut self, sample: FrameSample) {
        self.last_frame = Some(sample);
    }

    /// Point at a new model and immediately pose it with whatever is currently playing, so the new
    /// skeleton is never shown in its rest pose.
    pub fn retarget(
        &mut self,
        key: ModelKey,
        corrections: &PoseCorrectionTable,
        mapping: &BoneNameMapping,
        skeleton: &mut Skeleton,
    ) {
        self.corrector.activate(key.name_arc(), corrections);
        self.target = Some(key);
        if let Some(frame) = &self.last_frame {
            self.apply_frame(frame, mapping, skeleton);
        }
        if let Some(active) = &self.clip {
            apply_clip_frame(&active.clip, active.elapsed, mapping, skeleton);
        }
    }

    /// Start a clip. An empty clip counts as already finished and returns `Finished`.
    pub fn play_clip(&mut self, clip: MotionClip) -> ClipProgress {
        if clip.is_empty() {
            log::debug!("[motion] ignoring clip without timestamps");
            self.clip = None;
            return ClipProgress::Finished;
        }
        self.clip = Some(ActiveClip { clip: Arc::new(clip), elapsed: 0.0 });
        ClipProgress::Playing
    }

    pub fn stop_clip(&mut self) -> bool {
        self.clip.take().is_some()
    }

    /// Pose `skeleton` from a streamed frame. Returns how many bones were written.
    ///
    /// Each sample rotation (with the model's pose correction composed after it) is the desired
    /// world orientation. The root takes it directly as its local rotation; every other bone gets
    /// `inverse(parent_world) * desired`, so rigs with different rest poses end up with the same
    /// world orientation.
    pub fn apply_frame(&self, sample: &FrameSample, mapping: &BoneNameMapping, skeleton: &mut Skeleton) -> usize {
        let mut applied = 0;
        for canonical in MIXAMO_BONES {
            let Some(rotation) = sample.rotations.get(canonical.id).copied().and_then(usable_rotation) else {
                continue;
            };
            let Some(target) = mapping.target(canonical.id) else {
                continue;
            };
            if canonical.skip_rotation {
                continue;
            }
            let desired = match self.corrector.correction(canonical.id) {
                Some(correction) => rotation * correction,
                None => rotation,
            };
            let local = if canonical.parent.is_none() {
                desired
            } else {
                match skeleton.bone(target.index).and_then(|bone| bone.parent) {
                    Some(parent) => skeleton.world_rotation(parent).inverse() * desired,
                    None => skeleton.origin_rotation().inverse() * desired,
                }
            };
            let Some(local) = usable_rotation(local) else {
                continue;
            };
            if let Some(bone) = skeleton.bone_mut(target.index) {
                bone.rotation = local;
                applied += 1;
            }
            let root_position = sample.root_position.filter(|position| position.is_finite());
            if canonical.parent.is_none() {
                if let (Some(position), Some(bone)) = (root_position, skeleton.bone_mut(target.index)) {
                    bone.translation = position;
                }
            }
        }
        skeleton.update_world_matrices();
        applied
    }

    /// Advance by `dt` seconds against the given skeleton. Returns `Some(Finished)` on the tick a
    /// clip completes; `None` while nothing finished.
    pub fn tick(&mut self, dt: f32, mapping: &BoneNameMapping, skeleton: &mut Skeleton) -> Option<ClipProgress> {
        if let Some(active) = self.clip.as_mut() {
            active.elapsed += dt.max(0.0);
            let progress = apply_clip_frame(&active.clip, active.elapsed, mapping, skeleton);
            if progress == ClipProgress::Finished {
                self.clip = None;
                return Some(ClipProgress::Finished);
            }
            return None;
        }
        if let Some(frame) = &self.last_frame {
            self.apply_frame(frame, mapping, skeleton);
        }
        None
    }
}

impl Default for SkeletalAnimationPlayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the clip frame at `elapsed` (latest timestamp not after it, no blending) straight onto the
/// named bones' local transforms. Clip bones resolve through the mapping first, then by exact name.
pub fn apply_clip_frame(
    clip: &MotionClip,
    elapsed: f32,
    mapping: &BoneNameMapping,
    skeleton: &mut Skeleton,
) -> ClipProgress {
    let Some(last) = clip.last_timestamp() else {
        return ClipProgress::Finished;
    };
    let Some(frame) = clip.frame_at(elapsed.min(last)) else {
        return ClipProgress::Playing;
    };
    for track in clip.tracks() {
        let index = match mapping.target(&track.bone) {
            Some(target) => target.index,
            None => match skeleton.find(&track.bone) {
                Some(index) => index,
                None => continue,
            },
        };
        let rotation = latest_at(&track.rotations, frame);
        let position = latest_at(&track.positions, frame);
        if let Some(bone) = skeleton.bone_mut(index) {
            if let Some(rotation) = rotation {
                bone.rotation = rotation;
            }
            if let Some(position) = position {
                bone.translation = position;
            }
        }
    }
    skeleton.update_world_matrices();
    if elapsed > last {
        ClipProgress::Finished
    } else {
        ClipProgress::Playing
    }
}
