//! Keyframed facial expressions played over the channel store.
//!
//! A session interpolates the template's channels, holds briefly, then eases every touched
//! channel back to the baseline captured the first time an expression ran on the current model.
//! Gaze channels are never read into the baseline nor written, in any phase.

use crate::channels::{ChannelStore, BLINK_CHANNELS};
use crate::config::ExpressionConfig;
use crate::model::ModelKey;
use anyhow::{anyhow, ensure, Context, Result};
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpressionKeyframe {
    /// Normalized time in [0, 1].
    pub time: f32,
    #[serde(default)]
    pub channels: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpressionTemplate {
    #[serde(default)]
    pub name: String,
    pub duration_ms: f32,
    #[serde(default)]
    pub keyframes: Vec<ExpressionKeyframe>,
}

impl ExpressionTemplate {
    pub fn new(name: &str, duration_ms: f32, keyframes: Vec<ExpressionKeyframe>) -> Result<Self> {
        let mut template = Self { name: name.to_string(), duration_ms, keyframes };
        template.normalize()?;
        Ok(template)
    }

    fn normalize(&mut self) -> Result<()> {
        ensure!(
            self.duration_ms.is_finite() && self.duration_ms > 0.0,
            "expression '{}' has non-positive duration {}",
            self.name,
            self.duration_ms
        );
        for keyframe in &mut self.keyframes {
            ensure!(keyframe.time.is_finite(), "expression '{}' has a non-finite keyframe time", self.name);
            keyframe.time = keyframe.time.clamp(0.0, 1.0);
        }
        self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(())
    }

    pub fn duration(&self) -> f32 {
        self.duration_ms / 1000.0
    }

    /// Interpolated value of every channel named by the keyframes bracketing `progress`.
    /// A channel missing from one side of the bracket counts as 0 on that side.
    pub fn sample(&self, progress: f32) -> Vec<(&str, f32)> {
        let Some(first) = self.keyframes.first() else {
            return Vec::new();
        };
        let progress = progress.clamp(0.0, 1.0);
        let upper = self.keyframes.partition_point(|keyframe| keyframe.time <= progress);
        let (from, to) = if upper == 0 {
            (first, first)
        } else if upper >= self.keyframes.len() {
            let last = &self.keyframes[self.keyframes.len() - 1];
            (last, last)
        } else {
            (&self.keyframes[upper - 1], &self.keyframes[upper])
        };
        let span = to.time - from.time;
        let t = if span > f32::EPSILON { ((progress - from.time) / span).clamp(0.0, 1.0) } else { 1.0 };

        let mut out: Vec<(&str, f32)> = Vec::with_capacity(from.channels.len().max(to.channels.len()));
        for (name, start) in &from.channels {
            let end = to.channels.get(name).copied().unwrap_or(0.0);
            out.push((name.as_str(), start + (end - start) * t));
        }
        for (name, end) in &to.channels {
            if !from.channels.contains_key(name) {
                out.push((name.as_str(), end * t));
            }
        }
        out
    }
}

pub fn keyframe(time: f32, channels: &[(&str, f32)]) -> ExpressionKeyframe {
    ExpressionKeyframe {
        time,
        channels: channels.iter().map(|(name, value)| (name.to_string(), *value)).collect(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpressionLibrary {
    templates: HashMap<String, Arc<ExpressionTemplate>>,
}

impl ExpressionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read expression library {}", path.display()))?;
        Self::from_json_slice(&bytes)
            .with_context(|| format!("Failed to parse expression library {}", path.display()))
    }

    /// Parses `{ "<name>": { "duration_ms": .., "keyframes": [..] }, .. }`.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, ExpressionTemplate> = serde_json::from_slice(bytes)?;
        let mut library = Self::new();
        for (name, mut template) in raw {
            template.name = name;
            template.normalize()?;
            library.insert(template);
        }
        Ok(library)
    }

    pub fn insert(&mut self, template: ExpressionTemplate) {
        self.templates.insert(template.name.clone(), Arc::new(template));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExpressionTemplate>> {
        self.templates.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn builtin() -> Self {
        let templates = [
            ExpressionTemplate::new(
                "happy",
                2_000.0,
                vec![
                    keyframe(0.0, &[("mouthSmile", 0.0), ("cheekSquint", 0.0), ("eyeSquint", 0.0)]),
                    keyframe(0.2, &[("mouthSmile", 0.8), ("cheekSquint", 0.4), ("eyeSquint", 0.2)]),
                    keyframe(0.8, &[("mouthSmile", 0.8), ("cheekSquint", 0.4), ("eyeSquint", 0.2)]),
                    keyframe(1.0, &[("mouthSmile", 0.5), ("cheekSquint", 0.2), ("eyeSquint", 0.1)]),
                ],
            ),
            ExpressionTemplate::new(
                "sad",
                2_500.0,
                vec![
                    keyframe(0.0, &[("mouthFrown", 0.0), ("browInnerUp", 0.0), ("mouthPucker", 0.0)]),
                    keyframe(0.3, &[("mouthFrown", 0.7), ("browInnerUp", 0.6), ("mouthPucker", 0.2)]),
                    keyframe(0.8, &[("mouthFrown", 0.6), ("browInnerUp", 0.5), ("mouthPucker", 0.2)]),
                    keyframe(1.0, &[("mouthFrown", 0.3), ("browInnerUp", 0.2), ("mouthPucker", 0.0)]),
                ],
            ),
            ExpressionTemplate::new(
                "surprised",
                1_500.0,
                vec![
                    keyframe(0.0, &[("browOuterUp", 0.0), ("eyeWide", 0.0), ("jawOpen", 0.0)]),
                    keyframe(0.15, &[("browOuterUp", 0.9), ("eyeWide", 0.8), ("jawOpen", 0.5)]),
                    keyframe(0.7, &[("browOuterUp", 0.7), ("eyeWide", 0.6), ("jawOpen", 0.3)]),
                    keyframe(1.0, &[("browOuterUp", 0.2), ("eyeWide", 0.1), ("jawOpen", 0.0)]),
                ],
            ),
            ExpressionTemplate::new(
                "angry",
                2_000.0,
                vec![
                    keyframe(0.0, &[("browDown", 0.0), ("noseSneer", 0.0), ("mouthPress", 0.0)]),
                    keyframe(0.25, &[("browDown", 0.8), ("noseSneer", 0.5), ("mouthPress", 0.6)]),
                    keyframe(0.8, &[("browDown", 0.7), ("noseSneer", 0.4), ("mouthPress", 0.5)]),
                    keyframe(1.0, &[("browDown", 0.3), ("noseSneer", 0.1), ("mouthPress", 0.2)]),
                ],
            ),
            ExpressionTemplate::new(
                "thinking",
                3_000.0,
                vec![
                    keyframe(0.0, &[("browInnerUp", 0.0), ("mouthRollLower", 0.0), ("mouthLeft", 0.0)]),
                    keyframe(0.3, &[("browInnerUp", 0.4), ("mouthRollLower", 0.3), ("mouthLeft", 0.3)]),
                    keyframe(0.9, &[("browInnerUp", 0.4), ("mouthRollLower", 0.3), ("mouthLeft", 0.3)]),
                    keyframe(1.0, &[("browInnerUp", 0.2), ("mouthRollLower", 0.1), ("mouthLeft", 0.1)]),
                ],
            ),
            ExpressionTemplate::new(
                "wink",
                800.0,
                vec![
                    keyframe(0.0, &[("eyeBlinkLeft", 0.0), ("mouthSmileLeft", 0.0)]),
                    keyframe(0.4, &[("eyeBlinkLeft", 1.0), ("mouthSmileLeft", 0.5)]),
                    keyframe(1.0, &[("eyeBlinkLeft", 0.0), ("mouthSmileLeft", 0.2)]),
                ],
            ),
        ];
        let mut library = Self::new();
        for template in templates.into_iter().flatten() {
            library.insert(template);
        }
        library
    }
}

/// Channel names `name` writes to on this model: both sides of a symmetric pair when present,
/// otherwise whichever side exists, otherwise the bare name.
pub fn resolve_channel_targets(name: &str, channels: &ChannelStore) -> SmallVec<[String; 2]> {
    let mut targets = SmallVec::new();
    let sided = name.ends_with("Left") || name.ends_with("Right");
    if !sided {
        for side in ["Left", "Right"] {
            let candidate = format!("{name}{side}");
            if channels.contains(&candidate) {
                targets.push(candidate);
            }
        }
    }
    if targets.is_empty() && channels.contains(name) {
        targets.push(name.to_string());
    }
    targets
}

/// Weights captured on the first expression for a model; the state every session returns to.
#[derive(Debug, Clone)]
pub struct BaselineSnapshot {
    pub model: Option<ModelKey>,
    weights: HashMap<Arc<str>, f32>,
}

impl BaselineSnapshot {
    fn capture(model: Option<ModelKey>, channels: &ChannelStore) -> Self {
        let weights = channels
            .iter()
            .filter(|(name, _)| !channels.is_gaze(name) && !channels.is_viseme(name))
            .filter(|(name, _)| !BLINK_CHANNELS.contains(name))
            .map(|(name, weight)| (Arc::<str>::from(name), weight))
            .collect();
        Self { model, weights }
    }

    pub fn weight(&self, name: &str) -> Option<f32> {
        self.weights.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionPhase {
    Playing,
    Holding,
    Restoring,
}

struct Session {
    template: Arc<ExpressionTemplate>,
    phase: ExpressionPhase,
    elapsed: f32,
    touched: Vec<Arc<str>>,
    restore_from: Vec<(Arc<str>, f32)>,
    released: bool,
}

impl Session {
    fn touch(&mut self, name: &str) {
        if !self.touched.iter().any(|touched| touched.as_ref() == name) {
            self.touched.push(Arc::from(name));
        }
    }
}

pub struct ExpressionPlayer {
    library: ExpressionLibrary,
    restore_delay: f32,
    restore: f32,
    session: Option<Session>,
    baseline: Option<BaselineSnapshot>,
    target: Option<ModelKey>,
}

impl ExpressionPlayer {
    pub fn new(config: &ExpressionConfig, library: ExpressionLibrary) -> Self {
        Self {
            library,
            restore_delay: (config.restore_delay_ms / 1000.0).max(0.0),
            restore: (config.restore_ms / 1000.0).max(0.0),
            session: None,
            baseline: None,
            target: None,
        }
    }

    pub fn library(&self) -> &ExpressionLibrary {
        &self.library
    }

    pub fn target(&self) -> Option<&ModelKey> {
        self.target.as_ref()
    }

    pub fn baseline(&self) -> Option<&BaselineSnapshot> {
        self.baseline.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    pub fn current(&self) -> Option<(&str, ExpressionPhase)> {
        self.session.as_ref().map(|session| (session.template.name.as_str(), session.phase))
    }

    /// Start `name`, cancelling any running session. Returns the name of the cancelled session.
    pub fn play(&mut self, name: &str, channels: &ChannelStore) -> Result<Option<String>> {
        let template = self.library.get(name).ok_or_else(|| anyhow!("unknown expression '{name}'"))?;
        let cancelled = self.cancel();
        if self.baseline.is_none() {
            self.baseline = Some(BaselineSnapshot::capture(self.target.clone(), channels));
        }
        self.session = Some(Session {
            template,
            phase: ExpressionPhase::Playing,
            elapsed: 0.0,
            touched: Vec::new(),
            restore_from: Vec::new(),
            released: false,
        });
        Ok(cancelled)
    }

    /// Drop the running session without touching any channel. A session already released is not
    /// reported again.
    pub fn cancel(&mut self) -> Option<String> {
        self.session.take().filter(|session| !session.released).map(|session| session.template.name.clone())
    }

    /// Stop the running session and ease what it wrote back to the baseline over the restore time.
    /// The restore ends without reporting the session as finished.
    pub fn release(&mut self, channels: &ChannelStore) -> Option<String> {
        let session = self.session.as_mut().filter(|session| !session.released)?;
        if session.phase != ExpressionPhase::Restoring {
            session.restore_from = restore_set(self.baseline.as_ref(), &session.touched, channels);
            session.phase = ExpressionPhase::Restoring;
            session.elapsed = 0.0;
        }
        session.released = true;
        Some(session.template.name.clone())
    }

    /// Point at a new model: the running session is cancelled and the baseline discarded.
    pub fn retarget(&mut self, key: ModelKey) -> Option<String> {
        let cancelled = self.cancel();
        self.baseline = None;
        self.target = Some(key);
        cancelled
    }

    /// Advance by `dt` seconds. Returns the template name when the session completes this tick.
    pub fn tick(&mut self, dt: f32, channels: &mut ChannelStore) -> Option<String> {
        let session = self.session.as_mut()?;
        session.elapsed += dt.max(0.0);

        if session.phase == ExpressionPhase::Playing {
            let duration = session.template.duration();
            let progress = (session.elapsed / duration).min(1.0);
            let template = Arc::clone(&session.template);
            for (name, value) in template.sample(progress) {
                if channels.is_gaze(name) {
                    continue;
                }
                for target in resolve_channel_targets(name, channels) {
                    if channels.is_gaze(&target) {
                        continue;
                    }
                    channels.set(&target, value);
                    session.touch(&target);
                }
            }
            if session.elapsed < duration {
                return None;
            }
            session.elapsed -= duration;
            session.phase = ExpressionPhase::Holding;
        }

        if session.phase == ExpressionPhase::Holding {
            if session.elapsed < self.restore_delay {
                return None;
            }
            session.elapsed -= self.restore_delay;
            session.restore_from = restore_set(self.baseline.as_ref(), &session.touched, channels);
            session.phase = ExpressionPhase::Restoring;
        }

        let t = if self.restore > 0.0 { (session.elapsed / self.restore).min(1.0) } else { 1.0 };
        let eased = ease_out_cubic(t);
        for (name, from) in &session.restore_from {
            let goal = self.baseline.as_ref().and_then(|baseline| baseline.weight(name)).unwrap_or(0.0);
            let value = if t >= 1.0 { goal } else { from + (goal - from) * eased };
            channels.set(name, value);
        }
        if t < 1.0 {
            return None;
        }
        self.session.take().filter(|session| !session.released).map(|session| session.template.name.clone())
    }
}

/// Baseline channels plus anything the session wrote that the baseline does not cover,
/// paired with their current weights. Gaze channels never appear here.
fn restore_set(
    baseline: Option<&BaselineSnapshot>,
    touched: &[Arc<str>],
    channels: &ChannelStore,
) -> Vec<(Arc<str>, f32)> {
    let mut out: Vec<(Arc<str>, f32)> = Vec::new();
    if let Some(baseline) = baseline {
        let mut names: Vec<&Arc<str>> = baseline.weights.keys().collect();
        names.sort_unstable();
        for name in names {
            if !channels.is_gaze(name) {
                out.push((Arc::clone(name), channels.weight(name)));
            }
        }
    }
    for name in touched {
        let covered = baseline.map_or(false, |baseline| baseline.weights.contains_key(name));
        if !covered && !channels.is_gaze(name) {
            out.push((Arc::clone(name), channels.weight(name)));
        }
    }
    out
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}
