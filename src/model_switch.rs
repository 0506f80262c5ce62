use crate::config::SwitchConfig;
use crate::events::{EventBus, RigEvent};
use crate::model::{CharacterInstance, LoadedModel, ModelPreset};
use crate::producers::Producers;
use crate::scene::Scene;
use anyhow::Result;
use std::sync::Arc;
use std::task::Poll;
use thiserror::Error;

/// An asset or preset load in flight. The coordinator polls it once per tick; nothing blocks.
pub trait PendingLoad<T> {
    fn poll(&mut self) -> Poll<Result<T>>;
}

/// A load that completed before it was handed over.
pub struct Ready<T>(Option<Result<T>>);

impl<T> Ready<T> {
    pub fn new(result: Result<T>) -> Self {
        Self(Some(result))
    }
}

impl<T> PendingLoad<T> for Ready<T> {
    fn poll(&mut self) -> Poll<Result<T>> {
        match self.0.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Ready(Err(anyhow::anyhow!("load result already taken"))),
        }
    }
}

/// Where switch targets come from. Implemented by the host's asset pipeline.
pub trait ModelSource {
    /// Everything configuration-shaped for `name`: channel map, pose corrections, tuning, materials.
    fn load_preset(&mut self, name: &str) -> Box<dyn PendingLoad<ModelPreset>>;

    /// The mesh and skeleton, fetched only after the preset has resolved.
    fn load_model(&mut self, preset: &ModelPreset) -> Box<dyn PendingLoad<LoadedModel>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("switch to '{target}' is already in progress")]
    InProgress { target: String },
    #[error("model '{model}' is already active")]
    AlreadyActive { model: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchPhase {
    Idle,
    Debouncing,
    Preparing,
    Swapping,
}

enum SwitchState {
    Idle,
    Debouncing { target: String, remaining: f32 },
    Preparing { target: String, preset: Box<dyn PendingLoad<ModelPreset>> },
    Swapping { target: String, preset: Arc<ModelPreset>, model: Box<dyn PendingLoad<LoadedModel>> },
}

/// Outcome of one coordinator tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchProgress {
    Unchanged,
    Advanced(SwitchPhase),
    Completed,
    Failed,
}

/// Replaces the active character without ever showing an unconfigured or unposed model.
///
/// `Idle -> Debouncing -> Preparing -> Swapping -> Idle`. All loads finish before the scene is
/// touched; a failed load drops back to `Idle` with the previous model still active.
pub struct ModelSwitchCoordinator {
    debounce: f32,
    retire_delay: f32,
    state: SwitchState,
}

impl ModelSwitchCoordinator {
    pub fn new(config: &SwitchConfig) -> Self {
        Self {
            debounce: (config.debounce_ms / 1000.0).max(0.0),
            retire_delay: (config.retire_delay_ms / 1000.0).max(0.0),
            state: SwitchState::Idle,
        }
    }

    pub fn phase(&self) -> SwitchPhase {
        match self.state {
            SwitchState::Idle => SwitchPhase::Idle,
            SwitchState::Debouncing { .. } => SwitchPhase::Debouncing,
            SwitchState::Preparing { .. } => SwitchPhase::Preparing,
            SwitchState::Swapping { .. } => SwitchPhase::Swapping,
        }
    }

    pub fn is_switching(&self) -> bool {
        !matches!(self.state, SwitchState::Idle)
    }

    /// The model being loaded, or the pending one while debouncing.
    pub fn in_flight_target(&self) -> Option<&str> {
        match &self.state {
            SwitchState::Idle => None,
            SwitchState::Debouncing { target, .. }
            | SwitchState::Preparing { target, .. }
            | SwitchState::Swapping { target, .. } => Some(target),
        }
    }

    pub fn retire_delay(&self) -> f32 {
        self.retire_delay
    }

    /// Queue a switch to `target`. Requests inside the debounce window replace each other (the
    /// window restarts); requests while loading are rejected and leave the in-flight switch alone.
    pub fn request(&mut self, target: &str, current: Option<&str>) -> Result<(), SwitchError> {
        match &self.state {
            SwitchState::Preparing { target: in_flight, .. } | SwitchState::Swapping { target: in_flight, .. } => {
                return Err(SwitchError::InProgress { target: in_flight.clone() });
            }
            SwitchState::Debouncing { .. } if current == Some(target) => {
                log::debug!("[switch] request back to '{target}' drops the pending switch");
                self.state = SwitchState::Idle;
                return Err(SwitchError::AlreadyActive { model: target.to_string() });
            }
            SwitchState::Idle if current == Some(target) => {
                return Err(SwitchError::AlreadyActive { model: target.to_string() });
            }
            SwitchState::Debouncing { .. } | SwitchState::Idle => {}
        }
        self.state = SwitchState::Debouncing { target: target.to_string(), remaining: self.debounce };
        Ok(())
    }

    /// Drive the state machine. Stages whose loads are already complete run back to back, so a
    /// source that answers synchronously finishes the whole switch in one tick once debounced.
    pub fn tick(
        &mut self,
        dt: f32,
        source: &mut dyn ModelSource,
        scene: &mut Scene,
        producers: &mut Producers,
        events: &mut EventBus,
    ) -> SwitchProgress {
        let mut progress = SwitchProgress::Unchanged;
        let mut dt = dt.max(0.0);
        loop {
            let state = std::mem::replace(&mut self.state, SwitchState::Idle);
            let (next, outcome) = self.step(state, dt, source, scene, producers, events);
            self.state = next;
            dt = 0.0;
            match outcome {
                Some(SwitchProgress::Advanced(phase)) => progress = SwitchProgress::Advanced(phase),
                Some(done) => return done,
                None => return progress,
            }
        }
    }

    fn step(
        &self,
        state: SwitchState,
        dt: f32,
        source: &mut dyn ModelSource,
        scene: &mut Scene,
        producers: &mut Producers,
        events: &mut EventBus,
    ) -> (SwitchState, Option<SwitchProgress>) {
        match state {
            SwitchState::Idle => (SwitchState::Idle, None),
            SwitchState::Debouncing { target, remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    return (SwitchState::Debouncing { target, remaining }, None);
                }
                log::info!("[switch] preparing '{target}'");
                events.push(RigEvent::SwitchRequested { target: target.clone() });
                let preset = source.load_preset(&target);
                (SwitchState::Preparing { target, preset }, Some(SwitchProgress::Advanced(SwitchPhase::Preparing)))
            }
            SwitchState::Preparing { target, mut preset } => match preset.poll() {
                Poll::Pending => (SwitchState::Preparing { target, preset }, None),
                Poll::Ready(Err(error)) => {
                    log::warn!("[switch] preset for '{target}' failed: {error:#}");
                    events.push(RigEvent::switch_failed(&target, &error));
                    (SwitchState::Idle, Some(SwitchProgress::Failed))
                }
                Poll::Ready(Ok(preset)) => {
                    let preset = Arc::new(preset);
                    let model = source.load_model(&preset);
                    let advanced = SwitchProgress::Advanced(SwitchPhase::Swapping);
                    (SwitchState::Swapping { target, preset, model }, Some(advanced))
                }
            },
            SwitchState::Swapping { target, preset, mut model } => match model.poll() {
                Poll::Pending => (SwitchState::Swapping { target, preset, model }, None),
                Poll::Ready(Err(error)) => {
                    log::warn!("[switch] model '{target}' failed to load: {error:#}");
                    events.push(RigEvent::switch_failed(&target, &error));
                    (SwitchState::Idle, Some(SwitchProgress::Failed))
                }
                Poll::Ready(Ok(loaded)) => {
                    self.swap(preset, loaded, scene, producers, events);
                    (SwitchState::Idle, Some(SwitchProgress::Completed))
                }
            },
        }
    }

    fn swap(
        &self,
        preset: Arc<ModelPreset>,
        loaded: LoadedModel,
        scene: &mut Scene,
        producers: &mut Producers,
        events: &mut EventBus,
    ) {
        // Bone map, channel map and the posed skeleton are all ready before the scene sees the model.
        let mut instance = CharacterInstance::assemble(preset, loaded);
        for event in producers.attach_all(&mut instance) {
            events.push(event);
        }
        let to = instance.key.clone();
        let from = scene.install(instance, self.retire_delay);
        log::info!("[switch] {} is now active", to);
        events.push(RigEvent::SwitchCompleted { from, to });
    }
}
