use crate::compositor::{self, FlushStats};
use crate::config::RigConfig;
use crate::events::{EventBus, RigEvent};
use crate::expression::{ExpressionLibrary, ExpressionPhase};
use crate::eye_tracking::GazeInputs;
use crate::lip_sync::Viseme;
use crate::model::{CharacterInstance, LoadedModel, ModelKey, ModelPreset};
use crate::model_switch::{ModelSource, ModelSwitchCoordinator, SwitchError, SwitchProgress};
use crate::producers::Producers;
use crate::profiler::UnitProfiler;
use crate::scene::Scene;
use crate::skeletal_player::{ClipProgress, FrameSample, MotionClip};
use crate::timer::FixedTimer;
use anyhow::{anyhow, Result};
use glam::Vec3;
use std::sync::Arc;

/// Coarse, display-only status for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigStatus {
    pub switching: bool,
    pub expression_playing: bool,
    pub blinking: bool,
    pub eye_tracking: bool,
    pub active_model: Option<String>,
}

/// Owns the scene, every producer and the switch coordinator, and runs them in a fixed order once
/// per frame: switch, retirement, skeleton, expression, lip sync, eye tracking, blink, flush.
pub struct AvatarRig {
    scene: Scene,
    producers: Producers,
    coordinator: ModelSwitchCoordinator,
    source: Box<dyn ModelSource>,
    events: EventBus,
    profiler: UnitProfiler,
    gaze_timer: FixedTimer,
    blink_timer: FixedTimer,
    camera: Vec3,
    blinking: bool,
}

impl AvatarRig {
    pub fn new(config: &RigConfig, library: ExpressionLibrary, source: Box<dyn ModelSource>) -> Self {
        let mut producers = Producers::new(config, library);
        if config.blink.enabled {
            producers.blink.start(None);
        }
        Self {
            scene: Scene::new(),
            producers,
            coordinator: ModelSwitchCoordinator::new(&config.switch),
            source,
            events: EventBus::default(),
            profiler: UnitProfiler::new(),
            gaze_timer: FixedTimer::from_millis(config.eye_tracking.tick_ms),
            blink_timer: FixedTimer::from_millis(config.blink.tick_ms),
            camera: Vec3::new(0.0, 1.6, 2.0),
            blinking: config.blink.enabled,
        }
    }

    /// Put a model on stage directly, bypassing the debounce and load phases. Meant for the first
    /// model at startup; refused while a switch is running.
    pub fn attach_model(&mut self, preset: ModelPreset, loaded: LoadedModel) -> Result<ModelKey, SwitchError> {
        if let Some(target) = self.coordinator.in_flight_target() {
            return Err(SwitchError::InProgress { target: target.to_string() });
        }
        let mut instance = CharacterInstance::assemble(Arc::new(preset), loaded);
        for event in self.producers.attach_all(&mut instance) {
            self.events.push(event);
        }
        let to = instance.key.clone();
        let from = self.scene.install(instance, self.coordinator.retire_delay());
        self.events.push(RigEvent::SwitchCompleted { from, to: to.clone() });
        Ok(to)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn active(&self) -> Option<&CharacterInstance> {
        self.scene.active()
    }

    pub fn producers(&self) -> &Producers {
        &self.producers
    }

    pub fn coordinator(&self) -> &ModelSwitchCoordinator {
        &self.coordinator
    }

    pub fn profiler(&self) -> &UnitProfiler {
        &self.profiler
    }

    pub fn drain_events(&mut self) -> Vec<RigEvent> {
        self.events.drain()
    }

    pub fn status(&self) -> RigStatus {
        RigStatus {
            switching: self.coordinator.is_switching(),
            expression_playing: self.producers.expression.is_playing(),
            blinking: self.producers.blink.is_running(),
            eye_tracking: self.producers.eye_tracking.is_enabled(),
            active_model: self.scene.active_name().map(str::to_string),
        }
    }

    pub fn play_expression(&mut self, name: &str) -> Result<()> {
        let instance = self.scene.active().ok_or_else(|| anyhow!("no active model to play '{name}' on"))?;
        if let Some(cancelled) = self.producers.expression.play(name, &instance.channels)? {
            self.events.push(RigEvent::ExpressionCancelled { name: cancelled });
        }
        self.events.push(RigEvent::ExpressionStarted { name: name.to_string() });
        Ok(())
    }

    /// Stop the running expression; the face eases back to its baseline.
    pub fn cancel_expression(&mut self) -> Option<String> {
        let cancelled = match self.scene.active() {
            Some(instance) => self.producers.expression.release(&instance.channels),
            None => self.producers.expression.cancel(),
        }?;
        self.events.push(RigEvent::ExpressionCancelled { name: cancelled.clone() });
        Some(cancelled)
    }

    pub fn expression_phase(&self) -> Option<ExpressionPhase> {
        self.producers.expression.current().map(|(_, phase)| phase)
    }

    pub fn request_switch(&mut self, target: &str) -> Result<(), SwitchError> {
        let result = self.coordinator.request(target, self.scene.active_name());
        if let Err(error) = &result {
            log::info!("[switch] rejected '{target}': {error}");
            self.events.push(RigEvent::SwitchRejected { target: target.to_string(), reason: error.to_string() });
        }
        result
    }

    /// Turning gaze off releases the eyes immediately.
    pub fn set_eye_tracking(&mut self, enabled: bool) {
        let channels = self.scene.active_mut().map(|instance| &mut instance.channels);
        self.producers.eye_tracking.set_enabled(enabled, channels);
        if enabled {
            self.gaze_timer.reset();
        }
    }

    pub fn set_blinking(&mut self, enabled: bool) {
        self.blinking = enabled;
        let channels = self.scene.active_mut().map(|instance| &mut instance.channels);
        if !enabled {
            self.producers.blink.stop(channels);
        } else if !self.producers.blink.is_running() && !self.producers.skeletal.is_playing_clip() {
            self.producers.blink.start(channels);
            self.blink_timer.reset();
        }
    }

    pub fn push_frame(&mut self, sample: FrameSample) {
        self.producers.skeletal.push_frame(sample);
    }

    /// Scripted motion owns the face while it plays, so blinking pauses until the clip ends. An empty
    /// clip ends at once, including any clip it replaced.
    pub fn play_motion_clip(&mut self, clip: MotionClip) {
        let duration = clip.last_timestamp().unwrap_or(0.0);
        let channels = self.scene.active_mut().map(|instance| &mut instance.channels);
        match self.producers.skeletal.play_clip(clip) {
            ClipProgress::Playing => {
                self.producers.blink.stop(channels);
                self.events.push(RigEvent::MotionClipStarted { duration });
            }
            ClipProgress::Finished => {
                if self.blinking && !self.producers.blink.is_running() {
                    log::debug!("[blink] resuming after scripted motion");
                    self.producers.blink.start(channels);
                    self.blink_timer.reset();
                }
                self.events.push(RigEvent::MotionClipFinished);
            }
        }
    }

    pub fn play_motion_json(&mut self, bytes: &[u8]) -> Result<()> {
        let clip = MotionClip::from_json_slice(bytes)?;
        self.play_motion_clip(clip);
        Ok(())
    }

    pub fn set_voice(&mut self, amplitude: f32) {
        self.producers.lip_sync.set_amplitude(amplitude);
    }

    pub fn set_voice_with_viseme(&mut self, amplitude: f32, viseme: Viseme) {
        self.producers.lip_sync.set_input(amplitude, viseme);
    }

    pub fn set_camera_position(&mut self, camera: Vec3) {
        self.camera = camera;
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera
    }

    /// Advance everything by `dt` seconds and flush the channel store into the active meshes.
    pub fn tick(&mut self, dt: f32) -> FlushStats {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let progress = {
            let _scope = self.profiler.scope("switch");
            self.coordinator.tick(
                dt,
                self.source.as_mut(),
                &mut self.scene,
                &mut self.producers,
                &mut self.events,
            )
        };
        if progress == SwitchProgress::Completed && self.blinking && !self.producers.skeletal.is_playing_clip() {
            if let Some(instance) = self.scene.active_mut() {
                if !self.producers.blink.is_running() {
                    self.producers.blink.start(Some(&mut instance.channels));
                }
            }
        }

        for model in self.scene.tick(dt) {
            log::debug!("[scene] detached {model}");
            self.events.push(RigEvent::ModelRetired { model });
        }

        let Some(instance) = self.scene.active_mut() else {
            return FlushStats::default();
        };
        let mut restart_blink = false;

        {
            let _scope = self.profiler.scope("skeletal");
            if self.producers.skeletal.tick(dt, &instance.bone_map, &mut instance.skeleton)
                == Some(ClipProgress::Finished)
            {
                self.events.push(RigEvent::MotionClipFinished);
                restart_blink = true;
            }
        }

        {
            let _scope = self.profiler.scope("expression");
            if let Some(name) = self.producers.expression.tick(dt, &mut instance.channels) {
                self.events.push(RigEvent::ExpressionFinished { name });
                restart_blink = true;
            }
        }

        {
            let _scope = self.profiler.scope("lip_sync");
            self.producers.lip_sync.tick(&mut instance.channels);
        }

        if self.gaze_timer.advance(dt) > 0 {
            let _scope = self.profiler.scope("eye_tracking");
            let inputs =
                GazeInputs { camera: self.camera, head: instance.head_position(), forward: instance.forward() };
            self.producers.eye_tracking.tick(&inputs, &mut instance.channels);
        }

        let blink_idle = !self.producers.blink.is_running() && !self.producers.skeletal.is_playing_clip();
        if restart_blink && self.blinking && blink_idle {
            log::debug!("[blink] resuming after scripted motion");
            self.producers.blink.start(Some(&mut instance.channels));
        }

        {
            let _scope = self.profiler.scope("blink");
            let step = self.blink_timer.interval();
            for _ in 0..self.blink_timer.advance(dt) {
                self.producers.blink.tick(step, &mut instance.channels);
            }
        }

        let _scope = self.profiler.scope("compositor");
        compositor::flush(&mut instance.channels, &mut instance.meshes)
    }
}
