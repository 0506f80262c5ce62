use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct BlinkConfig {
    #[serde(default = "BlinkConfig::default_interval_ms")]
    pub interval_ms: f32,
    #[serde(default = "BlinkConfig::default_jitter_ms")]
    pub jitter_ms: f32,
    #[serde(default = "BlinkConfig::default_pulse_ms")]
    pub pulse_ms: f32,
    #[serde(default = "BlinkConfig::default_tick_ms")]
    pub tick_ms: f32,
    #[serde(default = "BlinkConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EyeTrackingConfig {
    #[serde(default = "EyeTrackingConfig::default_tick_ms")]
    pub tick_ms: f32,
    #[serde(default = "EyeTrackingConfig::default_dead_zone_degrees")]
    pub dead_zone_degrees: f32,
    #[serde(default = "EyeTrackingConfig::default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default = "ExpressionConfig::default_restore_delay_ms")]
    pub restore_delay_ms: f32,
    #[serde(default = "ExpressionConfig::default_restore_ms")]
    pub restore_ms: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LipSyncConfig {
    #[serde(default = "LipSyncConfig::default_gain")]
    pub gain: f32,
    #[serde(default = "LipSyncConfig::default_smoothing")]
    pub smoothing: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    #[serde(default = "SwitchConfig::default_debounce_ms")]
    pub debounce_ms: f32,
    #[serde(default = "SwitchConfig::default_retire_delay_ms")]
    pub retire_delay_ms: f32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RigConfig {
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub eye_tracking: EyeTrackingConfig,
    #[serde(default)]
    pub expression: ExpressionConfig,
    #[serde(default)]
    pub lip_sync: LipSyncConfig,
    #[serde(default)]
    pub switch: SwitchConfig,
}

#[derive(Debug, Clone, Default)]
pub struct RigConfigOverrides {
    pub blink_enabled: Option<bool>,
    pub blink_seed: Option<u64>,
    pub eye_tracking_enabled: Option<bool>,
}

impl BlinkConfig {
    const fn default_interval_ms() -> f32 {
        2_000.0
    }

    const fn default_jitter_ms() -> f32 {
        800.0
    }

    const fn default_pulse_ms() -> f32 {
        150.0
    }

    const fn default_tick_ms() -> f32 {
        16.0
    }

    const fn default_enabled() -> bool {
        true
    }
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
            jitter_ms: Self::default_jitter_ms(),
            pulse_ms: Self::default_pulse_ms(),
            tick_ms: Self::default_tick_ms(),
            enabled: Self::default_enabled(),
            seed: None,
        }
    }
}

impl EyeTrackingConfig {
    const fn default_tick_ms() -> f32 {
        50.0
    }

    const fn default_dead_zone_degrees() -> f32 {
        3.0
    }

    const fn default_enabled() -> bool {
        true
    }
}

impl Default for EyeTrackingConfig {
    fn default() -> Self {
        Self {
            tick_ms: Self::default_tick_ms(),
            dead_zone_degrees: Self::default_dead_zone_degrees(),
            enabled: Self::default_enabled(),
        }
    }
}

impl ExpressionConfig {
    const fn default_restore_delay_ms() -> f32 {
        300.0
    }

    const fn default_restore_ms() -> f32 {
        500.0
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self { restore_delay_ms: Self::default_restore_delay_ms(), restore_ms: Self::default_restore_ms() }
    }
}

impl LipSyncConfig {
    const fn default_gain() -> f32 {
        0.8
    }

    const fn default_smoothing() -> f32 {
        0.3
    }
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self { gain: Self::default_gain(), smoothing: Self::default_smoothing() }
    }
}

impl SwitchConfig {
    const fn default_debounce_ms() -> f32 {
        150.0
    }

    const fn default_retire_delay_ms() -> f32 {
        300.0
    }
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self { debounce_ms: Self::default_debounce_ms(), retire_delay_ms: Self::default_retire_delay_ms() }
    }
}

impl RigConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read rig config {}", path.display()))?;
        Self::from_json_slice(&bytes).with_context(|| format!("Failed to parse rig config {}", path.display()))
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let cfg = serde_json::from_slice(bytes)?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RigConfigOverrides) {
        if let Some(enabled) = overrides.blink_enabled {
            self.blink.enabled = enabled;
        }
        if let Some(seed) = overrides.blink_seed {
            self.blink.seed = Some(seed);
        }
        if let Some(enabled) = overrides.eye_tracking_enabled {
            self.eye_tracking.enabled = enabled;
        }
    }
}

impl RigConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.blink_enabled.is_none() && self.blink_seed.is_none() && self.eye_tracking_enabled.is_none()
    }
}
