pub mod blink;
pub mod bone_map;
pub mod channels;
pub mod compositor;
pub mod config;
pub mod events;
pub mod expression;
pub mod eye_tracking;
pub mod lip_sync;
pub mod model;
pub mod model_switch;
pub mod pose_correction;
pub mod producers;
pub mod profiler;
pub mod rig;
pub mod scene;
pub mod skeletal_player;
pub mod skeleton;
pub mod timer;

pub use config::{RigConfig, RigConfigOverrides};
pub use events::{EventBus, RigEvent};
pub use model::{CharacterInstance, LoadedModel, ModelKey, ModelPreset};
pub use model_switch::{ModelSource, PendingLoad, SwitchError, SwitchPhase};
pub use rig::{AvatarRig, RigStatus};
