use crate::blink::BlinkUnit;
use crate::config::RigConfig;
use crate::events::RigEvent;
use crate::expression::{ExpressionLibrary, ExpressionPlayer};
use crate::eye_tracking::EyeTrackingUnit;
use crate::lip_sync::LipSyncUnit;
use crate::model::{CharacterInstance, ModelKey};
use crate::skeletal_player::SkeletalAnimationPlayer;

/// What the scheduler needs from every unit that writes into a character: a label for profiling and
/// logs, the model it currently drives, and a way to point it at a new one.
pub trait Producer {
    fn label(&self) -> &'static str;

    fn target(&self) -> Option<&ModelKey>;

    /// Re-point the unit at `instance`. Anything the old session can no longer finish is reported back.
    fn attach(&mut self, instance: &mut CharacterInstance) -> Option<RigEvent>;
}

impl Producer for SkeletalAnimationPlayer {
    fn label(&self) -> &'static str {
        "skeletal"
    }

    fn target(&self) -> Option<&ModelKey> {
        SkeletalAnimationPlayer::target(self)
    }

    fn attach(&mut self, instance: &mut CharacterInstance) -> Option<RigEvent> {
        self.retarget(
            instance.key.clone(),
            &instance.preset.pose_corrections,
            &instance.bone_map,
            &mut instance.skeleton,
        );
        None
    }
}

impl Producer for ExpressionPlayer {
    fn label(&self) -> &'static str {
        "expression"
    }

    fn target(&self) -> Option<&ModelKey> {
        ExpressionPlayer::target(self)
    }

    fn attach(&mut self, instance: &mut CharacterInstance) -> Option<RigEvent> {
        self.retarget(instance.key.clone()).map(|name| RigEvent::ExpressionCancelled { name })
    }
}

impl Producer for LipSyncUnit {
    fn label(&self) -> &'static str {
        "lip_sync"
    }

    fn target(&self) -> Option<&ModelKey> {
        LipSyncUnit::target(self)
    }

    fn attach(&mut self, instance: &mut CharacterInstance) -> Option<RigEvent> {
        self.retarget(instance.key.clone());
        None
    }
}

impl Producer for EyeTrackingUnit {
    fn label(&self) -> &'static str {
        "eye_tracking"
    }

    fn target(&self) -> Option<&ModelKey> {
        EyeTrackingUnit::target(self)
    }

    fn attach(&mut self, instance: &mut CharacterInstance) -> Option<RigEvent> {
        self.retarget(instance.key.clone(), &instance.preset.eye_tracking);
        None
    }
}

impl Producer for BlinkUnit {
    fn label(&self) -> &'static str {
        "blink"
    }

    fn target(&self) -> Option<&ModelKey> {
        BlinkUnit::target(self)
    }

    fn attach(&mut self, instance: &mut CharacterInstance) -> Option<RigEvent> {
        self.retarget(instance.key.clone(), &instance.preset.blink);
        None
    }
}

/// Every producer unit the rig drives, owned in one place so a model switch can re-point all of
/// them in a single pass.
pub struct Producers {
    pub skeletal: SkeletalAnimationPlayer,
    pub expression: ExpressionPlayer,
    pub lip_sync: LipSyncUnit,
    pub eye_tracking: EyeTrackingUnit,
    pub blink: BlinkUnit,
}

impl Producers {
    pub fn new(config: &RigConfig, library: ExpressionLibrary) -> Self {
        Self {
            skeletal: SkeletalAnimationPlayer::new(),
            expression: ExpressionPlayer::new(&config.expression, library),
            lip_sync: LipSyncUnit::new(&config.lip_sync),
            eye_tracking: EyeTrackingUnit::new(&config.eye_tracking),
            blink: BlinkUnit::new(&config.blink),
        }
    }

    fn each_mut(&mut self) -> [&mut dyn Producer; 5] {
        [&mut self.skeletal, &mut self.expression, &mut self.lip_sync, &mut self.eye_tracking, &mut self.blink]
    }

    /// Point every producer at `instance`, in scheduler order. Returns the events the hand-over produced.
    pub fn attach_all(&mut self, instance: &mut CharacterInstance) -> Vec<RigEvent> {
        let mut events = Vec::new();
        for producer in self.each_mut() {
            log::debug!("[producers] {} -> {}", producer.label(), instance.key);
            events.extend(producer.attach(instance));
        }
        events
    }

    pub fn targets(&self) -> [(&'static str, Option<&ModelKey>); 5] {
        let producers: [&dyn Producer; 5] =
            [&self.skeletal, &self.expression, &self.lip_sync, &self.eye_tracking, &self.blink];
        producers.map(|producer| (producer.label(), producer.target()))
    }

    /// True when every producer drives `key`.
    pub fn all_target(&self, key: &ModelKey) -> bool {
        self.targets().iter().all(|(_, target)| *target == Some(key))
    }
}
