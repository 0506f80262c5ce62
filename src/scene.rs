use crate::model::{CharacterInstance, ModelKey};

struct Retiring {
    instance: CharacterInstance,
    remaining: f32,
}

/// The models currently attached to the scene graph: at most one active character plus any
/// swapped-out characters still fading out.
#[derive(Default)]
pub struct Scene {
    active: Option<CharacterInstance>,
    retiring: Vec<Retiring>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(instance: CharacterInstance) -> Self {
        Self { active: Some(instance), retiring: Vec::new() }
    }

    pub fn active(&self) -> Option<&CharacterInstance> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut CharacterInstance> {
        self.active.as_mut()
    }

    pub fn active_key(&self) -> Option<&ModelKey> {
        self.active.as_ref().map(|instance| &instance.key)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(CharacterInstance::name)
    }

    /// Make `instance` the active model. The previous one stays in the scene for `retire_delay`
    /// seconds and its key is returned.
    pub fn install(&mut self, instance: CharacterInstance, retire_delay: f32) -> Option<ModelKey> {
        let previous = self.active.replace(instance)?;
        let key = previous.key.clone();
        log::debug!("[scene] retiring {key} in {retire_delay:.3}s");
        self.retiring.push(Retiring { instance: previous, remaining: retire_delay.max(0.0) });
        Some(key)
    }

    /// Count down retiring models and detach the ones whose delay has elapsed.
    pub fn tick(&mut self, dt: f32) -> Vec<ModelKey> {
        let mut removed = Vec::new();
        self.retiring.retain_mut(|retiring| {
            retiring.remaining -= dt.max(0.0);
            if retiring.remaining <= 0.0 {
                removed.push(retiring.instance.key.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn retiring_len(&self) -> usize {
        self.retiring.len()
    }

    /// Keys of every model attached to the scene, active first.
    pub fn present(&self) -> Vec<&ModelKey> {
        self.active
            .iter()
            .map(|instance| &instance.key)
            .chain(self.retiring.iter().map(|retiring| &retiring.instance.key))
            .collect()
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.present().into_iter().any(|present| present == key)
    }
}
