use crate::channels::ChannelStore;
use std::sync::Arc;

/// One sub-mesh's morph-target influence array.
#[derive(Debug, Clone)]
pub struct MorphMesh {
    pub name: Arc<str>,
    pub influences: Vec<f32>,
}

impl MorphMesh {
    pub fn new(name: impl Into<Arc<str>>, targets: usize) -> Self {
        Self { name: name.into(), influences: vec![0.0; targets] }
    }

    pub fn influence(&self, index: u32) -> Option<f32> {
        self.influences.get(index as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub channels: u32,
    pub writes: u32,
}

/// The only place morph influences are mutated. Every channel written since the previous flush
/// is copied to its slot in every sub-mesh; slots a sub-mesh does not have are skipped.
pub fn flush(channels: &mut ChannelStore, meshes: &mut [MorphMesh]) -> FlushStats {
    let mut stats = FlushStats::default();
    for (index, weight) in channels.drain_dirty() {
        stats.channels += 1;
        for mesh in meshes.iter_mut() {
            if let Some(slot) = mesh.influences.get_mut(index as usize) {
                *slot = weight;
                stats.writes += 1;
            }
        }
    }
    stats
}
