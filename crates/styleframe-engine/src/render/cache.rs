use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::device::{SurfaceId, SurfaceKey};

/// Per-surface cache of objects built for one [`SurfaceKey`].
///
/// A lookup with the same key returns the cached object. A changed key (new
/// size, format or context) replaces it. Surfaces never share entries.
pub struct PipelineRegistry<P> {
    entries: HashMap<SurfaceId, (SurfaceKey, P)>,
    constructions: u64,
}

impl<P> Default for PipelineRegistry<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            constructions: 0,
        }
    }
}

impl<P> PipelineRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key.surface`, building it when absent or stale.
    ///
    /// A stale entry is dropped before the rebuild, so a failed build leaves
    /// the surface with no entry.
    pub fn get_or_build<E>(
        &mut self,
        key: SurfaceKey,
        build: impl FnOnce(&SurfaceKey) -> Result<P, E>,
    ) -> Result<&mut P, E> {
        let stale = matches!(self.entries.get(&key.surface), Some((cached, _)) if *cached != key);
        if stale {
            log::debug!("surface key changed for {}; rebuilding", key.surface);
            self.entries.remove(&key.surface);
        }
        match self.entries.entry(key.surface) {
            Entry::Occupied(slot) => Ok(&mut slot.into_mut().1),
            Entry::Vacant(slot) => {
                let built = build(&key)?;
                self.constructions += 1;
                Ok(&mut slot.insert((key, built)).1)
            }
        }
    }

    pub fn get(&self, surface: SurfaceId) -> Option<&P> {
        self.entries.get(&surface).map(|(_, p)| p)
    }

    pub fn release(&mut self, surface: SurfaceId) -> Option<P> {
        self.entries.remove(&surface).map(|(_, p)| p)
    }

    /// Total number of builds since creation.
    pub fn constructions(&self) -> u64 {
        self.constructions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
