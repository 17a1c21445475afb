//! Per-surface mutable state: load guard, attempt generation, active binding.
//!
//! Every check-then-set runs under one lock so that two concurrent callers
//! for the same surface cannot both win. Each provider race gets a fresh
//! generation; a settlement carrying an older generation is stale and is
//! dropped without touching the binding.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::AdSurfaceType;

#[derive(Debug, Default)]
struct SurfaceState {
    load_in_progress: bool,
    show_in_progress: bool,
    generation: u64,
    binding: Option<String>,
}

/// Identifies one provider race inside a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTag {
    pub surface: AdSurfaceType,
    pub generation: u64,
}

/// Result of a provider reporting back from a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The provider filled and is now the active binding.
    Bound,
    /// The provider had no fill; the race is lost but still current.
    Declined,
    /// The race was abandoned or superseded; the report was dropped.
    Stale,
}

/// Result of the dispatcher giving up on a race after its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandonment {
    Abandoned,
    /// The provider settled successfully just before the deadline was observed.
    AlreadyBound,
}

#[derive(Debug, Default)]
pub struct SurfaceStates {
    inner: Mutex<HashMap<AdSurfaceType, SurfaceState>>,
}

impl SurfaceStates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AdSurfaceType, SurfaceState>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the load guard. Returns false when a load is already in flight.
    pub fn begin_load(&self, surface: AdSurfaceType) -> bool {
        let mut states = self.lock();
        let state = states.entry(surface).or_default();
        if state.load_in_progress {
            return false;
        }
        state.load_in_progress = true;
        true
    }

    #[must_use]
    pub fn is_loading(&self, surface: AdSurfaceType) -> bool {
        self.lock()
            .get(&surface)
            .is_some_and(|state| state.load_in_progress)
    }

    /// Open a new race for the current load.
    pub fn next_attempt(&self, surface: AdSurfaceType) -> AttemptTag {
        let mut states = self.lock();
        let state = states.entry(surface).or_default();
        state.generation += 1;
        AttemptTag {
            surface,
            generation: state.generation,
        }
    }

    /// Record a provider's load result for the race identified by `tag`.
    pub fn settle(&self, tag: AttemptTag, provider_id: &str, ready: bool) -> Settlement {
        let mut states = self.lock();
        let state = states.entry(tag.surface).or_default();

        if !state.load_in_progress || state.generation != tag.generation {
            return Settlement::Stale;
        }
        if !ready {
            return Settlement::Declined;
        }

        state.binding = Some(provider_id.to_string());
        state.load_in_progress = false;
        Settlement::Bound
    }

    /// Give up on the race identified by `tag`.
    pub fn abandon(&self, tag: AttemptTag) -> Abandonment {
        let mut states = self.lock();
        let state = states.entry(tag.surface).or_default();

        if state.generation == tag.generation && !state.load_in_progress && state.binding.is_some()
        {
            return Abandonment::AlreadyBound;
        }
        if state.generation == tag.generation {
            state.generation += 1;
        }
        Abandonment::Abandoned
    }

    /// Close a load in which no provider filled. The binding is left unset.
    pub fn fail_load(&self, surface: AdSurfaceType) {
        let mut states = self.lock();
        let state = states.entry(surface).or_default();
        state.load_in_progress = false;
        state.binding = None;
        state.generation += 1;
    }

    #[must_use]
    pub fn binding(&self, surface: AdSurfaceType) -> Option<String> {
        self.lock()
            .get(&surface)
            .and_then(|state| state.binding.clone())
    }

    /// Bind `provider_id` unless some provider is bound already. Returns the
    /// binding in effect afterwards.
    pub fn bind_if_unset(&self, surface: AdSurfaceType, provider_id: &str) -> String {
        let mut states = self.lock();
        let state = states.entry(surface).or_default();
        state
            .binding
            .get_or_insert_with(|| provider_id.to_string())
            .clone()
    }

    /// Clear the binding if it still names `provider_id`.
    pub fn clear_binding(&self, surface: AdSurfaceType, provider_id: &str) -> bool {
        let mut states = self.lock();
        let Some(state) = states.get_mut(&surface) else {
            return false;
        };
        if state.binding.as_deref() == Some(provider_id) {
            state.binding = None;
            true
        } else {
            false
        }
    }

    /// Claim the show guard. Returns false when a show is already running.
    pub fn begin_show(&self, surface: AdSurfaceType) -> bool {
        let mut states = self.lock();
        let state = states.entry(surface).or_default();
        if state.show_in_progress {
            return false;
        }
        state.show_in_progress = true;
        true
    }

    #[must_use]
    pub fn is_showing(&self, surface: AdSurfaceType) -> bool {
        self.lock()
            .get(&surface)
            .is_some_and(|state| state.show_in_progress)
    }

    pub fn end_show(&self, surface: AdSurfaceType) {
        if let Some(state) = self.lock().get_mut(&surface) {
            state.show_in_progress = false;
        }
    }
}
