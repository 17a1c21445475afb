//! Publish/subscribe registry for ad events.
//!
//! Observers are keyed by surface type. [`ObserverRegistry::subscribe`] hands
//! back a [`Subscription`] which removes the observer when released or
//! dropped, so an observer can be unregistered at most once. Each delivery is
//! isolated: a panicking observer is logged and the remaining observers still
//! receive the event.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::MediationError;

use super::types::{AdEvent, AdSurfaceType};

/// Callback invoked for every event on a surface.
pub type Observer = Arc<dyn Fn(&AdEvent) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    closed: bool,
    observers: HashMap<AdSurfaceType, Vec<(u64, Observer)>>,
}

#[derive(Default)]
struct RegistryInner {
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, surface: AdSurfaceType, id: u64) -> bool {
        let mut state = self.lock();
        let Some(list) = state.observers.get_mut(&surface) else {
            return false;
        };
        let before = list.len();
        list.retain(|(observer_id, _)| *observer_id != id);
        before != list.len()
    }
}

/// Shared observer registry. Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<RegistryInner>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for `surface`.
    ///
    /// On a closed registry the returned subscription is inert.
    pub fn subscribe(&self, surface: AdSurfaceType, observer: Observer) -> Subscription {
        let mut state = self.inner.lock();
        if state.closed {
            log::debug!("Registry closed, ignoring subscription for {}", surface);
            return Subscription::inert(surface);
        }

        state.next_id += 1;
        let id = state.next_id;
        state
            .observers
            .entry(surface)
            .or_default()
            .push((id, observer));

        Subscription {
            id,
            surface,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Deliver `event` to every observer of its surface. Returns how many
    /// observers handled it without panicking.
    pub fn emit(&self, event: &AdEvent) -> usize {
        // Snapshot so observers may subscribe or release while being called.
        let observers: Vec<Observer> = {
            let state = self.inner.lock();
            if state.closed {
                return 0;
            }
            state
                .observers
                .get(&event.surface)
                .map(|list| list.iter().map(|(_, o)| Arc::clone(o)).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for observer in observers {
            match catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let error = MediationError::ObserverError {
                        message: panic_message(payload.as_ref()),
                    };
                    log::error!(
                        "Observer for {} failed on {}: {}",
                        event.surface,
                        event.outcome,
                        error
                    );
                }
            }
        }
        delivered
    }

    #[must_use]
    pub fn observer_count(&self, surface: AdSurfaceType) -> usize {
        self.inner
            .lock()
            .observers
            .get(&surface)
            .map_or(0, Vec::len)
    }

    /// Drop every observer and refuse further deliveries.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.observers.clear();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "observer panicked".to_string()
    }
}

/// Handle to one registered observer.
#[must_use = "dropping a Subscription unregisters its observer"]
pub struct Subscription {
    id: u64,
    surface: AdSurfaceType,
    registry: Weak<RegistryInner>,
    active: bool,
}

impl Subscription {
    fn inert(surface: AdSurfaceType) -> Self {
        Self {
            id: 0,
            surface,
            registry: Weak::new(),
            active: false,
        }
    }

    #[must_use]
    pub fn surface(&self) -> AdSurfaceType {
        self.surface
    }

    /// Unregister the observer. Returns whether it was still registered.
    pub fn release(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.remove(self.surface, self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("surface", &self.surface)
            .field("active", &self.active)
            .finish()
    }
}
