//! Minimum-interval gate applied before a show reaches the dispatcher.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::MediationError;
use crate::mediation::types::AdSurfaceType;

/// Last accepted show time per surface.
#[derive(Debug, Default)]
pub struct ShowGate {
    last_shown: Mutex<HashMap<AdSurfaceType, Instant>>,
}

impl ShowGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a show for `surface` unless the previous accepted show is
    /// younger than `min_interval`. Acceptance records the current time.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::RateLimited`] with the remaining wait; the
    /// recorded time is left unchanged.
    pub fn try_pass(
        &self,
        surface: AdSurfaceType,
        min_interval: Duration,
    ) -> Result<(), MediationError> {
        let mut last_shown = self
            .last_shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if let Some(previous) = last_shown.get(&surface) {
            let elapsed = now.duration_since(*previous);
            if elapsed < min_interval {
                return Err(MediationError::RateLimited {
                    surface,
                    retry_in_ms: (min_interval - elapsed).as_millis() as u64,
                });
            }
        }

        last_shown.insert(surface, now);
        Ok(())
    }
}
