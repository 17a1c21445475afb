//! Trait definition for ad providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::observer::{Observer, Subscription};
use super::types::{AdSurfaceType, ShowOptions};

/// Per-provider settings handed to [`AdProvider::initialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Network application identifier, if the backend needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Surface type to ad-unit identifier. Keys are surface names
    /// (`banner`, `interstitial`, `rewarded`, `native`).
    #[serde(default)]
    pub ad_units: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn with_ad_unit(mut self, surface: AdSurfaceType, unit_id: impl Into<String>) -> Self {
        self.ad_units
            .insert(surface.as_str().to_string(), unit_id.into());
        self
    }
}

/// Capability contract implemented by every ad source (AdMob, AppLovin, mocks).
///
/// Implementations never return errors across this boundary: backend failures
/// become `failed` events on the callback channel plus a `false` return.
#[async_trait]
pub trait AdProvider: Send + Sync {
    /// Unique identifier for this provider (e.g., "admob", "applovin").
    fn provider_id(&self) -> &str;

    /// One-time setup. A second call is a no-op returning the first result.
    ///
    /// When `config` carries no ad units, built-in placeholder units are used.
    /// On failure a `failed` event is emitted for every surface type.
    async fn initialize(&self, config: ProviderConfig) -> bool;

    /// Request a fill. Emits `loading`, then exactly one of `ready` or `failed`.
    ///
    /// The return value mirrors the emitted outcome.
    async fn load_ad(&self, surface: AdSurfaceType) -> bool;

    /// Display a previously loaded fill. Emits `showing`, then exactly one of
    /// `completed`, `failed` or `skipped`. A rewarded `completed` carries a
    /// reward payload when the user earned it.
    ///
    /// Returns whether the fill was presented.
    async fn show_ad(&self, surface: AdSurfaceType, options: &ShowOptions) -> bool;

    /// Whether a fill is loaded and unexpired. Side-effect free.
    fn is_ad_ready(&self, surface: AdSurfaceType) -> bool;

    /// Register an observer of this provider's events for `surface`.
    ///
    /// The observer stays registered until the subscription is released or dropped.
    fn add_callback(&self, surface: AdSurfaceType, observer: Observer) -> Subscription;

    /// Unregister an observer. Equivalent to [`Subscription::release`].
    fn remove_callback(&self, subscription: Subscription) -> bool {
        subscription.release()
    }

    /// Drop every registered observer; no further events are delivered.
    fn shutdown(&self) {}
}
