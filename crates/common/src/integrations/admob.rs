//! Google AdMob adapter.
//!
//! Without configured ad units the adapter serves Google's public test units,
//! which always fill in development builds.

use std::sync::Arc;
use std::time::Duration;

use crate::mediation::provider::AdProvider;
use crate::mediation::types::AdSurfaceType;
use crate::settings::Settings;

use super::network::{register_network, AdNetworkBackend, NetworkAdapter, NetworkProfile};

pub const PROVIDER_ID: &str = "admob";

/// AdMob's sample application id.
const TEST_APP_ID: &str = "ca-app-pub-3940256099942544~3347511713";

pub static PROFILE: NetworkProfile = NetworkProfile {
    network: PROVIDER_ID,
    placeholder_app_id: Some(TEST_APP_ID),
    placeholder_units: &[
        (AdSurfaceType::Banner, "ca-app-pub-3940256099942544/6300978111"),
        (AdSurfaceType::Interstitial, "ca-app-pub-3940256099942544/1033173712"),
        (AdSurfaceType::Rewarded, "ca-app-pub-3940256099942544/5224354917"),
        (AdSurfaceType::Native, "ca-app-pub-3940256099942544/2247696110"),
    ],
    // Loaded AdMob ads expire after one hour.
    fill_ttl: Duration::from_secs(3600),
    reward_kind: "coins",
    default_reward_amount: 10,
};

/// AdMob adapter over a caller-supplied SDK binding.
pub fn build(provider_id: impl Into<String>, backend: Arc<dyn AdNetworkBackend>) -> NetworkAdapter {
    NetworkAdapter::new(provider_id, &PROFILE, backend)
}

/// Register every configured provider served by AdMob.
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn AdProvider>> {
    register_network(settings, &PROFILE)
}
