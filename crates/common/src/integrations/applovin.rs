//! AppLovin MAX adapter.

use std::sync::Arc;
use std::time::Duration;

use crate::mediation::provider::AdProvider;
use crate::mediation::types::AdSurfaceType;
use crate::settings::Settings;

use super::network::{register_network, AdNetworkBackend, NetworkAdapter, NetworkProfile};

pub const PROVIDER_ID: &str = "applovin";

pub static PROFILE: NetworkProfile = NetworkProfile {
    network: PROVIDER_ID,
    // MAX needs an SDK key; there is no public test key.
    placeholder_app_id: None,
    placeholder_units: &[
        (AdSurfaceType::Banner, "applovin-test-banner"),
        (AdSurfaceType::Interstitial, "applovin-test-interstitial"),
        (AdSurfaceType::Rewarded, "applovin-test-rewarded"),
        (AdSurfaceType::Native, "applovin-test-native"),
    ],
    fill_ttl: Duration::from_secs(4 * 3600),
    reward_kind: "coins",
    default_reward_amount: 10,
};

pub fn build(provider_id: impl Into<String>, backend: Arc<dyn AdNetworkBackend>) -> NetworkAdapter {
    NetworkAdapter::new(provider_id, &PROFILE, backend)
}

/// Register every configured provider served by AppLovin.
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn AdProvider>> {
    register_network(settings, &PROFILE)
}
