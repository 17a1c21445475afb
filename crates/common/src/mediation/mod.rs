//! Mediation across multiple ad providers.
//!
//! The [`MediationDispatcher`] orders the registered providers with the
//! configured strategy, races each one against a deadline, binds the first
//! fill to its surface and routes shows to the bound provider.
//!
//! Note: individual providers live in the `integrations` module
//! (e.g., `crate::integrations::admob`, `crate::integrations::applovin`).

use std::sync::Arc;

use crate::config_store::ConfigStore;
use crate::settings::Settings;

pub mod attempt;
pub mod config;
pub mod dispatcher;
pub mod observer;
pub mod ordering;
pub mod provider;
pub mod types;

pub use config::{MediationPolicy, MediationStrategy, ProviderDescriptor};
pub use dispatcher::{
    AttemptDiagnostic, AttemptResult, DispatcherOptions, LoadReport, LoadStatus,
    MediationDispatcher,
};
pub use observer::{Observer, ObserverRegistry, Subscription};
pub use ordering::ProviderOrdering;
pub use provider::{AdProvider, ProviderConfig};
pub use types::{AdEvent, AdOutcome, AdSurfaceType, EventData, Reward, ShowOptions, ShowResult};

/// Type alias for provider builder functions.
type ProviderBuilder = fn(&Settings) -> Vec<Arc<dyn AdProvider>>;

/// Every provider builder. Each inspects the settings for the providers it serves.
fn provider_builders() -> &'static [ProviderBuilder] {
    &[
        crate::integrations::admob::register_providers,
        crate::integrations::applovin::register_providers,
        crate::integrations::mock::register_providers,
    ]
}

/// Build a dispatcher with every provider discovered from `settings`.
///
/// The dispatcher still needs [`MediationDispatcher::initialize`].
#[must_use]
pub fn build_dispatcher(settings: &Settings) -> MediationDispatcher {
    build_dispatcher_with_store(settings, None)
}

/// Like [`build_dispatcher`], persisting ordering state in `store`.
#[must_use]
pub fn build_dispatcher_with_store(
    settings: &Settings,
    store: Option<Arc<dyn ConfigStore>>,
) -> MediationDispatcher {
    log::info!("Building mediation dispatcher");

    let dispatcher = MediationDispatcher::with_options(
        settings.policy(),
        DispatcherOptions {
            ordering: ProviderOrdering::new(),
            store,
        },
    );

    for builder in provider_builders() {
        for provider in builder(settings) {
            dispatcher.register_provider(provider);
        }
    }

    log::info!(
        "Mediation dispatcher built with {} providers",
        dispatcher.provider_count()
    );

    dispatcher
}
