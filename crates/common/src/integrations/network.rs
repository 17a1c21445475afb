//! Generic provider adapter over an ad network SDK.
//!
//! Each network is described by a static [`NetworkProfile`] (placeholder ad
//! units, fill lifetime, reward defaults) and reached through an
//! [`AdNetworkBackend`], the seam where a host binds the vendor SDK. The
//! bundled [`SimulatedBackend`] stands in for the SDK in tests and in the CLI.

use async_trait::async_trait;
use error_stack::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::{sleep, Instant};

use crate::error::MediationError;
use crate::mediation::observer::{Observer, ObserverRegistry, Subscription};
use crate::mediation::provider::{AdProvider, ProviderConfig};
use crate::mediation::types::{AdEvent, AdOutcome, AdSurfaceType, Reward, ShowOptions};
use crate::settings::Settings;

/// A fill handed out by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFill {
    pub ad_unit_id: String,
    /// Reward attached by the network, if it reports one.
    pub reward: Option<Reward>,
}

/// How a presented fill ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Completed { reward_earned: bool },
    Skipped,
}

/// Vendor SDK operations used by [`NetworkAdapter`].
#[async_trait]
pub trait AdNetworkBackend: Send + Sync {
    /// Start the SDK.
    async fn start(&self, app_id: Option<&str>) -> Result<(), Report<MediationError>>;

    /// Ask for a fill. `Ok(None)` is a no-fill.
    async fn request_fill(
        &self,
        surface: AdSurfaceType,
        ad_unit_id: &str,
    ) -> Result<Option<BackendFill>, Report<MediationError>>;

    /// Present a fill and wait for the user to leave it.
    async fn present(
        &self,
        surface: AdSurfaceType,
        fill: &BackendFill,
        options: &ShowOptions,
    ) -> Result<Presentation, Report<MediationError>>;
}

/// Static description of one network.
#[derive(Debug)]
pub struct NetworkProfile {
    pub network: &'static str,
    pub placeholder_app_id: Option<&'static str>,
    pub placeholder_units: &'static [(AdSurfaceType, &'static str)],
    /// Age after which a loaded fill is no longer shown.
    pub fill_ttl: Duration,
    pub reward_kind: &'static str,
    pub default_reward_amount: u64,
}

struct LoadedFill {
    fill: BackendFill,
    loaded_at: Instant,
}

/// [`AdProvider`] implementation shared by the reference networks.
pub struct NetworkAdapter {
    id: String,
    profile: &'static NetworkProfile,
    backend: Arc<dyn AdNetworkBackend>,
    init: OnceCell<bool>,
    ad_units: RwLock<HashMap<AdSurfaceType, String>>,
    fills: Mutex<HashMap<AdSurfaceType, LoadedFill>>,
    observers: ObserverRegistry,
}

impl NetworkAdapter {
    pub fn new(
        id: impl Into<String>,
        profile: &'static NetworkProfile,
        backend: Arc<dyn AdNetworkBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            profile,
            backend,
            init: OnceCell::new(),
            ad_units: RwLock::new(HashMap::new()),
            fills: Mutex::new(HashMap::new()),
            observers: ObserverRegistry::new(),
        }
    }

    #[must_use]
    pub fn network(&self) -> &'static str {
        self.profile.network
    }

    /// Ad unit used for `surface` after initialize.
    #[must_use]
    pub fn ad_unit(&self, surface: AdSurfaceType) -> Option<String> {
        self.ad_units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&surface)
            .cloned()
    }

    fn is_initialized(&self) -> bool {
        self.init.get().copied().unwrap_or(false)
    }

    /// Placeholder units, overridden per surface by configured ones.
    fn resolve_units(&self, config: &ProviderConfig) -> HashMap<AdSurfaceType, String> {
        let mut units: HashMap<AdSurfaceType, String> = self
            .profile
            .placeholder_units
            .iter()
            .map(|(surface, unit)| (*surface, (*unit).to_string()))
            .collect();

        if config.ad_units.is_empty() {
            log::info!("Provider '{}' using placeholder ad units", self.id);
        }
        for (key, unit) in &config.ad_units {
            match key.parse::<AdSurfaceType>() {
                Ok(surface) => {
                    units.insert(surface, unit.clone());
                }
                Err(e) => log::warn!("Provider '{}' ignoring ad unit: {}", self.id, e),
            }
        }
        units
    }

    fn emit(&self, event: AdEvent) {
        self.observers.emit(&event);
    }

    fn emit_failed(&self, surface: AdSurfaceType, message: impl Into<String>) {
        self.emit(AdEvent::failed(surface, message));
    }

    /// Remove and return the fill for `surface` if it has not expired.
    fn take_fill(&self, surface: AdSurfaceType) -> Option<BackendFill> {
        let loaded = self
            .fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&surface)?;
        if loaded.loaded_at.elapsed() >= self.profile.fill_ttl {
            log::info!("Provider '{}' dropping expired {} fill", self.id, surface);
            return None;
        }
        Some(loaded.fill)
    }
}

#[async_trait]
impl AdProvider for NetworkAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, config: ProviderConfig) -> bool {
        *self
            .init
            .get_or_init(|| async {
                let units = self.resolve_units(&config);
                *self.ad_units.write().unwrap_or_else(PoisonError::into_inner) = units;

                let app_id = config.app_id.as_deref().or(self.profile.placeholder_app_id);
                match self.backend.start(app_id).await {
                    Ok(()) => {
                        log::info!(
                            "Provider '{}' ({}) initialized",
                            self.id,
                            self.profile.network
                        );
                        true
                    }
                    Err(e) => {
                        log::error!("Provider '{}' failed to start: {:?}", self.id, e);
                        let message = format!("{}", e.current_context());
                        for surface in AdSurfaceType::ALL {
                            self.emit_failed(surface, message.clone());
                        }
                        false
                    }
                }
            })
            .await
    }

    async fn load_ad(&self, surface: AdSurfaceType) -> bool {
        if !self.is_initialized() {
            self.emit_failed(
                surface,
                MediationError::NotInitialized {
                    component: "NetworkAdapter",
                }
                .to_string(),
            );
            return false;
        }

        self.emit(AdEvent::new(surface, AdOutcome::Loading));

        let Some(unit) = self.ad_unit(surface) else {
            self.emit_failed(surface, format!("No ad unit configured for {surface}"));
            return false;
        };

        match self.backend.request_fill(surface, &unit).await {
            Ok(Some(fill)) => {
                self.fills
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        surface,
                        LoadedFill {
                            fill,
                            loaded_at: Instant::now(),
                        },
                    );
                log::debug!("Provider '{}' loaded {} ({})", self.id, surface, unit);
                self.emit(AdEvent::new(surface, AdOutcome::Ready));
                true
            }
            Ok(None) => {
                let error = MediationError::NoFill {
                    provider: self.id.clone(),
                    surface,
                };
                log::debug!("{}", error);
                self.emit_failed(surface, error.to_string());
                false
            }
            Err(e) => {
                log::warn!("Provider '{}' load of {} failed: {:?}", self.id, surface, e);
                self.emit_failed(surface, format!("{}", e.current_context()));
                false
            }
        }
    }

    async fn show_ad(&self, surface: AdSurfaceType, options: &ShowOptions) -> bool {
        let Some(fill) = self.take_fill(surface) else {
            self.emit_failed(surface, format!("No loaded {surface} fill"));
            return false;
        };

        self.emit(AdEvent::new(surface, AdOutcome::Showing));

        match self.backend.present(surface, &fill, options).await {
            Ok(Presentation::Completed { reward_earned }) => {
                let reward = (surface == AdSurfaceType::Rewarded && reward_earned).then(|| {
                    fill.reward.clone().unwrap_or_else(|| {
                        Reward::new(self.profile.default_reward_amount, self.profile.reward_kind)
                    })
                });
                self.emit(AdEvent::completed(surface, reward));
                true
            }
            Ok(Presentation::Skipped) => {
                self.emit(AdEvent::new(surface, AdOutcome::Skipped));
                true
            }
            Err(e) => {
                log::warn!("Provider '{}' show of {} failed: {:?}", self.id, surface, e);
                self.emit_failed(surface, format!("{}", e.current_context()));
                false
            }
        }
    }

    fn is_ad_ready(&self, surface: AdSurfaceType) -> bool {
        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&surface)
            .is_some_and(|loaded| loaded.loaded_at.elapsed() < self.profile.fill_ttl)
    }

    fn add_callback(&self, surface: AdSurfaceType, observer: Observer) -> Subscription {
        self.observers.subscribe(surface, observer)
    }

    fn shutdown(&self) {
        self.observers.close();
    }
}

/// Scripted end of a simulated presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedOutcome {
    #[default]
    Completed,
    Skipped,
    Failed,
}

/// Behavior of a [`SimulatedBackend`], read from `[providers.<id>.simulation]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_true")]
    pub fill: bool,
    #[serde(default = "default_true")]
    pub start_ok: bool,
    #[serde(default)]
    pub outcome: SimulatedOutcome,
    #[serde(default = "default_true")]
    pub reward_earned: bool,
    #[serde(default)]
    pub show_latency_ms: u64,
}

fn default_latency_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            fill: true,
            start_ok: true,
            outcome: SimulatedOutcome::default(),
            reward_earned: true,
            show_latency_ms: 0,
        }
    }
}

/// Provider table fields read by the network adapters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Deterministic stand-in for a vendor SDK.
pub struct SimulatedBackend {
    network: &'static str,
    config: SimulationConfig,
    fill_requests: AtomicUsize,
}

impl SimulatedBackend {
    #[must_use]
    pub fn new(network: &'static str, config: SimulationConfig) -> Self {
        Self {
            network,
            config,
            fill_requests: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn fill_requests(&self) -> usize {
        self.fill_requests.load(Ordering::SeqCst)
    }

    fn error(&self, message: &str) -> Report<MediationError> {
        Report::new(MediationError::Provider {
            provider: self.network.to_string(),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl AdNetworkBackend for SimulatedBackend {
    async fn start(&self, app_id: Option<&str>) -> Result<(), Report<MediationError>> {
        if !self.config.start_ok {
            return Err(self.error("SDK start rejected"));
        }
        log::debug!(
            "Simulated {} SDK started (app id: {})",
            self.network,
            app_id.unwrap_or("none")
        );
        Ok(())
    }

    async fn request_fill(
        &self,
        _surface: AdSurfaceType,
        ad_unit_id: &str,
    ) -> Result<Option<BackendFill>, Report<MediationError>> {
        self.fill_requests.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(self.config.latency_ms)).await;
        Ok(self.config.fill.then(|| BackendFill {
            ad_unit_id: ad_unit_id.to_string(),
            reward: None,
        }))
    }

    async fn present(
        &self,
        _surface: AdSurfaceType,
        _fill: &BackendFill,
        _options: &ShowOptions,
    ) -> Result<Presentation, Report<MediationError>> {
        sleep(Duration::from_millis(self.config.show_latency_ms)).await;
        match self.config.outcome {
            SimulatedOutcome::Completed => Ok(Presentation::Completed {
                reward_earned: self.config.reward_earned,
            }),
            SimulatedOutcome::Skipped => Ok(Presentation::Skipped),
            SimulatedOutcome::Failed => Err(self.error("presentation failed")),
        }
    }
}

/// Build simulated adapters for every configured provider served by `profile`.
pub fn register_network(
    settings: &Settings,
    profile: &'static NetworkProfile,
) -> Vec<Arc<dyn AdProvider>> {
    let mut providers: Vec<Arc<dyn AdProvider>> = Vec::new();

    for id in settings.provider_ids_for_network(profile.network) {
        match settings.provider_config::<NetworkSettings>(&id) {
            Ok(network_settings) => {
                let simulation = network_settings.unwrap_or_default().simulation;
                log::info!(
                    "Registering {} provider '{}' (simulated backend)",
                    profile.network,
                    id
                );
                let backend = Arc::new(SimulatedBackend::new(profile.network, simulation));
                providers.push(Arc::new(NetworkAdapter::new(id, profile, backend)));
            }
            Err(e) => log::error!("Failed to load '{}' provider settings: {:?}", id, e),
        }
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::{outcomes, record};

    static TEST_PROFILE: NetworkProfile = NetworkProfile {
        network: "testnet",
        placeholder_app_id: Some("test-app"),
        placeholder_units: &[
            (AdSurfaceType::Interstitial, "test-interstitial"),
            (AdSurfaceType::Rewarded, "test-rewarded"),
        ],
        fill_ttl: Duration::from_secs(60),
        reward_kind: "coins",
        default_reward_amount: 5,
    };

    fn adapter(config: SimulationConfig) -> NetworkAdapter {
        NetworkAdapter::new(
            "testnet",
            &TEST_PROFILE,
            Arc::new(SimulatedBackend::new("testnet", config)),
        )
    }

    fn instant() -> SimulationConfig {
        SimulationConfig {
            latency_ms: 0,
            ..SimulationConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewarded_flow_emits_lifecycle_and_reward() {
        let adapter = adapter(instant());
        let (log, _subscription) = record(AdSurfaceType::Rewarded, |s, o| adapter.add_callback(s, o));

        assert!(adapter.initialize(ProviderConfig::default()).await);
        assert!(adapter.load_ad(AdSurfaceType::Rewarded).await);
        assert!(adapter.is_ad_ready(AdSurfaceType::Rewarded));
        assert!(
            adapter
                .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
                .await
        );

        assert_eq!(
            outcomes(&log),
            vec![
                AdOutcome::Loading,
                AdOutcome::Ready,
                AdOutcome::Showing,
                AdOutcome::Completed
            ]
        );
        let events = log.lock().expect("log lock");
        assert_eq!(events[3].data.reward, Some(Reward::new(5, "coins")));
        assert!(!adapter.is_ad_ready(AdSurfaceType::Rewarded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_units_fill_gaps_in_config() {
        let adapter = adapter(instant());
        let config = ProviderConfig::default().with_ad_unit(AdSurfaceType::Rewarded, "real-unit");

        assert!(adapter.initialize(config).await);
        assert_eq!(
            adapter.ad_unit(AdSurfaceType::Rewarded).as_deref(),
            Some("real-unit")
        );
        assert_eq!(
            adapter.ad_unit(AdSurfaceType::Interstitial).as_deref(),
            Some("test-interstitial")
        );
        assert_eq!(adapter.ad_unit(AdSurfaceType::Banner), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_reports_every_surface() {
        let adapter = adapter(SimulationConfig {
            start_ok: false,
            ..instant()
        });
        let logs: Vec<_> = AdSurfaceType::ALL
            .iter()
            .map(|surface| record(*surface, |s, o| adapter.add_callback(s, o)))
            .collect();

        assert!(!adapter.initialize(ProviderConfig::default()).await);
        for (log, _subscription) in &logs {
            assert_eq!(outcomes(log), vec![AdOutcome::Failed]);
        }
        assert!(!adapter.load_ad(AdSurfaceType::Rewarded).await);
        assert!(
            !adapter.initialize(ProviderConfig::default()).await,
            "second initialize returns the first result"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fill_emits_failed() {
        let adapter = adapter(SimulationConfig {
            fill: false,
            ..instant()
        });
        let (log, _subscription) =
            record(AdSurfaceType::Interstitial, |s, o| adapter.add_callback(s, o));

        assert!(adapter.initialize(ProviderConfig::default()).await);
        assert!(!adapter.load_ad(AdSurfaceType::Interstitial).await);
        assert_eq!(outcomes(&log), vec![AdOutcome::Loading, AdOutcome::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_without_unit_fails_load() {
        let adapter = adapter(instant());
        assert!(adapter.initialize(ProviderConfig::default()).await);
        assert!(!adapter.load_ad(AdSurfaceType::Banner).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_fill_is_not_ready() {
        let adapter = adapter(instant());
        assert!(adapter.initialize(ProviderConfig::default()).await);
        assert!(adapter.load_ad(AdSurfaceType::Interstitial).await);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!adapter.is_ad_ready(AdSurfaceType::Interstitial));
        assert!(
            !adapter
                .show_ad(AdSurfaceType::Interstitial, &ShowOptions::default())
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_and_failed_presentations() {
        let skipping = adapter(SimulationConfig {
            outcome: SimulatedOutcome::Skipped,
            ..instant()
        });
        assert!(skipping.initialize(ProviderConfig::default()).await);
        assert!(skipping.load_ad(AdSurfaceType::Rewarded).await);
        let (log, _subscription) =
            record(AdSurfaceType::Rewarded, |s, o| skipping.add_callback(s, o));
        assert!(
            skipping
                .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
                .await
        );
        assert_eq!(outcomes(&log), vec![AdOutcome::Showing, AdOutcome::Skipped]);

        let failing = adapter(SimulationConfig {
            outcome: SimulatedOutcome::Failed,
            ..instant()
        });
        assert!(failing.initialize(ProviderConfig::default()).await);
        assert!(failing.load_ad(AdSurfaceType::Rewarded).await);
        assert!(
            !failing
                .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unearned_reward_is_withheld() {
        let adapter = adapter(SimulationConfig {
            reward_earned: false,
            ..instant()
        });
        assert!(adapter.initialize(ProviderConfig::default()).await);
        assert!(adapter.load_ad(AdSurfaceType::Rewarded).await);
        let (log, _subscription) = record(AdSurfaceType::Rewarded, |s, o| adapter.add_callback(s, o));

        assert!(
            adapter
                .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
                .await
        );
        let events = log.lock().expect("log lock");
        assert_eq!(events.last().map(|e| e.outcome), Some(AdOutcome::Completed));
        assert_eq!(events.last().and_then(|e| e.data.reward.clone()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_event_delivery() {
        let adapter = adapter(instant());
        let (log, _subscription) = record(AdSurfaceType::Rewarded, |s, o| adapter.add_callback(s, o));
        assert!(adapter.initialize(ProviderConfig::default()).await);

        adapter.shutdown();
        assert!(adapter.load_ad(AdSurfaceType::Rewarded).await);
        assert!(outcomes(&log).is_empty());
    }
}
