//! Scripted provider for tests and dry runs.
//!
//! Selected from settings with `network = "mock"`; every table field of
//! [`MockConfig`] is optional.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::sleep;

use crate::mediation::observer::{Observer, ObserverRegistry, Subscription};
use crate::mediation::provider::{AdProvider, ProviderConfig};
use crate::mediation::types::{AdEvent, AdOutcome, AdSurfaceType, Reward, ShowOptions};
use crate::settings::Settings;

pub const NETWORK: &str = "mock";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedOutcome {
    #[default]
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub load_latency_ms: u64,
    #[serde(default = "default_true")]
    pub fill: bool,
    #[serde(default = "default_true")]
    pub init_succeeds: bool,
    #[serde(default)]
    pub show_latency_ms: u64,
    #[serde(default)]
    pub show_outcome: ScriptedOutcome,
    #[serde(default = "default_reward_amount")]
    pub reward_amount: u64,
    #[serde(default = "default_true")]
    pub reward_earned: bool,
    /// Emit the terminal show event twice.
    #[serde(default)]
    pub duplicate_terminal: bool,
    /// Never emit a terminal show event.
    #[serde(default)]
    pub silent_show: bool,
}

fn default_true() -> bool {
    true
}

fn default_reward_amount() -> u64 {
    10
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            load_latency_ms: 0,
            fill: true,
            init_succeeds: true,
            show_latency_ms: 0,
            show_outcome: ScriptedOutcome::Completed,
            reward_amount: default_reward_amount(),
            reward_earned: true,
            duplicate_terminal: false,
            silent_show: false,
        }
    }
}

pub struct MockProvider {
    id: String,
    script: Mutex<MockConfig>,
    init: OnceCell<bool>,
    ready: Mutex<HashSet<AdSurfaceType>>,
    observers: ObserverRegistry,
    init_calls: AtomicUsize,
    load_calls: AtomicUsize,
    show_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, MockConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: MockConfig) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(config),
            init: OnceCell::new(),
            ready: Mutex::new(HashSet::new()),
            observers: ObserverRegistry::new(),
            init_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            show_calls: AtomicUsize::new(0),
        }
    }

    fn script(&self) -> MutexGuard<'_, MockConfig> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ready(&self) -> MutexGuard<'_, HashSet<AdSurfaceType>> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_load_latency_ms(self, latency_ms: u64) -> Self {
        self.script().load_latency_ms = latency_ms;
        self
    }

    #[must_use]
    pub fn with_fill(self, fill: bool) -> Self {
        self.set_fill(fill);
        self
    }

    #[must_use]
    pub fn with_show_outcome(self, outcome: ScriptedOutcome) -> Self {
        self.script().show_outcome = outcome;
        self
    }

    #[must_use]
    pub fn with_duplicate_terminal(self) -> Self {
        self.script().duplicate_terminal = true;
        self
    }

    #[must_use]
    pub fn with_silent_show(self) -> Self {
        self.script().silent_show = true;
        self
    }

    #[must_use]
    pub fn with_failing_init(self) -> Self {
        self.script().init_succeeds = false;
        self
    }

    #[must_use]
    pub fn without_reward(self) -> Self {
        self.script().reward_earned = false;
        self
    }

    /// Change whether later loads fill.
    pub fn set_fill(&self, fill: bool) {
        self.script().fill = fill;
    }

    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn show_calls(&self) -> usize {
        self.show_calls.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &AdEvent) {
        self.observers.emit(event);
    }
}

#[async_trait]
impl AdProvider for MockProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, _config: ProviderConfig) -> bool {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .init
            .get_or_init(|| async {
                let ok = self.script().init_succeeds;
                if !ok {
                    for surface in AdSurfaceType::ALL {
                        self.emit(&AdEvent::failed(surface, "scripted init failure"));
                    }
                }
                ok
            })
            .await
    }

    async fn load_ad(&self, surface: AdSurfaceType) -> bool {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init.get().copied().unwrap_or(false) {
            self.emit(&AdEvent::failed(surface, "mock not initialized"));
            return false;
        }

        self.emit(&AdEvent::new(surface, AdOutcome::Loading));
        let latency = self.script().load_latency_ms;
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }

        let fill = self.script().fill;
        if fill {
            self.ready().insert(surface);
            self.emit(&AdEvent::new(surface, AdOutcome::Ready));
        } else {
            self.emit(&AdEvent::failed(surface, "scripted no fill"));
        }
        fill
    }

    async fn show_ad(&self, surface: AdSurfaceType, _options: &ShowOptions) -> bool {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        if !self.ready().remove(&surface) {
            self.emit(&AdEvent::failed(surface, "no loaded fill"));
            return false;
        }

        self.emit(&AdEvent::new(surface, AdOutcome::Showing));
        let script = self.script().clone();
        if script.show_latency_ms > 0 {
            sleep(Duration::from_millis(script.show_latency_ms)).await;
        }
        if script.silent_show {
            return true;
        }

        let event = match script.show_outcome {
            ScriptedOutcome::Completed => {
                let reward = (surface == AdSurfaceType::Rewarded && script.reward_earned)
                    .then(|| Reward::new(script.reward_amount, "coins"));
                AdEvent::completed(surface, reward)
            }
            ScriptedOutcome::Skipped => AdEvent::new(surface, AdOutcome::Skipped),
            ScriptedOutcome::Failed => AdEvent::failed(surface, "scripted show failure"),
        };
        self.emit(&event);
        if script.duplicate_terminal {
            self.emit(&event);
        }
        event.outcome != AdOutcome::Failed
    }

    fn is_ad_ready(&self, surface: AdSurfaceType) -> bool {
        self.ready().contains(&surface)
    }

    fn add_callback(&self, surface: AdSurfaceType, observer: Observer) -> Subscription {
        self.observers.subscribe(surface, observer)
    }

    fn shutdown(&self) {
        self.observers.close();
    }
}

/// Register every configured provider with `network = "mock"`.
pub fn register_providers(settings: &Settings) -> Vec<Arc<dyn AdProvider>> {
    let mut providers: Vec<Arc<dyn AdProvider>> = Vec::new();

    for id in settings.provider_ids_for_network(NETWORK) {
        match settings.provider_config::<MockConfig>(&id) {
            Ok(config) => {
                log::info!("Registering mock provider '{}'", id);
                providers.push(Arc::new(MockProvider::with_config(
                    id,
                    config.unwrap_or_default(),
                )));
            }
            Err(e) => log::error!("Failed to load mock provider '{}': {:?}", id, e),
        }
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::{create_test_settings, outcomes, record};

    #[tokio::test]
    async fn test_scripted_lifecycle() {
        let mock = MockProvider::new("m");
        let (log, _subscription) = record(AdSurfaceType::Rewarded, |s, o| mock.add_callback(s, o));

        assert!(mock.initialize(ProviderConfig::default()).await);
        assert!(mock.load_ad(AdSurfaceType::Rewarded).await);
        assert!(mock.show_ad(AdSurfaceType::Rewarded, &ShowOptions::default()).await);

        assert_eq!(
            outcomes(&log),
            vec![
                AdOutcome::Loading,
                AdOutcome::Ready,
                AdOutcome::Showing,
                AdOutcome::Completed
            ]
        );
        assert_eq!((mock.load_calls(), mock.show_calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_set_fill_changes_later_loads() {
        let mock = MockProvider::new("m").with_fill(false);
        assert!(mock.initialize(ProviderConfig::default()).await);
        assert!(!mock.load_ad(AdSurfaceType::Banner).await);
        mock.set_fill(true);
        assert!(mock.load_ad(AdSurfaceType::Banner).await);
    }

    #[tokio::test]
    async fn test_load_before_initialize_fails() {
        let mock = MockProvider::new("m");
        assert!(!mock.load_ad(AdSurfaceType::Banner).await);
    }

    #[test]
    fn test_register_from_settings() {
        let settings = create_test_settings();
        let providers = register_providers(&settings);
        let ids: Vec<_> = providers.iter().map(|p| p.provider_id().to_string()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_config_defaults() {
        let config: MockConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(config, MockConfig::default());
    }
}
