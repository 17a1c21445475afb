//! Advertising facade: the entry point application code calls.
//!
//! [`Advertising`] wraps a [`MediationDispatcher`] with a per-surface
//! minimum-interval gate, grants rewards for completed rewarded shows and
//! reports terminal outcomes to analytics.

use error_stack::Report;
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::constants::ANALYTICS_EVENT_AD_OUTCOME;
use crate::error::MediationError;
use crate::mediation::observer::{Observer, Subscription};
use crate::mediation::types::{AdEvent, AdOutcome, AdSurfaceType, Reward, ShowOptions, ShowResult};
use crate::mediation::{build_dispatcher, MediationDispatcher};
use crate::settings::{RewardSettings, Settings};

mod gate;
mod services;

pub use gate::ShowGate;
pub use services::{
    AdServices, AnalyticsSink, CoinLedger, ContentUnlocker, MemoryAnalytics, MemoryCoinLedger,
    MemoryContentUnlocker, MemoryServices,
};

/// Surfaces warmed right after initialize and by the refresher.
const PRELOAD_SURFACES: [AdSurfaceType; 2] = [AdSurfaceType::Interstitial, AdSurfaceType::Rewarded];

/// Caller context of the show currently running on a surface.
#[derive(Debug, Clone)]
struct PendingShow {
    attempt_id: Uuid,
    content_id: Option<String>,
    content_type: Option<String>,
}

#[derive(Default)]
struct PendingShows {
    shows: Mutex<HashMap<AdSurfaceType, PendingShow>>,
}

impl PendingShows {
    fn lock(&self) -> MutexGuard<'_, HashMap<AdSurfaceType, PendingShow>> {
        self.shows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `show` unless another show already owns the surface.
    fn claim(&self, surface: AdSurfaceType, show: PendingShow) -> bool {
        let mut shows = self.lock();
        if shows.contains_key(&surface) {
            return false;
        }
        shows.insert(surface, show);
        true
    }

    fn peek(&self, surface: AdSurfaceType) -> Option<PendingShow> {
        self.lock().get(&surface).cloned()
    }

    fn take(&self, surface: AdSurfaceType) -> Option<PendingShow> {
        self.lock().remove(&surface)
    }

    /// Drop the context of `attempt_id` if no outcome consumed it.
    fn clear(&self, surface: AdSurfaceType, attempt_id: Uuid) {
        let mut shows = self.lock();
        if shows.get(&surface).is_some_and(|s| s.attempt_id == attempt_id) {
            shows.remove(&surface);
        }
    }
}

/// Reacts to the dispatcher's terminal outcomes.
struct OutcomeHandler {
    services: AdServices,
    rewards: RewardSettings,
    pending: Arc<PendingShows>,
}

impl OutcomeHandler {
    fn handle(&self, event: &AdEvent) {
        match event.outcome {
            AdOutcome::Completed => {
                let context = self.pending.take(event.surface);
                if event.surface == AdSurfaceType::Rewarded {
                    if let Some(reward) = &event.data.reward {
                        self.grant(reward, context.as_ref());
                    }
                }
                self.record(event, true, context.as_ref());
            }
            AdOutcome::Failed => {
                let context = self.pending.peek(event.surface);
                self.record(event, false, context.as_ref());
            }
            AdOutcome::Skipped => {
                self.pending.take(event.surface);
            }
            _ => {}
        }
    }

    fn grant(&self, reward: &Reward, context: Option<&PendingShow>) {
        if let Some(content_id) = context.and_then(|c| c.content_id.as_deref()) {
            let content_type = context
                .and_then(|c| c.content_type.as_deref())
                .unwrap_or(&self.rewards.content_type);
            match self.services.unlocker.unlock_content(content_id, content_type) {
                Ok(()) => log::info!("Unlocked {} '{}' for rewarded ad", content_type, content_id),
                Err(e) => log::error!("Failed to unlock '{}': {:?}", content_id, e),
            }
            return;
        }

        match self
            .services
            .coins
            .award_coins(self.rewards.coin_amount, &self.rewards.reason)
        {
            Ok(balance) => log::info!(
                "Awarded {} coins for {} {} (balance: {})",
                self.rewards.coin_amount,
                reward.amount,
                reward.kind,
                balance
            ),
            Err(e) => log::error!("Failed to award coins: {:?}", e),
        }
    }

    fn record(&self, event: &AdEvent, success: bool, context: Option<&PendingShow>) {
        let properties = json!({
            "surface": event.surface.as_str(),
            "success": success,
            "content_id": context.and_then(|c| c.content_id.clone()),
            "attempt_id": context.map(|c| c.attempt_id.to_string()),
            "error": event.data.error.clone(),
        });

        let analytics = &self.services.analytics;
        let recorded = catch_unwind(AssertUnwindSafe(|| {
            analytics.record(ANALYTICS_EVENT_AD_OUTCOME, properties);
        }));
        if recorded.is_err() {
            log::warn!("Analytics sink panicked recording {} outcome", event.surface);
        }
    }
}

struct FacadeRuntime {
    dispatcher: MediationDispatcher,
    settings: Settings,
    pending: Arc<PendingShows>,
    _subscriptions: Vec<Subscription>,
}

/// Application-facing advertising entry point.
pub struct Advertising {
    services: AdServices,
    gate: ShowGate,
    runtime: OnceCell<FacadeRuntime>,
}

impl Advertising {
    pub fn new(services: AdServices) -> Self {
        Self {
            services,
            gate: ShowGate::new(),
            runtime: OnceCell::new(),
        }
    }

    /// Build a dispatcher from `settings` and initialize it.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] for invalid settings.
    pub async fn initialize(&self, settings: &Settings) -> Result<(), Report<MediationError>> {
        if self.runtime.initialized() {
            return Ok(());
        }
        self.initialize_with_dispatcher(build_dispatcher(settings), settings)
            .await
    }

    /// Initialize around a caller-built dispatcher. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] for invalid settings.
    pub async fn initialize_with_dispatcher(
        &self,
        dispatcher: MediationDispatcher,
        settings: &Settings,
    ) -> Result<(), Report<MediationError>> {
        self.runtime
            .get_or_try_init(|| self.start(dispatcher, settings))
            .await
            .map(|_| ())
    }

    async fn start(
        &self,
        dispatcher: MediationDispatcher,
        settings: &Settings,
    ) -> Result<FacadeRuntime, Report<MediationError>> {
        let configs = settings.provider_configs()?;
        let available = dispatcher.initialize(&configs).await?;
        if available == 0 {
            log::warn!("No ad provider initialized, every show will be unavailable");
        }

        let pending = Arc::new(PendingShows::default());
        let handler = Arc::new(OutcomeHandler {
            services: self.services.clone(),
            rewards: settings.rewards.clone(),
            pending: Arc::clone(&pending),
        });
        let subscriptions = AdSurfaceType::ALL
            .iter()
            .map(|surface| {
                let handler = Arc::clone(&handler);
                let observer: Observer = Arc::new(move |event: &AdEvent| handler.handle(event));
                dispatcher.subscribe(*surface, observer)
            })
            .collect();

        if settings.advertising.preload_on_init {
            for surface in PRELOAD_SURFACES {
                dispatcher.preload(surface);
            }
        }
        if settings.advertising.refresh_preloads {
            dispatcher.spawn_preload_refresher(&PRELOAD_SURFACES);
        }

        log::info!("Advertising initialized with {} providers", available);

        Ok(FacadeRuntime {
            dispatcher,
            settings: settings.clone(),
            pending,
            _subscriptions: subscriptions,
        })
    }

    fn runtime(&self) -> Result<&FacadeRuntime, Report<MediationError>> {
        self.runtime.get().ok_or_else(|| {
            Report::new(MediationError::NotInitialized {
                component: "Advertising",
            })
        })
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.runtime.initialized()
    }

    /// The dispatcher in use, once initialized.
    #[must_use]
    pub fn dispatcher(&self) -> Option<&MediationDispatcher> {
        self.runtime.get().map(|runtime| &runtime.dispatcher)
    }

    /// Show an ad. Returns whether it was displayed (completed or skipped).
    ///
    /// A show inside the surface's minimum interval returns `false` without
    /// reaching any provider.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub async fn show_ad(
        &self,
        surface: AdSurfaceType,
        options: &ShowOptions,
    ) -> Result<bool, Report<MediationError>> {
        let result = self.show_ad_with_result(surface, options).await?;
        Ok(matches!(
            result.outcome,
            AdOutcome::Completed | AdOutcome::Skipped
        ))
    }

    /// Like [`Self::show_ad`], returning the dispatcher's result. A gated
    /// show reports [`AdOutcome::NotAvailable`].
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub async fn show_ad_with_result(
        &self,
        surface: AdSurfaceType,
        options: &ShowOptions,
    ) -> Result<ShowResult, Report<MediationError>> {
        let runtime = self.runtime()?;

        let attempt_id = Uuid::new_v4();
        let claimed = runtime.pending.claim(
            surface,
            PendingShow {
                attempt_id,
                content_id: options.content_id.clone(),
                content_type: options.content_type.clone(),
            },
        );
        if !claimed {
            log::info!("Show for {} already in progress, rejecting", surface);
            return Ok(ShowResult::not_available(surface));
        }

        let min_interval = Duration::from_millis(
            options
                .min_interval_ms
                .unwrap_or(runtime.settings.advertising.default_min_interval_ms),
        );
        if let Err(rejection) = self.gate.try_pass(surface, min_interval) {
            log::info!("{}", rejection);
            runtime.pending.clear(surface, attempt_id);
            return Ok(ShowResult::not_available(surface));
        }

        let result = runtime.dispatcher.show_ad(surface, options).await;
        runtime.pending.clear(surface, attempt_id);
        result
    }

    /// Acquire a fill ahead of a show.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub async fn load_ad(&self, surface: AdSurfaceType) -> Result<bool, Report<MediationError>> {
        self.runtime()?.dispatcher.load_ad(surface).await
    }

    /// Whether a show could start without loading. False before initialize.
    #[must_use]
    pub fn is_ad_ready(&self, surface: AdSurfaceType) -> bool {
        self.runtime
            .get()
            .is_some_and(|runtime| runtime.dispatcher.is_ad_ready(surface))
    }

    /// Observe outcomes for `surface`.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub fn subscribe(
        &self,
        surface: AdSurfaceType,
        observer: Observer,
    ) -> Result<Subscription, Report<MediationError>> {
        Ok(self.runtime()?.dispatcher.subscribe(surface, observer))
    }

    /// Stop background work and silence observers.
    pub fn shutdown(&self) {
        if let Some(runtime) = self.runtime.get() {
            runtime.dispatcher.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::mock::{MockConfig, MockProvider};
    use crate::mediation::config::{MediationPolicy, MediationStrategy, ProviderDescriptor};
    use crate::mediation::provider::AdProvider;
    use crate::test_support::tests::{create_test_settings, outcomes, record, FailingCoinLedger};

    /// Facade over a single scripted provider `a`.
    async fn facade_with(provider: Arc<MockProvider>) -> (Advertising, MemoryServices) {
        let memory = MemoryServices::new();
        let facade = Advertising::new(memory.services());
        let settings = create_test_settings();

        let dispatcher = MediationDispatcher::new(
            MediationPolicy::new(
                MediationStrategy::Waterfall,
                vec![ProviderDescriptor::new("a", 1, 50)],
            )
            .with_preload_delay_ms(500),
        );
        dispatcher.register_provider(provider as Arc<dyn AdProvider>);
        facade
            .initialize_with_dispatcher(dispatcher, &settings)
            .await
            .expect("should initialize");
        (facade, memory)
    }

    #[tokio::test]
    async fn test_show_before_initialize_is_contract_violation() {
        let facade = Advertising::new(MemoryServices::new().services());
        let err = facade
            .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
            .await
            .expect_err("show before initialize must fail");
        assert!(matches!(
            err.current_context(),
            MediationError::NotInitialized { .. }
        ));
        assert!(!facade.is_ad_ready(AdSurfaceType::Rewarded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_rejects_second_show_inside_interval() {
        let provider = Arc::new(MockProvider::new("a"));
        let (facade, _memory) = facade_with(Arc::clone(&provider)).await;
        let options = ShowOptions::default().with_min_interval_ms(30_000);

        assert!(facade
            .show_ad(AdSurfaceType::Interstitial, &options)
            .await
            .expect("first show"));
        assert_eq!(provider.show_calls(), 1);

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(!facade
            .show_ad(AdSurfaceType::Interstitial, &options)
            .await
            .expect("gated show"));
        assert_eq!(provider.show_calls(), 1, "gated show never reaches a provider");

        tokio::time::sleep(Duration::from_millis(21_000)).await;
        assert!(facade
            .show_ad(AdSurfaceType::Interstitial, &options)
            .await
            .expect("third show"));
        assert_eq!(provider.show_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables_gate() {
        let provider = Arc::new(MockProvider::new("a"));
        let (facade, _memory) = facade_with(Arc::clone(&provider)).await;
        let options = ShowOptions::default().with_min_interval_ms(0);

        assert!(facade.show_ad(AdSurfaceType::Banner, &options).await.expect("show"));
        assert!(facade.show_ad(AdSurfaceType::Banner, &options).await.expect("show"));
        assert_eq!(provider.show_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reward_granted_exactly_once_with_duplicate_terminal() {
        let provider = Arc::new(MockProvider::new("a").with_duplicate_terminal());
        let (facade, memory) = facade_with(provider).await;

        assert!(facade
            .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
            .await
            .expect("show"));

        let awards = memory.coins.awards();
        assert_eq!(awards.len(), 1, "one award per completed show");
        assert_eq!(awards[0].0, 25);
        assert!(memory.unlocker.unlocked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewarded_show_with_content_unlocks_instead_of_coins() {
        let provider = Arc::new(MockProvider::new("a"));
        let (facade, memory) = facade_with(provider).await;
        let options = ShowOptions {
            content_id: Some("ep-42".to_string()),
            ..ShowOptions::default()
        };

        assert!(facade
            .show_ad(AdSurfaceType::Rewarded, &options)
            .await
            .expect("show"));

        assert_eq!(
            memory.unlocker.unlocked(),
            vec![("ep-42".to_string(), "episode".to_string())]
        );
        assert_eq!(memory.coins.balance(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_show_keeps_running_show_context() {
        let provider = Arc::new(MockProvider::with_config(
            "a",
            MockConfig {
                show_latency_ms: 1_000,
                ..MockConfig::default()
            },
        ));
        let (facade, memory) = facade_with(Arc::clone(&provider)).await;
        let unlocking = ShowOptions::default()
            .with_min_interval_ms(0)
            .with_content("ep-1", "episode");
        let ungated = ShowOptions::default().with_min_interval_ms(0);

        let (first, second) = tokio::join!(
            facade.show_ad(AdSurfaceType::Rewarded, &unlocking),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                facade.show_ad(AdSurfaceType::Rewarded, &ungated).await
            }
        );

        assert!(first.expect("first show"));
        assert!(!second.expect("second show"), "surface is busy");
        assert_eq!(provider.show_calls(), 1);
        assert_eq!(
            memory.unlocker.unlocked(),
            vec![("ep-1".to_string(), "episode".to_string())]
        );
        assert!(memory.coins.awards().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewarded_completion_without_reward_grants_nothing() {
        let provider = Arc::new(MockProvider::new("a").without_reward());
        let (facade, memory) = facade_with(provider).await;

        assert!(facade
            .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
            .await
            .expect("show"));

        assert!(memory.coins.awards().is_empty());
        assert!(memory.unlocker.unlocked().is_empty());
        let records = memory.analytics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1["success"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interstitial_completion_grants_nothing() {
        let provider = Arc::new(MockProvider::new("a"));
        let (facade, memory) = facade_with(provider).await;

        assert!(facade
            .show_ad(AdSurfaceType::Interstitial, &ShowOptions::default())
            .await
            .expect("show"));
        assert!(memory.coins.awards().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_rewarded_show_grants_nothing() {
        let provider = Arc::new(
            MockProvider::new("a")
                .with_show_outcome(crate::integrations::mock::ScriptedOutcome::Skipped),
        );
        let (facade, memory) = facade_with(provider).await;

        assert!(facade
            .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
            .await
            .expect("show"));
        assert!(memory.coins.awards().is_empty());
        assert!(memory.analytics.records().is_empty(), "skips are not reported");
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_records_terminal_outcomes() {
        let provider = Arc::new(MockProvider::new("a"));
        let (facade, memory) = facade_with(Arc::clone(&provider)).await;
        let options = ShowOptions::default().with_content("ep-7", "episode");

        assert!(facade
            .show_ad(AdSurfaceType::Rewarded, &options)
            .await
            .expect("show"));

        // Let the re-arming preload finish, then make the next load fail.
        tokio::time::sleep(Duration::from_millis(600)).await;
        provider.set_fill(false);
        let _ = provider.show_ad(AdSurfaceType::Rewarded, &options).await;
        assert!(!facade
            .load_ad(AdSurfaceType::Rewarded)
            .await
            .expect("load"));

        let records = memory.analytics.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, ANALYTICS_EVENT_AD_OUTCOME);
        assert_eq!(records[0].1["success"], json!(true));
        assert_eq!(records[0].1["surface"], json!("rewarded"));
        assert_eq!(records[0].1["content_id"], json!("ep-7"));
        assert_eq!(records[1].1["success"], json!(false));
        assert_eq!(records[1].1["content_id"], json!(null));
    }

    struct PanickingAnalytics;

    impl AnalyticsSink for PanickingAnalytics {
        #[allow(clippy::panic)]
        fn record(&self, _event_name: &str, _properties: serde_json::Value) {
            panic!("analytics offline");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collaborator_failures_never_reach_caller() {
        let memory = MemoryServices::new();
        let services = AdServices::new(
            Arc::new(FailingCoinLedger),
            memory.unlocker.clone(),
            Arc::new(PanickingAnalytics),
        );
        let facade = Advertising::new(services);
        let dispatcher = MediationDispatcher::new(MediationPolicy::new(
            MediationStrategy::Waterfall,
            vec![ProviderDescriptor::new("a", 1, 50)],
        ));
        dispatcher.register_provider(Arc::new(MockProvider::new("a")));
        facade
            .initialize_with_dispatcher(dispatcher, &create_test_settings())
            .await
            .expect("should initialize");

        let (log, _subscription) = record(AdSurfaceType::Rewarded, |s, o| {
            facade.subscribe(s, o).expect("subscribe")
        });
        let shown = facade
            .show_ad(AdSurfaceType::Rewarded, &ShowOptions::default())
            .await
            .expect("show");

        assert!(shown);
        assert!(outcomes(&log).contains(&AdOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_is_idempotent() {
        let provider = Arc::new(MockProvider::new("a"));
        let (facade, _memory) = facade_with(Arc::clone(&provider)).await;

        facade
            .initialize(&create_test_settings())
            .await
            .expect("second initialize");
        assert_eq!(provider.init_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_preloads_interstitial_and_rewarded() {
        let memory = MemoryServices::new();
        let facade = Advertising::new(memory.services());
        let mut settings = create_test_settings();
        settings.advertising.preload_on_init = true;

        facade.initialize(&settings).await.expect("should initialize");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(facade.is_ad_ready(AdSurfaceType::Rewarded));
        assert!(facade.is_ad_ready(AdSurfaceType::Interstitial));
        assert!(!facade.is_ad_ready(AdSurfaceType::Banner));
        facade.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_policy_fails_initialize() {
        let facade = Advertising::new(MemoryServices::new().services());
        let dispatcher = MediationDispatcher::new(
            MediationPolicy::new(
                MediationStrategy::Waterfall,
                vec![ProviderDescriptor::new("a", 1, 50)],
            )
            .with_timeout_ms(0),
        );
        let err = facade
            .initialize_with_dispatcher(dispatcher, &create_test_settings())
            .await
            .expect_err("zero timeout must be rejected");
        assert!(matches!(
            err.current_context(),
            MediationError::Configuration { .. }
        ));
        assert!(!facade.is_initialized());
    }
}
