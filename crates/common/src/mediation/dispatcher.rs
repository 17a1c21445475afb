//! Mediation dispatcher: provider-agnostic ad acquisition and display.

use error_stack::Report;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{oneshot, Notify, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};

use crate::config_store::ConfigStore;
use crate::constants::{STORE_KEY_LAST_ORDER, STORE_KEY_ROUND_ROBIN_CURSOR};
use crate::error::MediationError;

use super::attempt::{Abandonment, AttemptTag, Settlement, SurfaceStates};
use super::config::MediationPolicy;
use super::observer::{Observer, ObserverRegistry, Subscription};
use super::ordering::ProviderOrdering;
use super::provider::{AdProvider, ProviderConfig};
use super::types::{AdEvent, AdOutcome, AdSurfaceType, ShowOptions, ShowResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// How one provider race ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Filled,
    NoFill,
    TimedOut,
    /// The provider's load task ended without reporting.
    Errored,
}

/// Per-provider diagnostic for one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDiagnostic {
    pub provider: String,
    pub result: AttemptResult,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// A provider filled during this load.
    Ready { provider: String },
    /// The bound provider still had a ready fill; nothing was requested.
    AlreadyLoaded { provider: String },
    /// Another load for the surface was in flight; this call was a no-op.
    InProgress,
    /// Every candidate failed or timed out.
    Exhausted,
}

/// Outcome of a load, with per-provider diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub surface: AdSurfaceType,
    pub status: LoadStatus,
    pub attempts: Vec<AttemptDiagnostic>,
}

impl LoadReport {
    fn without_attempts(surface: AdSurfaceType, status: LoadStatus) -> Self {
        Self {
            surface,
            status,
            attempts: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(
            self.status,
            LoadStatus::Ready { .. } | LoadStatus::AlreadyLoaded { .. }
        )
    }

    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match &self.status {
            LoadStatus::Ready { provider } | LoadStatus::AlreadyLoaded { provider } => {
                Some(provider)
            }
            LoadStatus::InProgress | LoadStatus::Exhausted => None,
        }
    }

    /// Aggregate error for an exhausted load.
    #[must_use]
    pub fn error(&self) -> Option<MediationError> {
        (self.status == LoadStatus::Exhausted).then(|| MediationError::AllProvidersExhausted {
            surface: self.surface,
            attempts: self.attempts.len(),
        })
    }
}

/// Construction options for [`MediationDispatcher::with_options`].
#[derive(Default)]
pub struct DispatcherOptions {
    pub ordering: ProviderOrdering,
    pub store: Option<Arc<dyn ConfigStore>>,
}

struct DispatcherInner {
    policy: RwLock<Arc<MediationPolicy>>,
    providers: RwLock<HashMap<String, Arc<dyn AdProvider>>>,
    /// Registered providers whose `initialize` succeeded.
    available: RwLock<HashSet<String>>,
    init: OnceCell<usize>,
    shut_down: AtomicBool,
    states: SurfaceStates,
    ordering: ProviderOrdering,
    observers: ObserverRegistry,
    last_provider_show: Mutex<HashMap<String, Instant>>,
    load_finished: Notify,
    store: Option<Arc<dyn ConfigStore>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Turns "get me a fill for surface X" into a provider-agnostic acquisition.
///
/// Cloning yields another handle to the same dispatcher.
#[derive(Clone)]
pub struct MediationDispatcher {
    inner: Arc<DispatcherInner>,
}

impl MediationDispatcher {
    /// Create a dispatcher with the given policy.
    pub fn new(policy: MediationPolicy) -> Self {
        Self::with_options(policy, DispatcherOptions::default())
    }

    pub fn with_options(policy: MediationPolicy, options: DispatcherOptions) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                policy: RwLock::new(Arc::new(policy)),
                providers: RwLock::new(HashMap::new()),
                available: RwLock::new(HashSet::new()),
                init: OnceCell::new(),
                shut_down: AtomicBool::new(false),
                states: SurfaceStates::new(),
                ordering: options.ordering,
                observers: ObserverRegistry::new(),
                last_provider_show: Mutex::new(HashMap::new()),
                load_finished: Notify::new(),
                store: options.store,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register an ad provider. Must happen before [`Self::initialize`].
    pub fn register_provider(&self, provider: Arc<dyn AdProvider>) {
        let id = provider.provider_id().to_string();
        if self.is_initialized() {
            log::warn!(
                "Provider '{}' registered after initialize, it will not be used",
                id
            );
        } else {
            log::info!("Registering ad provider: {}", id);
        }
        write(&self.inner.providers).insert(id, provider);
    }

    /// Get the number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        read(&self.inner.providers).len()
    }

    #[must_use]
    pub fn policy(&self) -> Arc<MediationPolicy> {
        Arc::clone(&read(&self.inner.policy))
    }

    /// Replace the policy. The next ordering uses the new one.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when the policy is invalid;
    /// the current policy is kept.
    pub fn set_policy(&self, policy: MediationPolicy) -> Result<(), Report<MediationError>> {
        policy.check()?;
        log::info!(
            "Mediation policy replaced (strategy: {}, {} providers)",
            policy.strategy,
            policy.providers.len()
        );
        *write(&self.inner.policy) = Arc::new(policy);
        Ok(())
    }

    /// Initialize every registered provider concurrently.
    ///
    /// Idempotent: later calls return the first result. Returns how many
    /// providers initialized successfully; failed providers are never candidates.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when the policy is invalid.
    pub async fn initialize(
        &self,
        configs: &HashMap<String, ProviderConfig>,
    ) -> Result<usize, Report<MediationError>> {
        self.policy().check()?;
        let available = *self
            .inner
            .init
            .get_or_init(|| self.initialize_providers(configs))
            .await;
        Ok(available)
    }

    async fn initialize_providers(&self, configs: &HashMap<String, ProviderConfig>) -> usize {
        self.restore_ordering();

        let policy = self.policy();
        let providers: Vec<Arc<dyn AdProvider>> =
            read(&self.inner.providers).values().cloned().collect();

        for descriptor in &policy.providers {
            if !providers.iter().any(|p| p.provider_id() == descriptor.id) {
                log::warn!(
                    "Provider '{}' configured but not registered",
                    descriptor.id
                );
            }
        }

        let results = join_all(providers.iter().map(|provider| {
            let config = configs
                .get(provider.provider_id())
                .cloned()
                .unwrap_or_default();
            async move {
                (
                    provider.provider_id().to_string(),
                    provider.initialize(config).await,
                )
            }
        }))
        .await;

        let mut available = write(&self.inner.available);
        for (id, ok) in results {
            if ok {
                available.insert(id);
            } else {
                log::error!("Provider '{}' failed to initialize", id);
            }
        }

        log::info!(
            "Mediation dispatcher initialized with {} of {} providers (strategy: {})",
            available.len(),
            providers.len(),
            policy.strategy
        );
        available.len()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.init.initialized()
    }

    fn ensure_initialized(&self) -> Result<(), Report<MediationError>> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Report::new(MediationError::NotInitialized {
                component: "MediationDispatcher",
            }))
        }
    }

    fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Observe the dispatcher's provider-agnostic events for `surface`.
    pub fn subscribe(&self, surface: AdSurfaceType, observer: Observer) -> Subscription {
        self.inner.observers.subscribe(surface, observer)
    }

    /// Provider currently bound to `surface`.
    #[must_use]
    pub fn active_provider(&self, surface: AdSurfaceType) -> Option<String> {
        self.inner.states.binding(surface)
    }

    /// Whether a show for `surface` could start without loading.
    #[must_use]
    pub fn is_ad_ready(&self, surface: AdSurfaceType) -> bool {
        if let Some((_, provider)) = self.bound_provider(surface) {
            if provider.is_ad_ready(surface) {
                return true;
            }
        }
        let available = read(&self.inner.available);
        read(&self.inner.providers)
            .iter()
            .any(|(id, p)| available.contains(id) && p.is_ad_ready(surface))
    }

    /// Acquire a fill for `surface`. Returns whether one is ready.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub async fn load_ad(&self, surface: AdSurfaceType) -> Result<bool, Report<MediationError>> {
        Ok(self.load_ad_with_report(surface).await?.is_ready())
    }

    /// Like [`Self::load_ad`], with per-provider diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub async fn load_ad_with_report(
        &self,
        surface: AdSurfaceType,
    ) -> Result<LoadReport, Report<MediationError>> {
        self.ensure_initialized()?;
        Ok(self.run_load(surface).await)
    }

    async fn run_load(&self, surface: AdSurfaceType) -> LoadReport {
        if self.is_shut_down() {
            return LoadReport::without_attempts(surface, LoadStatus::Exhausted);
        }

        if let Some((id, provider)) = self.bound_provider(surface) {
            if provider.is_ad_ready(surface) {
                log::debug!("{} already loaded by '{}'", surface, id);
                return LoadReport::without_attempts(
                    surface,
                    LoadStatus::AlreadyLoaded { provider: id },
                );
            }
        }

        if !self.inner.states.begin_load(surface) {
            log::debug!("Load for {} already in progress, ignoring", surface);
            return LoadReport::without_attempts(surface, LoadStatus::InProgress);
        }

        self.emit(AdEvent::new(surface, AdOutcome::Loading));

        let policy = self.policy();
        let deadline = Duration::from_millis(policy.timeout_ms);
        let candidates = self.candidates(surface, &policy);
        let mut attempts = Vec::with_capacity(candidates.len());

        for (provider_id, provider) in candidates {
            let started = Instant::now();
            let tag = self.inner.states.next_attempt(surface);
            let result = self.race(tag, &provider_id, provider, deadline).await;
            attempts.push(AttemptDiagnostic {
                provider: provider_id.clone(),
                result,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            if result == AttemptResult::Filled {
                log::info!(
                    "Provider '{}' filled {} after {} attempt(s)",
                    provider_id,
                    surface,
                    attempts.len()
                );
                self.emit(AdEvent::new(surface, AdOutcome::Ready));
                self.inner.load_finished.notify_waiters();
                return LoadReport {
                    surface,
                    status: LoadStatus::Ready {
                        provider: provider_id,
                    },
                    attempts,
                };
            }
        }

        self.inner.states.fail_load(surface);
        let error = MediationError::AllProvidersExhausted {
            surface,
            attempts: attempts.len(),
        };
        log::warn!("{}", error);
        self.emit(AdEvent::failed(surface, error.to_string()));
        self.inner.load_finished.notify_waiters();

        LoadReport {
            surface,
            status: LoadStatus::Exhausted,
            attempts,
        }
    }

    /// Race one provider's load against `deadline`.
    ///
    /// The provider call runs in its own task because adapters cannot be
    /// cancelled. Its result is applied through the generation check in
    /// [`SurfaceStates::settle`], so a loser finishing after the deadline
    /// is dropped.
    async fn race(
        &self,
        tag: AttemptTag,
        provider_id: &str,
        provider: Arc<dyn AdProvider>,
        deadline: Duration,
    ) -> AttemptResult {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let id = provider_id.to_string();

        tokio::spawn(async move {
            let ready = provider.load_ad(tag.surface).await;
            let settlement = inner.states.settle(tag, &id, ready);
            if settlement == Settlement::Stale {
                log::debug!(
                    "Dropping late load result from '{}' for {} (attempt {})",
                    id,
                    tag.surface,
                    tag.generation
                );
            }
            // Receiver is gone once the race was abandoned.
            let _ = tx.send(settlement);
        });

        match timeout(deadline, rx).await {
            Ok(Ok(Settlement::Bound)) => AttemptResult::Filled,
            Ok(Ok(Settlement::Declined | Settlement::Stale)) => {
                log::info!("Provider '{}' has no fill for {}", provider_id, tag.surface);
                AttemptResult::NoFill
            }
            Ok(Err(_)) => {
                log::warn!(
                    "Load task for '{}' ended without a result on {}",
                    provider_id,
                    tag.surface
                );
                AttemptResult::Errored
            }
            Err(_) => match self.inner.states.abandon(tag) {
                Abandonment::AlreadyBound => AttemptResult::Filled,
                Abandonment::Abandoned => {
                    log::warn!(
                        "{}",
                        MediationError::Timeout {
                            provider: provider_id.to_string(),
                            timeout_ms: deadline.as_millis() as u64,
                        }
                    );
                    AttemptResult::TimedOut
                }
            },
        }
    }

    /// Display a fill for `surface`, loading one first when nothing is bound.
    ///
    /// Resolves once the provider reports a terminal outcome. A fresh load is
    /// scheduled in the background afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::NotInitialized`] before [`Self::initialize`].
    pub async fn show_ad(
        &self,
        surface: AdSurfaceType,
        options: &ShowOptions,
    ) -> Result<ShowResult, Report<MediationError>> {
        self.ensure_initialized()?;

        if self.is_shut_down() {
            return Ok(ShowResult::not_available(surface));
        }
        if !self.inner.states.begin_show(surface) {
            log::info!("Show for {} already in progress, rejecting", surface);
            return Ok(ShowResult::not_available(surface));
        }
        let _guard = ShowGuard {
            states: &self.inner.states,
            surface,
        };

        Ok(self.run_show(surface, options).await)
    }

    async fn run_show(&self, surface: AdSurfaceType, options: &ShowOptions) -> ShowResult {
        let Some((provider_id, provider)) = self.resolve_provider(surface).await else {
            log::info!("No fill available to show {}", surface);
            return ShowResult::not_available(surface);
        };

        let policy = self.policy();
        let (tx, mut rx) = oneshot::channel();
        let attempt = Arc::new(ShowAttempt {
            surface,
            provider_id: provider_id.clone(),
            terminated: AtomicBool::new(false),
            terminal_tx: Mutex::new(Some(tx)),
            observers: self.inner.observers.clone(),
        });

        let forwarder: Observer = {
            let attempt = Arc::clone(&attempt);
            Arc::new(move |event: &AdEvent| attempt.forward(event))
        };
        let subscription = provider.add_callback(surface, forwarder);

        log::info!("Showing {} via '{}'", surface, provider_id);
        let presented = provider.show_ad(surface, options).await;
        if !presented {
            attempt.forward(&AdEvent::failed(
                surface,
                format!("Provider '{provider_id}' could not present {surface}"),
            ));
        }

        let terminal = match timeout(Duration::from_millis(policy.timeout_ms), &mut rx).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => AdEvent::failed(surface, "Terminal outcome lost"),
            Err(_) => {
                log::warn!(
                    "Provider '{}' reported no terminal outcome for {}",
                    provider_id,
                    surface
                );
                attempt.forward(&AdEvent::failed(
                    surface,
                    "Provider never reported a terminal outcome",
                ));
                rx.await
                    .unwrap_or_else(|_| AdEvent::failed(surface, "Terminal outcome lost"))
            }
        };

        provider.remove_callback(subscription);
        self.inner.states.clear_binding(surface, &provider_id);
        self.record_provider_show(&provider_id);
        self.schedule_preload(surface, policy.preload_delay_ms);

        log::info!(
            "Show of {} via '{}' ended: {}",
            surface,
            provider_id,
            terminal.outcome
        );

        let reward = if terminal.outcome == AdOutcome::Completed {
            terminal.data.reward
        } else {
            None
        };
        ShowResult {
            surface,
            outcome: terminal.outcome,
            provider: Some(provider_id),
            reward,
        }
    }

    /// Find the provider a show should use, binding one if necessary.
    async fn resolve_provider(
        &self,
        surface: AdSurfaceType,
    ) -> Option<(String, Arc<dyn AdProvider>)> {
        if let Some(bound) = self.bound_provider(surface) {
            return Some(bound);
        }

        let policy = self.policy();
        let ready = self
            .candidates(surface, &policy)
            .into_iter()
            .find(|(_, provider)| provider.is_ad_ready(surface));
        if let Some((id, _)) = ready {
            let bound = self.inner.states.bind_if_unset(surface, &id);
            log::debug!("Discovered ready fill for {} at '{}'", surface, bound);
            return self.provider(&bound).map(|provider| (bound, provider));
        }

        // A load that ends without binding has already emitted its Failed.
        if self.inner.states.is_loading(surface) {
            self.wait_for_load(surface).await;
            return self.bound_provider(surface);
        }

        let report = self.run_load(surface).await;
        match report.status {
            LoadStatus::Ready { provider } | LoadStatus::AlreadyLoaded { provider } => {
                self.provider(&provider).map(|p| (provider, p))
            }
            LoadStatus::InProgress => {
                self.wait_for_load(surface).await;
                self.bound_provider(surface)
            }
            LoadStatus::Exhausted => None,
        }
    }

    async fn wait_for_load(&self, surface: AdSurfaceType) {
        loop {
            let notified = self.inner.load_finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.inner.states.is_loading(surface) || self.is_shut_down() {
                return;
            }
            notified.await;
        }
    }

    fn provider(&self, provider_id: &str) -> Option<Arc<dyn AdProvider>> {
        read(&self.inner.providers).get(provider_id).cloned()
    }

    fn bound_provider(&self, surface: AdSurfaceType) -> Option<(String, Arc<dyn AdProvider>)> {
        let id = self.inner.states.binding(surface)?;
        let provider = self.provider(&id)?;
        Some((id, provider))
    }

    /// Ordered candidates for one request: initialized providers, minus any
    /// still inside their own minimum show interval.
    fn candidates(
        &self,
        surface: AdSurfaceType,
        policy: &MediationPolicy,
    ) -> Vec<(String, Arc<dyn AdProvider>)> {
        let order = self.inner.ordering.next_order(policy);
        self.persist_ordering(&order);

        let providers = read(&self.inner.providers);
        let available = read(&self.inner.available);
        let last_show = lock(&self.inner.last_provider_show);
        let now = Instant::now();

        order
            .into_iter()
            .filter_map(|id| {
                if !available.contains(&id) {
                    log::debug!("Provider '{}' not available for {}, skipping", id, surface);
                    return None;
                }
                let provider = providers.get(&id)?;
                if let (Some(descriptor), Some(shown_at)) =
                    (policy.descriptor(&id), last_show.get(&id))
                {
                    let min_interval = Duration::from_millis(descriptor.min_interval_ms);
                    if now.duration_since(*shown_at) < min_interval {
                        log::debug!(
                            "Provider '{}' inside its {}ms show interval, skipping",
                            id,
                            descriptor.min_interval_ms
                        );
                        return None;
                    }
                }
                Some((id, Arc::clone(provider)))
            })
            .collect()
    }

    fn record_provider_show(&self, provider_id: &str) {
        lock(&self.inner.last_provider_show).insert(provider_id.to_string(), Instant::now());
    }

    fn persist_ordering(&self, order: &[String]) {
        let Some(store) = &self.inner.store else {
            return;
        };
        let cursor = self.inner.ordering.cursor().to_string();
        if let Err(e) = store.put(STORE_KEY_ROUND_ROBIN_CURSOR, &cursor) {
            log::warn!("Failed to persist round-robin cursor: {:?}", e);
        }
        match serde_json::to_string(order) {
            Ok(json) => {
                if let Err(e) = store.put(STORE_KEY_LAST_ORDER, &json) {
                    log::warn!("Failed to persist provider order: {:?}", e);
                }
            }
            Err(e) => log::warn!("Failed to encode provider order: {}", e),
        }
    }

    fn restore_ordering(&self) {
        let Some(store) = &self.inner.store else {
            return;
        };
        match store.get(STORE_KEY_ROUND_ROBIN_CURSOR) {
            Ok(Some(value)) => match value.parse::<usize>() {
                Ok(cursor) => {
                    log::debug!("Restored round-robin cursor {}", cursor);
                    self.inner.ordering.restore_cursor(cursor);
                }
                Err(e) => log::warn!("Ignoring stored round-robin cursor '{}': {}", value, e),
            },
            Ok(None) => {}
            Err(e) => log::warn!("Failed to read round-robin cursor: {:?}", e),
        }
    }

    fn emit(&self, event: AdEvent) {
        if self.is_shut_down() {
            return;
        }
        log::debug!("{} -> {}", event.surface, event.outcome);
        self.inner.observers.emit(&event);
    }

    fn schedule_preload(&self, surface: AdSurfaceType, delay_ms: u64) {
        if self.is_shut_down() {
            return;
        }
        let dispatcher = self.clone();
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(delay_ms)).await;
            if dispatcher.is_shut_down() {
                return;
            }
            match dispatcher.load_ad(surface).await {
                Ok(ready) => log::debug!("Preload of {} after show, ready: {}", surface, ready),
                Err(e) => log::warn!("Preload of {} failed: {:?}", surface, e),
            }
        });
        self.track(handle);
    }

    /// Load `surface` in the background.
    pub fn preload(&self, surface: AdSurfaceType) {
        self.schedule_preload(surface, 0);
    }

    /// Re-arm `surfaces` every `preload_refresh_ms` when nothing is ready.
    pub fn spawn_preload_refresher(&self, surfaces: &[AdSurfaceType]) {
        if self.is_shut_down() {
            return;
        }
        let dispatcher = self.clone();
        let surfaces = surfaces.to_vec();
        let every = Duration::from_millis(self.policy().preload_refresh_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                if dispatcher.is_shut_down() {
                    break;
                }
                for surface in &surfaces {
                    dispatcher.refresh(*surface).await;
                }
            }
        });
        self.track(handle);
    }

    async fn refresh(&self, surface: AdSurfaceType) {
        let states = &self.inner.states;
        if states.is_loading(surface) || states.is_showing(surface) || self.is_ad_ready(surface) {
            return;
        }
        log::debug!("Refreshing inventory for {}", surface);
        if let Err(e) = self.load_ad(surface).await {
            log::warn!("Refresh of {} failed: {:?}", surface, e);
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Stop background work and silence every observer.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.observers.close();
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        for provider in read(&self.inner.providers).values() {
            provider.shutdown();
        }
        self.inner.load_finished.notify_waiters();
        log::info!("Mediation dispatcher shut down");
    }
}

struct ShowGuard<'a> {
    states: &'a SurfaceStates,
    surface: AdSurfaceType,
}

impl Drop for ShowGuard<'_> {
    fn drop(&mut self) {
        self.states.end_show(self.surface);
    }
}

/// Relays one show's provider events to the dispatcher's observers.
///
/// Only the first terminal outcome is forwarded.
struct ShowAttempt {
    surface: AdSurfaceType,
    provider_id: String,
    terminated: AtomicBool,
    terminal_tx: Mutex<Option<oneshot::Sender<AdEvent>>>,
    observers: ObserverRegistry,
}

impl ShowAttempt {
    fn forward(&self, event: &AdEvent) {
        if event.outcome.is_terminal() {
            if self.terminated.swap(true, Ordering::SeqCst) {
                log::debug!(
                    "Dropping {} from '{}' for {} after terminal outcome",
                    event.outcome,
                    self.provider_id,
                    self.surface
                );
                return;
            }
            self.observers.emit(event);
            if let Some(tx) = lock(&self.terminal_tx).take() {
                let _ = tx.send(event.clone());
            }
        } else if event.outcome == AdOutcome::Showing {
            if !self.terminated.load(Ordering::SeqCst) {
                self.observers.emit(event);
            }
        } else {
            log::debug!(
                "Ignoring {} from '{}' during show of {}",
                event.outcome,
                self.provider_id,
                self.surface
            );
        }
    }
}
