//! External collaborators the facade reports to.

use error_stack::Report;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::MediationError;

/// Virtual currency balance.
pub trait CoinLedger: Send + Sync {
    /// Credit `amount` coins and return the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Collaborator`] when the ledger rejects the award.
    fn award_coins(&self, amount: u64, reason: &str) -> Result<u64, Report<MediationError>>;
}

/// Grants access to gated content.
pub trait ContentUnlocker: Send + Sync {
    /// # Errors
    ///
    /// Returns [`MediationError::Collaborator`] when the content cannot be unlocked.
    fn unlock_content(&self, content_id: &str, content_type: &str)
        -> Result<(), Report<MediationError>>;
}

/// Fire-and-forget telemetry.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event_name: &str, properties: serde_json::Value);
}

/// Collaborators handed to [`super::Advertising`].
#[derive(Clone)]
pub struct AdServices {
    pub coins: Arc<dyn CoinLedger>,
    pub unlocker: Arc<dyn ContentUnlocker>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

impl AdServices {
    pub fn new(
        coins: Arc<dyn CoinLedger>,
        unlocker: Arc<dyn ContentUnlocker>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            coins,
            unlocker,
            analytics,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCoinLedger {
    balance: AtomicU64,
    awards: Mutex<Vec<(u64, String)>>,
}

impl MemoryCoinLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::SeqCst)
    }

    /// Every `(amount, reason)` awarded so far.
    #[must_use]
    pub fn awards(&self) -> Vec<(u64, String)> {
        self.awards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CoinLedger for MemoryCoinLedger {
    fn award_coins(&self, amount: u64, reason: &str) -> Result<u64, Report<MediationError>> {
        self.awards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((amount, reason.to_string()));
        Ok(self.balance.fetch_add(amount, Ordering::SeqCst) + amount)
    }
}

#[derive(Debug, Default)]
pub struct MemoryContentUnlocker {
    unlocked: Mutex<Vec<(String, String)>>,
}

impl MemoryContentUnlocker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(content_id, content_type)` unlocked so far.
    #[must_use]
    pub fn unlocked(&self) -> Vec<(String, String)> {
        self.unlocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ContentUnlocker for MemoryContentUnlocker {
    fn unlock_content(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<(), Report<MediationError>> {
        self.unlocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((content_id.to_string(), content_type.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAnalytics {
    records: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryAnalytics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<(String, serde_json::Value)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AnalyticsSink for MemoryAnalytics {
    fn record(&self, event_name: &str, properties: serde_json::Value) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event_name.to_string(), properties));
    }
}

/// In-memory collaborators plus handles to inspect them.
pub struct MemoryServices {
    pub coins: Arc<MemoryCoinLedger>,
    pub unlocker: Arc<MemoryContentUnlocker>,
    pub analytics: Arc<MemoryAnalytics>,
}

impl MemoryServices {
    #[must_use]
    pub fn new() -> Self {
        Self {
            coins: Arc::new(MemoryCoinLedger::new()),
            unlocker: Arc::new(MemoryContentUnlocker::new()),
            analytics: Arc::new(MemoryAnalytics::new()),
        }
    }

    #[must_use]
    pub fn services(&self) -> AdServices {
        AdServices::new(
            Arc::clone(&self.coins) as Arc<dyn CoinLedger>,
            Arc::clone(&self.unlocker) as Arc<dyn ContentUnlocker>,
            Arc::clone(&self.analytics) as Arc<dyn AnalyticsSink>,
        )
    }
}

impl Default for MemoryServices {
    fn default() -> Self {
        Self::new()
    }
}
