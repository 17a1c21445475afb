//! Mediation policy: strategy, provider descriptors and timing.

use derive_more::Display;
use error_stack::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::constants::{
    DEFAULT_PRELOAD_DELAY_MS, DEFAULT_PRELOAD_REFRESH_MS, DEFAULT_PROVIDER_WEIGHT,
    DEFAULT_TIMEOUT_MS,
};
use crate::error::MediationError;

/// How candidate providers are ordered for each load or show.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediationStrategy {
    /// Ascending priority.
    #[default]
    #[display("waterfall")]
    Waterfall,
    /// Rotate the enabled list by a cursor advanced on every ordering.
    #[display("round_robin")]
    RoundRobin,
    /// Descending weight as an eCPM proxy.
    #[display("highest_paying")]
    HighestPaying,
    /// Weighted random sampling without replacement.
    #[display("smart")]
    Smart,
}

/// A registered upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProviderDescriptor {
    #[validate(length(min = 1))]
    pub id: String,

    /// Lower is tried first.
    #[serde(default)]
    pub priority: u32,

    /// Fill value proxy, 0-100.
    #[serde(default = "default_weight")]
    #[validate(range(max = 100))]
    pub weight: u32,

    /// Minimum interval between two shows served by this provider.
    #[serde(default)]
    pub min_interval_ms: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> u32 {
    DEFAULT_PROVIDER_WEIGHT
}

fn default_enabled() -> bool {
    true
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, priority: u32, weight: u32) -> Self {
        Self {
            id: id.into(),
            priority,
            weight,
            min_interval_ms: 0,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_min_interval_ms(mut self, min_interval_ms: u64) -> Self {
        self.min_interval_ms = min_interval_ms;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MediationPolicy {
    #[serde(default)]
    pub strategy: MediationStrategy,

    #[serde(default)]
    #[validate(nested)]
    pub providers: Vec<ProviderDescriptor>,

    /// Provider always tried last, whatever the strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Per-provider race timeout.
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Interval of the background preload refresher.
    #[serde(default = "default_preload_refresh_ms")]
    #[validate(range(min = 1))]
    pub preload_refresh_ms: u64,

    /// Delay between a terminal show outcome and the re-arming load.
    #[serde(default = "default_preload_delay_ms")]
    pub preload_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_preload_refresh_ms() -> u64 {
    DEFAULT_PRELOAD_REFRESH_MS
}

fn default_preload_delay_ms() -> u64 {
    DEFAULT_PRELOAD_DELAY_MS
}

impl Default for MediationPolicy {
    /// Waterfall over the two reference networks.
    fn default() -> Self {
        Self {
            strategy: MediationStrategy::Waterfall,
            providers: default_providers(),
            fallback_provider: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            preload_refresh_ms: DEFAULT_PRELOAD_REFRESH_MS,
            preload_delay_ms: DEFAULT_PRELOAD_DELAY_MS,
        }
    }
}

/// Two providers at priorities 1 and 2.
#[must_use]
pub fn default_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor::new(
            crate::integrations::admob::PROVIDER_ID,
            1,
            DEFAULT_PROVIDER_WEIGHT,
        ),
        ProviderDescriptor::new(
            crate::integrations::applovin::PROVIDER_ID,
            2,
            DEFAULT_PROVIDER_WEIGHT,
        ),
    ]
}

impl MediationPolicy {
    pub fn new(strategy: MediationStrategy, providers: Vec<ProviderDescriptor>) -> Self {
        Self {
            strategy,
            providers,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_preload_delay_ms(mut self, preload_delay_ms: u64) -> Self {
        self.preload_delay_ms = preload_delay_ms;
        self
    }

    pub fn with_fallback(mut self, provider_id: impl Into<String>) -> Self {
        self.fallback_provider = Some(provider_id.into());
        self
    }

    /// Look up a descriptor by id.
    #[must_use]
    pub fn descriptor(&self, provider_id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == provider_id)
    }

    /// Validate field ranges plus cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] on out-of-range values,
    /// duplicate provider ids, or a fallback that names no configured provider.
    pub fn check(&self) -> Result<(), Report<MediationError>> {
        self.validate().map_err(|e| {
            Report::new(MediationError::Configuration {
                message: format!("Invalid mediation policy: {e}"),
            })
        })?;

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(Report::new(MediationError::Configuration {
                    message: format!("Duplicate provider id '{}'", provider.id),
                }));
            }
        }

        if let Some(fallback) = &self.fallback_provider {
            if self.descriptor(fallback).is_none() {
                return Err(Report::new(MediationError::Configuration {
                    message: format!("Fallback provider '{fallback}' is not configured"),
                }));
            }
        }

        Ok(())
    }
}
