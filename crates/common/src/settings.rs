use std::collections::{BTreeMap, HashMap};

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{
    DEFAULT_CONTENT_TYPE, DEFAULT_MIN_SHOW_INTERVAL_MS, DEFAULT_REWARD_COINS,
    DEFAULT_REWARD_REASON, ENV_PREFIX,
};
use crate::error::MediationError;
use crate::mediation::config::{default_providers, MediationPolicy};
use crate::mediation::provider::ProviderConfig;

/// Facade behavior around the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdvertisingSettings {
    /// Gate interval used when a show passes none.
    #[serde(default = "default_min_interval_ms")]
    pub default_min_interval_ms: u64,

    /// Load interstitial and rewarded inventory right after initialize.
    #[serde(default = "default_true")]
    pub preload_on_init: bool,

    /// Run the background preload refresher.
    #[serde(default = "default_true")]
    pub refresh_preloads: bool,
}

impl Default for AdvertisingSettings {
    fn default() -> Self {
        Self {
            default_min_interval_ms: DEFAULT_MIN_SHOW_INTERVAL_MS,
            preload_on_init: true,
            refresh_preloads: true,
        }
    }
}

/// Reward side effects of a completed rewarded show.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
pub struct RewardSettings {
    /// Coins granted when the show carries no content to unlock.
    #[serde(default = "default_coin_amount")]
    #[validate(range(min = 1))]
    pub coin_amount: u64,

    #[serde(default = "default_reward_reason")]
    #[validate(length(min = 1))]
    pub reason: String,

    /// Content type used when a show names content without a type.
    #[serde(default = "default_content_type")]
    #[validate(length(min = 1))]
    pub content_type: String,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            coin_amount: DEFAULT_REWARD_COINS,
            reason: DEFAULT_REWARD_REASON.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    DEFAULT_MIN_SHOW_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_coin_amount() -> u64 {
    DEFAULT_REWARD_COINS
}

fn default_reward_reason() -> String {
    DEFAULT_REWARD_REASON.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub mediation: MediationPolicy,

    #[serde(default)]
    pub advertising: AdvertisingSettings,

    #[serde(default)]
    #[validate(nested)]
    pub rewards: RewardSettings,

    /// Per-provider tables, keyed by provider id. Each table is handed to the
    /// provider's network adapter.
    #[serde(default)]
    pub providers: BTreeMap<String, serde_json::Value>,
}

impl Settings {
    /// Load the embedded default settings, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when the embedded file or an
    /// override is invalid.
    pub fn new() -> Result<Self, Report<MediationError>> {
        Self::from_toml(include_str!("../../../ad-mediation.toml"))
    }

    /// Parse `toml_str`, apply `AD_MEDIATION__SECTION__KEY` overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when parsing or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<MediationError>> {
        let environment = Environment::default()
            .prefix(ENV_PREFIX)
            .separator("__");

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(MediationError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        let mut settings: Self =
            config
                .try_deserialize()
                .change_context(MediationError::Configuration {
                    message: "Failed to deserialize configuration".to_string(),
                })?;

        if settings.mediation.providers.is_empty() {
            log::debug!("No mediation providers configured, using defaults");
            settings.mediation.providers = default_providers();
        }
        settings.check()?;
        Ok(settings)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] describing the first problem found.
    pub fn check(&self) -> Result<(), Report<MediationError>> {
        self.validate().map_err(|e| {
            Report::new(MediationError::Configuration {
                message: format!("Invalid settings: {e}"),
            })
        })?;
        self.mediation.check()?;

        for id in self.providers.keys() {
            if self.mediation.descriptor(id).is_none() {
                log::warn!(
                    "Settings for provider '{}' have no mediation descriptor",
                    id
                );
            }
        }
        Ok(())
    }

    /// Mediation policy described by these settings.
    #[must_use]
    pub fn policy(&self) -> MediationPolicy {
        self.mediation.clone()
    }

    /// Deserialize the table for `provider_id` into `T`.
    ///
    /// Returns `Ok(None)` when no table exists for the provider.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when the table does not match `T`.
    pub fn provider_config<T: DeserializeOwned>(
        &self,
        provider_id: &str,
    ) -> Result<Option<T>, Report<MediationError>> {
        let Some(raw) = self.providers.get(provider_id) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .change_context(MediationError::Configuration {
                message: format!("Invalid settings for provider '{provider_id}'"),
            })
    }

    /// Network an id is served by: the table's `network` field, else the id itself.
    #[must_use]
    pub fn network_of<'a>(&'a self, provider_id: &'a str) -> &'a str {
        self.providers
            .get(provider_id)
            .and_then(|table| table.get("network"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(provider_id)
    }

    /// Configured provider ids served by `network`, in policy order.
    #[must_use]
    pub fn provider_ids_for_network(&self, network: &str) -> Vec<String> {
        self.mediation
            .providers
            .iter()
            .filter(|descriptor| self.network_of(&descriptor.id) == network)
            .map(|descriptor| descriptor.id.clone())
            .collect()
    }

    /// `initialize` inputs for every provider with a settings table.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when a table is malformed.
    pub fn provider_configs(&self) -> Result<HashMap<String, ProviderConfig>, Report<MediationError>> {
        let mut configs = HashMap::with_capacity(self.providers.len());
        for id in self.providers.keys() {
            if let Some(config) = self.provider_config::<ProviderConfig>(id)? {
                configs.insert(id.clone(), config);
            }
        }
        Ok(configs)
    }

    /// Serialize to TOML with every default filled in.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Configuration`] when a provider table cannot
    /// be expressed in TOML.
    pub fn to_canonical_toml(&self) -> Result<String, Report<MediationError>> {
        toml::to_string_pretty(self).change_context(MediationError::Configuration {
            message: "Failed to serialize settings".to_string(),
        })
    }
}
