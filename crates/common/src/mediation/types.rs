//! Core types shared by providers, the dispatcher and the facade.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MediationError;

/// Kind of ad slot.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdSurfaceType {
    #[display("banner")]
    Banner,
    #[display("interstitial")]
    Interstitial,
    #[display("rewarded")]
    Rewarded,
    #[display("native")]
    Native,
}

impl AdSurfaceType {
    /// Every surface type, in declaration order.
    pub const ALL: [AdSurfaceType; 4] = [
        AdSurfaceType::Banner,
        AdSurfaceType::Interstitial,
        AdSurfaceType::Rewarded,
        AdSurfaceType::Native,
    ];

    /// Lowercase identifier used in configuration and telemetry.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AdSurfaceType::Banner => "banner",
            AdSurfaceType::Interstitial => "interstitial",
            AdSurfaceType::Rewarded => "rewarded",
            AdSurfaceType::Native => "native",
        }
    }
}

impl FromStr for AdSurfaceType {
    type Err = MediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "banner" => Ok(AdSurfaceType::Banner),
            "interstitial" => Ok(AdSurfaceType::Interstitial),
            "rewarded" => Ok(AdSurfaceType::Rewarded),
            "native" => Ok(AdSurfaceType::Native),
            other => Err(MediationError::Configuration {
                message: format!("Unknown ad surface type '{other}'"),
            }),
        }
    }
}

/// Lifecycle state of one load or show attempt.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdOutcome {
    #[display("not_available")]
    NotAvailable,
    #[display("loading")]
    Loading,
    #[display("ready")]
    Ready,
    #[display("showing")]
    Showing,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("skipped")]
    Skipped,
}

impl AdOutcome {
    /// Terminal outcomes of a show attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdOutcome::Completed | AdOutcome::Failed | AdOutcome::Skipped
        )
    }
}

/// Reward granted by a completed rewarded show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub amount: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Reward {
    pub fn new(amount: u64, kind: impl Into<String>) -> Self {
        Self {
            amount,
            kind: kind.into(),
        }
    }
}

/// Optional payload attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<Reward>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventData {
    #[must_use]
    pub fn reward(reward: Reward) -> Self {
        Self {
            reward: Some(reward),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            reward: None,
            error: Some(message.into()),
        }
    }
}

/// `(surface, outcome, data)` tuple delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdEvent {
    pub surface: AdSurfaceType,
    pub outcome: AdOutcome,
    #[serde(default)]
    pub data: EventData,
}

impl AdEvent {
    #[must_use]
    pub fn new(surface: AdSurfaceType, outcome: AdOutcome) -> Self {
        Self {
            surface,
            outcome,
            data: EventData::default(),
        }
    }

    pub fn failed(surface: AdSurfaceType, message: impl Into<String>) -> Self {
        Self {
            surface,
            outcome: AdOutcome::Failed,
            data: EventData::error(message),
        }
    }

    #[must_use]
    pub fn completed(surface: AdSurfaceType, reward: Option<Reward>) -> Self {
        Self {
            surface,
            outcome: AdOutcome::Completed,
            data: EventData {
                reward,
                error: None,
            },
        }
    }
}

/// Caller options for a show request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowOptions {
    /// Gate override in milliseconds; `None` uses the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<u64>,
    /// Content the show unlocks on rewarded completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Free-form placement name forwarded to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,
}

impl ShowOptions {
    #[must_use]
    pub fn with_min_interval_ms(mut self, min_interval_ms: u64) -> Self {
        self.min_interval_ms = Some(min_interval_ms);
        self
    }

    pub fn with_content(
        mut self,
        content_id: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.content_id = Some(content_id.into());
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_placement(mut self, placement: impl Into<String>) -> Self {
        self.placement = Some(placement.into());
        self
    }
}

/// Final result of a dispatcher show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowResult {
    pub surface: AdSurfaceType,
    /// Terminal outcome, or `NotAvailable` when the show never reached a provider.
    pub outcome: AdOutcome,
    pub provider: Option<String>,
    pub reward: Option<Reward>,
}

impl ShowResult {
    #[must_use]
    pub fn not_available(surface: AdSurfaceType) -> Self {
        Self {
            surface,
            outcome: AdOutcome::NotAvailable,
            provider: None,
            reward: None,
        }
    }

    /// True when the provider displayed the ad to the end.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == AdOutcome::Completed
    }
}
