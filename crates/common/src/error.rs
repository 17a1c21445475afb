//! Error types for the ad mediation layer.
//!
//! Every fallible operation returns `Result<T, Report<MediationError>>`.
//! Expected conditions such as no-fill or a rate-limited show are reported as
//! plain values by the dispatcher and facade; a [`MediationError`] crossing a
//! public boundary means a contract violation or a configuration problem.

use derive_more::{Display, Error};

use crate::mediation::types::AdSurfaceType;

/// Failure taxonomy shared by adapters, dispatcher and facade.
#[derive(Debug, Display, Error)]
pub enum MediationError {
    /// An operation was attempted before `initialize` completed.
    #[display("{component} used before initialize")]
    NotInitialized { component: &'static str },

    /// A provider had nothing to serve.
    #[display("Provider {provider} has no fill for {surface}")]
    NoFill {
        provider: String,
        surface: AdSurfaceType,
    },

    /// The per-attempt race deadline elapsed.
    #[display("Provider {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Every candidate provider failed or timed out.
    #[display("All {attempts} providers exhausted for {surface}")]
    AllProvidersExhausted {
        surface: AdSurfaceType,
        attempts: usize,
    },

    /// The facade gate rejected a show.
    #[display("Show for {surface} rate limited, retry in {retry_in_ms}ms")]
    RateLimited {
        surface: AdSurfaceType,
        retry_in_ms: u64,
    },

    /// A registered observer failed while handling an event.
    #[display("Observer error: {message}")]
    ObserverError { message: String },

    /// Settings or policy are malformed.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// A provider backend reported an error.
    #[display("Provider {provider} error: {message}")]
    Provider { provider: String, message: String },

    /// An external collaborator (coin ledger, unlocker, store) failed.
    #[display("Collaborator error: {message}")]
    Collaborator { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_stack::Report;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MediationError::NotInitialized {
                component: "Advertising"
            }
            .to_string(),
            "Advertising used before initialize"
        );
        assert_eq!(
            MediationError::Timeout {
                provider: "admob".into(),
                timeout_ms: 10000
            }
            .to_string(),
            "Provider admob timed out after 10000ms"
        );
        assert_eq!(
            MediationError::AllProvidersExhausted {
                surface: AdSurfaceType::Rewarded,
                attempts: 2
            }
            .to_string(),
            "All 2 providers exhausted for rewarded"
        );
    }

    #[test]
    fn test_report_keeps_context() {
        let report = Report::new(MediationError::Configuration {
            message: "duplicate provider id".into(),
        });
        assert!(matches!(
            report.current_context(),
            MediationError::Configuration { .. }
        ));
        assert!(format!("{report}").contains("duplicate provider id"));
    }
}
