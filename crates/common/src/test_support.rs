#[cfg(test)]
pub mod tests {
    use std::sync::{Arc, Mutex};

    use error_stack::Report;

    use crate::advertising::CoinLedger;
    use crate::error::MediationError;
    use crate::mediation::observer::{Observer, Subscription};
    use crate::mediation::types::{AdEvent, AdOutcome, AdSurfaceType};
    use crate::settings::Settings;

    pub fn crate_test_settings_str() -> String {
        r#"
            [mediation]
            strategy = "waterfall"
            timeout_ms = 2000
            preload_delay_ms = 500

            [[mediation.providers]]
            id = "alpha"
            priority = 1
            weight = 60

            [[mediation.providers]]
            id = "beta"
            priority = 2
            weight = 40

            [advertising]
            default_min_interval_ms = 30000
            preload_on_init = false
            refresh_preloads = false

            [rewards]
            coin_amount = 25
            reason = "rewarded_ad"

            [providers.alpha]
            network = "mock"
            ad_units = { rewarded = "alpha-rewarded", interstitial = "alpha-interstitial" }

            [providers.beta]
            network = "mock"
            fill = false
            "#
        .to_string()
    }

    pub fn create_test_settings() -> Settings {
        let toml_str = crate_test_settings_str();
        Settings::from_toml(&toml_str).expect("Invalid config")
    }

    /// Shared event log filled by [`recording_observer`].
    pub type EventLog = Arc<Mutex<Vec<AdEvent>>>;

    pub fn recording_observer() -> (EventLog, Observer) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let observer: Observer = Arc::new(move |event: &AdEvent| {
            sink.lock().expect("event log lock").push(event.clone());
        });
        (log, observer)
    }

    pub fn outcomes(log: &EventLog) -> Vec<AdOutcome> {
        log.lock()
            .expect("event log lock")
            .iter()
            .map(|event| event.outcome)
            .collect()
    }

    /// Subscribe a recording observer through `subscribe`.
    pub fn record<F>(surface: AdSurfaceType, subscribe: F) -> (EventLog, Subscription)
    where
        F: FnOnce(AdSurfaceType, Observer) -> Subscription,
    {
        let (log, observer) = recording_observer();
        (log, subscribe(surface, observer))
    }

    /// Coin ledger whose every call fails.
    #[derive(Default)]
    pub struct FailingCoinLedger;

    impl CoinLedger for FailingCoinLedger {
        fn award_coins(&self, _amount: u64, _reason: &str) -> Result<u64, Report<MediationError>> {
            Err(Report::new(MediationError::Collaborator {
                message: "ledger offline".to_string(),
            }))
        }
    }
}
