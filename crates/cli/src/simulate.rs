//! Simulated mediation session.
//!
//! Runs the advertising facade against the configured providers. Networks
//! without an SDK binding answer through their simulated backends.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use ad_mediation_common::advertising::{Advertising, MemoryServices};
use ad_mediation_common::config_store::ConfigStore;
use ad_mediation_common::mediation::build_dispatcher_with_store;
use ad_mediation_common::mediation::types::{AdOutcome, AdSurfaceType, ShowOptions, ShowResult};
use ad_mediation_common::settings::Settings;

use crate::error::CliError;
use crate::store::FileConfigStore;
use crate::OutputFormat;

pub struct SimulationRequest {
    pub file: Option<PathBuf>,
    pub surface: AdSurfaceType,
    pub shows: u32,
    pub content_id: Option<String>,
    pub min_interval_ms: Option<u64>,
    pub store: Option<PathBuf>,
}

impl SimulationRequest {
    fn show_options(&self, settings: &Settings) -> ShowOptions {
        let mut options = ShowOptions::default();
        if let Some(min_interval_ms) = self.min_interval_ms {
            options = options.with_min_interval_ms(min_interval_ms);
        }
        if let Some(content_id) = &self.content_id {
            options = options.with_content(content_id.clone(), settings.rewards.content_type.clone());
        }
        options
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SessionSummary {
    completed: u32,
    skipped: u32,
    failed: u32,
    unavailable: u32,
}

impl SessionSummary {
    fn record(&mut self, result: &ShowResult) {
        match result.outcome {
            AdOutcome::Completed => self.completed += 1,
            AdOutcome::Skipped => self.skipped += 1,
            AdOutcome::Failed => self.failed += 1,
            _ => self.unavailable += 1,
        }
    }
}

fn load_settings(file: Option<&PathBuf>) -> Result<Settings, CliError> {
    let settings = match file {
        Some(path) => Settings::from_toml(&fs::read_to_string(path)?),
        None => Settings::new(),
    };
    settings.map_err(|e| CliError::Config(format!("Failed to load settings: {:?}", e)))
}

/// Run `request.shows` shows and print each result and a summary.
pub fn run(request: &SimulationRequest, format: OutputFormat, verbose: bool) -> Result<(), CliError> {
    let settings = load_settings(request.file.as_ref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(session(request, &settings, format, verbose))
}

async fn session(
    request: &SimulationRequest,
    settings: &Settings,
    format: OutputFormat,
    verbose: bool,
) -> Result<(), CliError> {
    let store = request
        .store
        .clone()
        .map(|path| Arc::new(FileConfigStore::new(path)) as Arc<dyn ConfigStore>);

    let memory = MemoryServices::new();
    let advertising = Advertising::new(memory.services());
    advertising
        .initialize_with_dispatcher(build_dispatcher_with_store(settings, store), settings)
        .await
        .map_err(|e| CliError::Simulation(format!("Failed to initialize: {:?}", e)))?;

    if verbose {
        println!(
            "Simulating {} {} show(s) with strategy {}",
            request.shows, request.surface, settings.mediation.strategy
        );
    }

    let options = request.show_options(settings);
    let mut summary = SessionSummary::default();
    let mut results = Vec::new();

    for attempt in 1..=request.shows {
        let result = advertising
            .show_ad_with_result(request.surface, &options)
            .await
            .map_err(|e| CliError::Simulation(format!("Show {} failed: {:?}", attempt, e)))?;
        summary.record(&result);

        match format {
            OutputFormat::Text => println!(
                "#{} {} via {}{}",
                attempt,
                result.outcome,
                result.provider.as_deref().unwrap_or("-"),
                result
                    .reward
                    .as_ref()
                    .map(|reward| format!(" (reward: {} {})", reward.amount, reward.kind))
                    .unwrap_or_default()
            ),
            OutputFormat::Json => results.push(serde_json::json!({
                "attempt": attempt,
                "outcome": result.outcome,
                "provider": result.provider,
                "reward": result.reward,
            })),
        }
    }

    advertising.shutdown();

    match format {
        OutputFormat::Text => {
            println!(
                "\nCompleted: {}, skipped: {}, failed: {}, unavailable: {}",
                summary.completed, summary.skipped, summary.failed, summary.unavailable
            );
            println!("Coin balance: {}", memory.coins.balance());
            for (content_id, content_type) in memory.unlocker.unlocked() {
                println!("Unlocked {} '{}'", content_type, content_id);
            }
            println!("Analytics events: {}", memory.analytics.records().len());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "surface": request.surface,
                "shows": results,
                "coin_balance": memory.coins.balance(),
                "unlocked": memory.unlocker.unlocked(),
                "analytics_events": memory.analytics.records().len(),
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| CliError::Simulation(format!("Failed to render JSON: {e}")))?;
            println!("{}", rendered);
        }
    }

    Ok(())
}
