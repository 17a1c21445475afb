//! Settings file commands.
//!
//! Settings are loaded from TOML files and merged with environment variables
//! prefixed with `AD_MEDIATION__`. For example, `AD_MEDIATION__MEDIATION__TIMEOUT_MS`
//! will override `mediation.timeout_ms` in the TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use ad_mediation_common::config_store::compute_settings_hash;
use ad_mediation_common::settings::Settings;
use validator::Validate;

use crate::error::CliError;

/// Load a settings file and merge it with environment variables.
///
/// Returns the settings together with their canonical TOML, which has every
/// default filled in.
pub(crate) fn load_and_merge_config(
    file: &Path,
    verbose: bool,
) -> Result<(Settings, String), CliError> {
    let content = fs::read_to_string(file)?;

    if verbose {
        println!("Loading settings from: {}", file.display());
        println!("Environment variables with AD_MEDIATION__ prefix will be merged");
    }

    let settings = Settings::from_toml(&content)
        .map_err(|e| CliError::Config(format!("Failed to parse and merge settings: {:?}", e)))?;

    settings
        .validate()
        .map_err(|e| CliError::Config(format!("Settings validation failed: {e}")))?;

    let merged_toml = settings
        .to_canonical_toml()
        .map_err(|e| CliError::Config(format!("Failed to serialize merged settings: {e:?}")))?;

    Ok((settings, merged_toml))
}

/// Validate a settings file and summarize the mediation setup.
pub fn validate(file: PathBuf, verbose: bool) -> Result<(), CliError> {
    let (settings, merged_toml) = load_and_merge_config(&file, verbose)?;
    let hash = compute_settings_hash(&merged_toml);
    let policy = &settings.mediation;

    println!("Settings are valid");
    println!("  File: {}", file.display());
    println!("  Hash: {}", hash);
    println!("  Strategy: {}", policy.strategy);
    println!("  Load timeout: {} ms", policy.timeout_ms);
    if let Some(fallback) = &policy.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }

    println!("\nProviders:");
    for descriptor in &policy.providers {
        println!(
            "  - {} (network: {}, priority: {}, weight: {}{})",
            descriptor.id,
            settings.network_of(&descriptor.id),
            descriptor.priority,
            descriptor.weight,
            if descriptor.enabled { "" } else { ", disabled" }
        );
    }

    if verbose {
        println!("\nRewards: {} coins ({})", settings.rewards.coin_amount, settings.rewards.reason);
        println!(
            "Default show interval: {} ms",
            settings.advertising.default_min_interval_ms
        );
    }

    Ok(())
}

/// Print the merged settings as canonical TOML.
pub fn show(file: PathBuf, verbose: bool) -> Result<(), CliError> {
    let (_settings, merged_toml) = load_and_merge_config(&file, verbose)?;
    print!("{}", merged_toml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("ad-mediation.toml");
        fs::write(&path, content).expect("should write test config");
        path
    }

    const VALID_CONFIG: &str = r#"
[mediation]
strategy = "highest_paying"
timeout_ms = 5000

[[mediation.providers]]
id = "primary"
priority = 1
weight = 70

[[mediation.providers]]
id = "secondary"
priority = 2
weight = 30

[providers.primary]
network = "mock"

[providers.secondary]
network = "mock"
"#;

    #[test]
    fn test_load_and_merge_config() {
        let dir = TempDir::new().expect("temp dir");
        let path = create_test_config(&dir, VALID_CONFIG);

        let (settings, merged) = load_and_merge_config(&path, false).expect("should load");
        assert_eq!(settings.mediation.timeout_ms, 5000);
        assert_eq!(settings.mediation.providers.len(), 2);
        assert!(merged.contains("strategy = \"highest_paying\""));
    }

    #[test]
    fn test_merged_toml_reloads_identically() {
        let dir = TempDir::new().expect("temp dir");
        let path = create_test_config(&dir, VALID_CONFIG);
        let (settings, merged) = load_and_merge_config(&path, false).expect("should load");

        let reloaded_path = create_test_config(&dir, &merged);
        let (reloaded, _) = load_and_merge_config(&reloaded_path, false).expect("should reload");
        assert_eq!(settings, reloaded);
    }

    #[test]
    fn test_validate_rejects_invalid_weight() {
        let dir = TempDir::new().expect("temp dir");
        let path = create_test_config(
            &dir,
            "[[mediation.providers]]\nid = \"heavy\"\npriority = 1\nweight = 500\n",
        );

        let result = validate(path, false);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_validate_missing_file_is_io_error() {
        let dir = TempDir::new().expect("temp dir");
        let result = validate(dir.path().join("missing.toml"), false);
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn test_show_valid_config() {
        let dir = TempDir::new().expect("temp dir");
        let path = create_test_config(&dir, VALID_CONFIG);
        assert!(show(path, false).is_ok());
    }
}
