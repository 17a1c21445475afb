//! Hash computation for settings files.

use std::fs;
use std::path::{Path, PathBuf};

use ad_mediation_common::config_store::compute_settings_hash;

use crate::config::load_and_merge_config;
use crate::error::CliError;
use crate::OutputFormat;

/// Compute SHA-256 hash of a settings file as written.
pub fn compute_file_hash(path: &Path) -> Result<String, CliError> {
    let content = fs::read_to_string(path)?;
    Ok(compute_settings_hash(&content))
}

/// Compute and display the hash of a settings file.
///
/// Unless `raw`, the hash covers the merged settings so that two files which
/// differ only in defaults hash the same.
pub fn compute_and_display(
    path: PathBuf,
    format: OutputFormat,
    raw: bool,
    verbose: bool,
) -> Result<(), CliError> {
    let hash = if raw {
        compute_file_hash(&path)?
    } else {
        let (_settings, merged_toml) = load_and_merge_config(&path, verbose)?;
        compute_settings_hash(&merged_toml)
    };

    match format {
        OutputFormat::Text => {
            println!("{}", hash);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": path.display().to_string(),
                "hash": hash,
                "algorithm": "sha256",
                "raw": raw,
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| CliError::Config(format!("Failed to render JSON: {e}")))?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_merged_hash_ignores_explicit_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let minimal = dir.path().join("minimal.toml");
        let explicit = dir.path().join("explicit.toml");
        fs::write(&minimal, "[mediation]\nstrategy = \"smart\"\n").expect("write");
        fs::write(
            &explicit,
            "[mediation]\nstrategy = \"smart\"\ntimeout_ms = 10000\n\n[rewards]\ncoin_amount = 10\n",
        )
        .expect("write");

        let (_, minimal_toml) = load_and_merge_config(&minimal, false).expect("minimal");
        let (_, explicit_toml) = load_and_merge_config(&explicit, false).expect("explicit");
        assert_eq!(
            compute_settings_hash(&minimal_toml),
            compute_settings_hash(&explicit_toml)
        );
        assert_ne!(
            compute_file_hash(&minimal).expect("raw hash"),
            compute_file_hash(&explicit).expect("raw hash")
        );
    }

    #[test]
    fn test_compute_and_display_json() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("settings.toml");
        fs::write(&path, "").expect("write");
        assert!(compute_and_display(path, OutputFormat::Json, false, false).is_ok());
    }
}
