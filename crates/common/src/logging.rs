use log::LevelFilter;

use crate::error::MediationError;
use error_stack::{Report, ResultExt};

/// Install the process logger writing timestamped lines to stderr.
/// Should be called once at the start of main().
///
/// # Errors
///
/// Returns [`MediationError::Configuration`] when a logger is already installed.
pub fn init_logging(level: LevelFilter) -> Result<(), Report<MediationError>> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .change_context(MediationError::Configuration {
            message: "Failed to initialize logger".to_string(),
        })
}
