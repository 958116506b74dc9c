//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::{LogFormat, PromptDuelError};

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Call once at
/// startup; a second call returns an error and leaves the first
/// subscriber in place.
pub fn init_tracing(format: LogFormat) -> Result<(), PromptDuelError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    result.map_err(|e| PromptDuelError::Config(format!("tracing subscriber: {e}")))
}
