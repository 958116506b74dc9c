//! Server configuration assembled from defaults and `PROMPTDUEL_*`
//! environment variables.
//!
//! | Variable | Field | Unit |
//! |----------|-------|------|
//! | `PROMPTDUEL_MAX_RETRIES` | `engine.max_retries` | attempts |
//! | `PROMPTDUEL_DUEL_DURATION_SECS` | `engine.duel_duration` | seconds |
//! | `PROMPTDUEL_LOBBY_TIMEOUT_SECS` | `engine.lobby_timeout` | seconds |
//! | `PROMPTDUEL_ARCHIVE_RETENTION_SECS` | `engine.archive_retention` | seconds |
//! | `PROMPTDUEL_RECONNECT_GRACE_SECS` | `session.reconnect_grace_secs` | seconds |
//! | `PROMPTDUEL_SWEEP_INTERVAL_MS` | `sweep.interval` | milliseconds, 0 disables |
//! | `PROMPTDUEL_EVENT_BUFFER` | `event_buffer` | events per room |
//! | `PROMPTDUEL_LOG_FORMAT` | `log_format` | `pretty` or `json` |

use std::str::FromStr;
use std::time::Duration;

use promptduel_room::EngineConfig;
use promptduel_session::SessionConfig;
use promptduel_sweep::SweepConfig;
use serde::{Deserialize, Serialize};

use crate::PromptDuelError;

/// How [`init_tracing`](crate::init_tracing) formats log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for local runs.
    #[default]
    Pretty,
    /// One JSON object per line, for log shipping.
    Json,
}

impl FromStr for LogFormat {
    type Err = PromptDuelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(PromptDuelError::Config(format!(
                "unknown log format {other:?}, expected pretty or json"
            ))),
        }
    }
}

/// Everything a [`DuelServer`](crate::DuelServer) needs besides its store,
/// bank and authenticator.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub sweep: SweepConfig,
    /// Capacity of each room's event channel. Subscribers that fall
    /// further behind miss events and must re-fetch the room.
    pub event_buffer: usize,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            session: SessionConfig::default(),
            sweep: SweepConfig::default(),
            event_buffer: 64,
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by whatever `PROMPTDUEL_*` variables are set.
    ///
    /// # Errors
    /// [`PromptDuelError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, PromptDuelError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PromptDuelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parsed::<u32, _>(&lookup, "PROMPTDUEL_MAX_RETRIES")? {
            if v == 0 {
                return Err(PromptDuelError::Config(
                    "PROMPTDUEL_MAX_RETRIES must be at least 1".into(),
                ));
            }
            config.engine.max_retries = v;
        }
        if let Some(v) = parsed::<u64, _>(&lookup, "PROMPTDUEL_DUEL_DURATION_SECS")? {
            config.engine.duel_duration = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<u64, _>(&lookup, "PROMPTDUEL_LOBBY_TIMEOUT_SECS")? {
            config.engine.lobby_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<u64, _>(&lookup, "PROMPTDUEL_ARCHIVE_RETENTION_SECS")? {
            config.engine.archive_retention = Duration::from_secs(v);
        }
        if let Some(v) = parsed(&lookup, "PROMPTDUEL_RECONNECT_GRACE_SECS")? {
            config.session.reconnect_grace_secs = v;
        }
        if let Some(v) = parsed::<u64, _>(&lookup, "PROMPTDUEL_SWEEP_INTERVAL_MS")? {
            config.sweep.interval = Duration::from_millis(v);
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "PROMPTDUEL_EVENT_BUFFER")? {
            if v == 0 {
                return Err(PromptDuelError::Config(
                    "PROMPTDUEL_EVENT_BUFFER must be at least 1".into(),
                ));
            }
            config.event_buffer = v;
        }
        if let Some(v) = parsed(&lookup, "PROMPTDUEL_LOG_FORMAT")? {
            config.log_format = v;
        }

        Ok(config)
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>, PromptDuelError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| PromptDuelError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
