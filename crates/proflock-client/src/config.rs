//! Coordinator configuration.
//!
//! Reads configuration from environment variables:
//! - `PROFLOCK_API_BASE`: backend base URL (default: "http://localhost:8080/api")
//! - `PROFLOCK_TOKEN`: optional bearer token
//! - `PROFLOCK_HARD_POLL_MS`: job-scoped poll period (default: 2000)
//! - `PROFLOCK_SOFT_POLL_MS`: global poll period during cooldown (default: 15000)
//! - `PROFLOCK_TICK_MS`: countdown tick period (default: 1000)
//! - `PROFLOCK_HTTP_TIMEOUT_MS`: per-request timeout (default: 10000)

use std::time::Duration;

use crate::error::ClientError;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

/// Periods of the three timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub hard_poll: Duration,
    pub soft_poll: Duration,
    pub countdown_tick: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Intervals {
            hard_poll: Duration::from_secs(2),
            soft_poll: Duration::from_secs(15),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub intervals: Intervals,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
            intervals: Intervals::default(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys fall back to
    /// defaults; set but unparsable durations are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let defaults = ClientConfig::default();

        let api_base = lookup("PROFLOCK_API_BASE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.api_base);
        let token = lookup("PROFLOCK_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let intervals = Intervals {
            hard_poll: millis(&lookup, "PROFLOCK_HARD_POLL_MS", defaults.intervals.hard_poll)?,
            soft_poll: millis(&lookup, "PROFLOCK_SOFT_POLL_MS", defaults.intervals.soft_poll)?,
            countdown_tick: millis(&lookup, "PROFLOCK_TICK_MS", defaults.intervals.countdown_tick)?,
        };
        let http_timeout = millis(&lookup, "PROFLOCK_HTTP_TIMEOUT_MS", defaults.http_timeout)?;

        Ok(ClientConfig {
            api_base,
            token,
            intervals,
            http_timeout,
        })
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ClientError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ClientError::Config(format!("{} must be positive", key))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(err) => Err(ClientError::Config(format!(
            "{} must be a number of milliseconds, got '{}': {}",
            key, raw, err
        ))),
    }
}
