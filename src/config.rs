//! Runtime configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

pub const DEFAULT_MOCK_LATENCY_MS: u64 = 500;
pub const DEFAULT_STORAGE_PATH: &str = ".buedi/session.json";
pub const DEFAULT_NOTIFICATION_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_NOTIFICATION_PUSH_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct BuediConfig {
    /// Artificial delay applied to every mock identity call.
    pub mock_latency: Duration,
    /// File backing the durable session keys.
    pub storage_path: PathBuf,
    /// Tick period of the simulated notification push.
    pub notification_interval: Duration,
    /// Chance that a tick yields a new notification, in `[0, 1]`.
    pub notification_push_probability: f64,
}

impl Default for BuediConfig {
    fn default() -> Self {
        Self {
            mock_latency: Duration::from_millis(DEFAULT_MOCK_LATENCY_MS),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            notification_interval: Duration::from_secs(DEFAULT_NOTIFICATION_INTERVAL_SECS),
            notification_push_probability: DEFAULT_NOTIFICATION_PUSH_PROBABILITY,
        }
    }
}

impl BuediConfig {
    /// Build config from environment variables. Unset or unparsable values
    /// fall back to the defaults.
    ///
    /// - `BUEDI_MOCK_LATENCY_MS`: default 500
    /// - `BUEDI_STORAGE_PATH`: default `.buedi/session.json`
    /// - `BUEDI_NOTIFICATION_INTERVAL_SECS`: default 30
    /// - `BUEDI_NOTIFICATION_PUSH_PROBABILITY`: default 0.3, clamped to `[0, 1]`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let latency_ms = parse_or(&lookup, "BUEDI_MOCK_LATENCY_MS", DEFAULT_MOCK_LATENCY_MS);
        let interval_secs = parse_or(&lookup, "BUEDI_NOTIFICATION_INTERVAL_SECS", DEFAULT_NOTIFICATION_INTERVAL_SECS);
        let probability = parse_or(
            &lookup,
            "BUEDI_NOTIFICATION_PUSH_PROBABILITY",
            DEFAULT_NOTIFICATION_PUSH_PROBABILITY,
        );
        let storage_path = lookup("BUEDI_STORAGE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH), PathBuf::from);

        Self {
            mock_latency: Duration::from_millis(latency_ms),
            storage_path,
            notification_interval: Duration::from_secs(interval_secs.max(1)),
            notification_push_probability: if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 },
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
