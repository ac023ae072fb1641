//! Per-profile config schema (§4.6, §9 "from dynamic config dicts to an
//! enumerated schema"). Every setting is a named, typed field; anything
//! the running version doesn't recognise lands in `extra` and is written
//! back untouched, so newer profiles stay readable by older builds.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::http::DEFAULT_BASE_URL;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sync_interval() -> u32 {
    15
}

fn default_rate_limit() -> f64 {
    2.0
}

fn default_keepalive() -> u32 {
    60
}

fn default_history_cap() -> usize {
    crate::queue::DEFAULT_HISTORY_CAP
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Hex-encoded nonce||ciphertext produced by [`super::seal::seal`].
    /// Absent for a freshly created profile that has not yet been given
    /// a token.
    #[serde(default)]
    pub sealed_token: Option<String>,

    #[serde(default = "default_sync_interval")]
    pub sync_interval_minutes: u32,

    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Opaque passthrough; core never interprets this.
    #[serde(default)]
    pub theme: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub show_log_console: bool,

    #[serde(default)]
    pub show_multiline_records: bool,

    #[serde(default)]
    pub offline_mode: bool,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u32,

    #[serde(default)]
    pub queue_history_persist: bool,

    #[serde(default = "default_history_cap")]
    pub queue_history_cap: usize,

    #[serde(flatten)]
    pub extra: Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: default_base_url(),
            sealed_token: None,
            sync_interval_minutes: default_sync_interval(),
            rate_limit: default_rate_limit(),
            theme: String::new(),
            debug: false,
            show_log_console: false,
            show_multiline_records: false,
            offline_mode: false,
            keepalive_interval_secs: default_keepalive(),
            queue_history_persist: false,
            queue_history_cap: default_history_cap(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// §3: sync interval clamped to 1-60 minutes, rate limit to 0-10 req/s.
    pub fn clamp(&mut self) {
        self.sync_interval_minutes = self.sync_interval_minutes.clamp(1, 60);
        self.rate_limit = self.rate_limit.clamp(0.0, 10.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_round_trip() {
        let json = serde_json::json!({
            "base_url": "https://desec.io/api/v1",
            "sync_interval_minutes": 10,
            "rate_limit": 2.0,
            "theme": "dark",
            "debug": false,
            "show_log_console": false,
            "show_multiline_records": false,
            "offline_mode": false,
            "keepalive_interval_secs": 60,
            "queue_history_persist": false,
            "queue_history_cap": 5000,
            "a_future_setting_this_build_does_not_know_about": 42,
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(
            config.extra.get("a_future_setting_this_build_does_not_know_about"),
            Some(&serde_json::json!(42))
        );

        let round_tripped = serde_json::to_value(&config).unwrap();
        assert_eq!(
            round_tripped["a_future_setting_this_build_does_not_know_about"],
            serde_json::json!(42)
        );
    }

    #[test]
    fn clamp_enforces_bounds() {
        let mut config = Config {
            sync_interval_minutes: 0,
            rate_limit: 99.0,
            ..Config::default()
        };
        config.clamp();
        assert_eq!(config.sync_interval_minutes, 1);
        assert_eq!(config.rate_limit, 10.0);
    }
}
