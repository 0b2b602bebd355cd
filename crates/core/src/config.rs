use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Driver config ─────────────────────────────────────────────

/// Settings for the host loop that drives the scheduler's tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Fixed tick rate.
    pub ticks_per_second: u32,
    /// Number of ticks to run before stopping. 0 = run until killed.
    pub max_ticks: u64,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            ticks_per_second: 20,
            max_ticks: 200,
            log_filter: "info".to_string(),
        }
    }
}

impl DriverConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TICKWORK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TICKWORK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let defaults = Self::default();
        Self {
            profile: p.to_string(),
            ticks_per_second: profiled_env_u32(p, "TICKWORK_TPS", defaults.ticks_per_second)
                .max(1),
            max_ticks: profiled_env_u64(p, "TICKWORK_MAX_TICKS", defaults.max_ticks),
            log_filter: profiled_env_or(p, "TICKWORK_LOG", &defaults.log_filter),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Wall-clock length of one tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second.max(1)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Driver config loaded (profile: {}):", self.profile_label());
        tracing::info!("  tick rate:   {} tps ({:?}/tick)", self.ticks_per_second, self.tick_interval());
        tracing::info!(
            "  max ticks:   {}",
            if self.max_ticks == 0 { "unbounded".to_string() } else { self.max_ticks.to_string() }
        );
    }

    /// JSON view for status output.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "ticks_per_second": self.ticks_per_second,
            "max_ticks": self.max_ticks,
            "log_filter": self.log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = DriverConfig::default();
        assert_eq!(cfg.ticks_per_second, 20);
        assert_eq!(cfg.max_ticks, 200);
        assert_eq!(cfg.profile_label(), "default");
    }

    #[test]
    fn tick_interval_at_20_tps() {
        let cfg = DriverConfig::default();
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        // Keys unique to this test so parallel tests don't interfere.
        env::set_var("TWTEST_TICKWORK_MAX_TICKS", "77");
        env::set_var("TICKWORK_LOG", "debug");
        let cfg = DriverConfig::for_profile("twtest");
        assert_eq!(cfg.profile, "TWTEST");
        assert_eq!(cfg.max_ticks, 77);
        assert_eq!(cfg.log_filter, "debug");
        env::remove_var("TWTEST_TICKWORK_MAX_TICKS");
        env::remove_var("TICKWORK_LOG");
    }

    #[test]
    fn summary_has_rate() {
        let cfg = DriverConfig::default();
        let v = cfg.summary();
        assert_eq!(v["ticks_per_second"], 20);
        assert_eq!(v["profile"], "default");
    }
}
