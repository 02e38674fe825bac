use std::path::PathBuf;

use areamap_client::InteractionConfig;

pub const DEFAULT_STATS_LATENCY_MS: f64 = 30.0;
pub const DEFAULT_CHUNK_LATENCY_MS: f64 = 10.0;

fn env_millis(name: &str, fallback: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(fallback)
}

pub fn stats_latency_ms() -> f64 {
    env_millis("AREAMAP_STATS_LATENCY_MS", DEFAULT_STATS_LATENCY_MS)
}

/// Sleep on tokio timers instead of jumping a virtual clock.
pub fn realtime_enabled() -> bool {
    std::env::var("AREAMAP_REALTIME")
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(false)
}

pub fn scenario_path() -> Option<PathBuf> {
    std::env::var("AREAMAP_SCENARIO")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub interaction: InteractionConfig,
    pub realtime: bool,
    pub stats_latency_ms: f64,
    pub chunk_latency_ms: f64,
}

impl ReplayConfig {
    /// Environment overrides layered over `base` (usually the scenario's own config).
    pub fn from_env(base: InteractionConfig) -> Self {
        let interaction = InteractionConfig {
            dwell_ms: env_millis("AREAMAP_DWELL_MS", base.dwell_ms),
            leave_grace_ms: env_millis("AREAMAP_LEAVE_GRACE_MS", base.leave_grace_ms),
            preview_trailing_ms: env_millis("AREAMAP_PREVIEW_TRAILING_MS", base.preview_trailing_ms),
            echo_window_ms: env_millis("AREAMAP_ECHO_WINDOW_MS", base.echo_window_ms),
            ..base
        };
        Self {
            interaction,
            realtime: realtime_enabled(),
            stats_latency_ms: stats_latency_ms(),
            chunk_latency_ms: DEFAULT_CHUNK_LATENCY_MS,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interaction: InteractionConfig::default(),
            realtime: false,
            stats_latency_ms: DEFAULT_STATS_LATENCY_MS,
            chunk_latency_ms: DEFAULT_CHUNK_LATENCY_MS,
        }
    }
}
