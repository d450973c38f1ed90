//! Engine-wide and per-monitor configuration (spec §6).
//!
//! Mirrors the teacher's per-field-default style in `src/models.rs`
//! (`CreateMonitor`'s `#[serde(default = "...")]` functions) and its
//! env-var tunables in `checker.rs` (`retention_days`, `probe_stale_minutes`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol kind a monitor targets (spec §1/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Http,
    Https,
    Tcp,
    Udp,
    Dns,
    Smtp,
    Ssl,
    Ping,
}

impl ProtocolKind {
    /// Protocol-default slow threshold in ms, used when a monitor doesn't
    /// set `degraded_threshold_ms` (classifier `slowThreshold`, spec §4.1).
    pub fn default_slow_threshold_ms(&self) -> u32 {
        match self {
            ProtocolKind::Http => 5000,
            ProtocolKind::Https => 5000,
            ProtocolKind::Ping => 1500,
            ProtocolKind::Tcp => 3000,
            ProtocolKind::Udp => 3000,
            ProtocolKind::Dns => 2000,
            ProtocolKind::Smtp => 3000,
            ProtocolKind::Ssl => 3000,
        }
    }
}

/// Per-monitor policy (spec §3 `Monitor`, plus the supplemented overrides
/// named throughout §4 so callers don't thread them separately).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorPolicy {
    pub id: String,
    pub target: String,
    pub protocol: ProtocolKind,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive confirming proposals required before a state change is
    /// confirmed (spec §3 `alertThreshold`, default 2).
    pub alert_threshold: u32,
    pub degraded_threshold_ms: Option<u32>,
    pub ssl_expiry_threshold_days: i64,
    pub expected_status_code: Option<u16>,
    pub is_active: bool,

    /// Fast-track recovery baseline latency (spec §4.4 "Fast-track
    /// recovery"), default 1000 ms.
    pub expected_response_time_ms: u32,
    /// Confirmations required for `down|degraded -> up` outside the
    /// fast-track path, default 1.
    pub consecutive_checks_for_recovery: u32,
    /// Minimum dwell time in a state before a `degraded <-> down` hop is
    /// allowed, default 30_000 ms (half of this is the actual guard, per
    /// spec §4.4).
    pub min_time_in_state_ms: i64,
}

impl MonitorPolicy {
    pub fn slow_threshold_ms(&self) -> u32 {
        match self.degraded_threshold_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.protocol.default_slow_threshold_ms(),
        }
    }
}

/// Engine-wide tunables (spec §6, enumerated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub check_window_size: usize,
    pub degraded_threshold_ratio: f64,
    pub baseline_window_size: usize,
    pub min_time_in_state_ms: i64,
    pub consecutive_checks_for_recovery: u32,
    pub consecutive_checks_for_degradation: u32,
    pub min_checks_for_known_state: usize,
    pub max_time_for_unknown_ms: i64,
    pub verification_cache_ttl_ms: i64,
    pub verification_concurrency: usize,
    pub verification_inter_slot_ms: u64,
    pub ssl_warning_weight: f64,
    pub slow_response_weight: f64,
    pub content_mismatch_weight: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            check_window_size: 5,
            degraded_threshold_ratio: 0.6,
            baseline_window_size: 24,
            min_time_in_state_ms: 30_000,
            consecutive_checks_for_recovery: 1,
            consecutive_checks_for_degradation: 2,
            min_checks_for_known_state: 3,
            max_time_for_unknown_ms: 300_000,
            verification_cache_ttl_ms: 120_000,
            verification_concurrency: 3,
            verification_inter_slot_ms: 2500,
            ssl_warning_weight: 0.3,
            slow_response_weight: 0.4,
            content_mismatch_weight: 0.5,
        }
    }
}

impl EngineConfig {
    /// Overlay environment-variable overrides onto the defaults, the way
    /// `checker.rs::retention_days`/`probe_stale_minutes` read single env
    /// vars with a fallback. Unset or unparsable vars are left at default.
    pub fn from_env() -> Self {
        let mut cfg = EngineConfig::default();
        if let Some(v) = env_usize("UPTIME_ENGINE_CHECK_WINDOW_SIZE") {
            cfg.check_window_size = v;
        }
        if let Some(v) = env_usize("UPTIME_ENGINE_BASELINE_WINDOW_SIZE") {
            cfg.baseline_window_size = v;
        }
        if let Some(v) = env_i64("UPTIME_ENGINE_MIN_TIME_IN_STATE_MS") {
            cfg.min_time_in_state_ms = v;
        }
        if let Some(v) = env_i64("UPTIME_ENGINE_VERIFICATION_CACHE_TTL_MS") {
            cfg.verification_cache_ttl_ms = v;
        }
        if let Some(v) = env_usize("UPTIME_ENGINE_VERIFICATION_CONCURRENCY") {
            cfg.verification_concurrency = v;
        }
        cfg
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
