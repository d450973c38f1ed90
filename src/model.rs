//! Core data model (spec §3): `ProbeResult` in, `Verdict`/`Decision` through
//! the pipeline, `MonitorState`/`Incident`/`RegionResult` as the state the
//! engine owns or enriches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four health states a monitor can be confirmed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Up,
    Degraded,
    Down,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Up => "up",
            HealthState::Degraded => "degraded",
            HealthState::Down => "down",
        }
    }
}

/// Raw SSL metadata a probe may attach (only meaningful for HTTPS/SSL
/// monitors). Produced by probe drivers — consumed here, never constructed
/// by the engine itself outside of tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SslInfo {
    /// Set when the certificate chain itself failed validation, using the
    /// raw codes probe drivers report (e.g. `CERT_HAS_EXPIRED`).
    pub error: Option<String>,
    /// Days remaining until expiry, when the chain validated but is aging.
    pub days_until_expiry: Option<i64>,
}

/// Free-form extras a probe driver may attach to a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeMeta {
    pub ssl_info: Option<SslInfo>,
    pub warning: Option<String>,
}

/// Output of a single protocol probe (spec §3). Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub is_up: bool,
    pub response_time_ms: u32,
    pub status_code: Option<u16>,
    /// Raw error code as reported by the probe driver (e.g. `TIMEOUT`,
    /// `ECONNREFUSED`). Mapped to `ErrorKind` by the classifier.
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub meta: ProbeMeta,
}

impl ProbeResult {
    pub fn error_kind(&self) -> Option<crate::error::ErrorKind> {
        self.error_code
            .as_deref()
            .map(crate::error::ErrorKind::from_probe_code)
    }
}

/// Classifier output, before hysteresis (spec §3/§4.1).
#[derive(Debug, Clone)]
pub struct Verdict {
    pub state: HealthState,
    /// In `[0, 1]`.
    pub severity: f64,
    pub reasons: Vec<String>,
    pub error_kind: Option<crate::error::ErrorKind>,
    pub is_slow_response: bool,
    /// True when the verdict statuscode/condition is fully healthy with no
    /// partial issues — used by the hysteresis engine's "fully up" checks.
    pub is_fully_up: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u32,
}

/// One entry in a `MonitorState`'s bounded transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Per-monitor state owned by the State Store (spec §3/§4.5).
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub current_state: HealthState,
    pub last_state_change: DateTime<Utc>,
    pub consecutive_count: u32,
    pub consecutive_slow_count: u32,
    pub transitions: std::collections::VecDeque<Transition>,
    pub created_at: DateTime<Utc>,
    /// The target state a pending (unconfirmed) transition is accumulating
    /// confirmations toward. `None` when the engine is stable or a
    /// transition was just confirmed. Not named directly in the spec's data
    /// model, but required to give `consecutiveCount` the exact semantics
    /// spec §4.4 describes ("count of consecutive proposals equal to
    /// target and differing from current confirmed state").
    pub pending_target: Option<HealthState>,
    /// Last tick this monitor was evaluated at, regardless of whether it
    /// produced a transition. Used to detect a gap exceeding
    /// `maxTimeForUnknownMs` (spec §6) and revert a stale monitor to
    /// `Unknown` rather than let it keep surfacing a confirmed state nobody
    /// has re-checked.
    pub last_check_at: DateTime<Utc>,
}

impl MonitorState {
    pub const TRANSITIONS_CAPACITY: usize = 10;

    pub fn new(now: DateTime<Utc>) -> Self {
        MonitorState {
            current_state: HealthState::Unknown,
            last_state_change: now,
            consecutive_count: 0,
            consecutive_slow_count: 0,
            transitions: std::collections::VecDeque::with_capacity(Self::TRANSITIONS_CAPACITY),
            created_at: now,
            pending_target: None,
            last_check_at: now,
        }
    }
}

/// A single historical check record, as supplied by the caller for baseline
/// and window analysis (spec §4.2/§4.3). The engine never persists these
/// itself — the caller (consumer of the persistence layer) supplies the
/// recent window on each call.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    pub state: HealthState,
    pub response_time_ms: u32,
    pub at: DateTime<Utc>,
}

/// Result of a single remote vantage's verification probe (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionResult {
    pub region: String,
    pub country: Option<String>,
    pub is_up: bool,
    pub response_time_ms: u32,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub at: DateTime<Utc>,
}

/// Severity bucket an incident is opened with (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentSeverity {
    Down,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Ongoing,
    Resolved,
}

/// A persisted incident record (spec §3). Owned conceptually by the
/// Incident Manager, physically by whatever `IncidentRepository` the host
/// application wires in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub monitor_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub severity: IncidentSeverity,
    pub error_kind: Option<crate::error::ErrorKind>,
    pub verifications: Vec<RegionResult>,
    pub status: IncidentStatus,
}

impl Incident {
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Output of the Hysteresis Engine (spec §4.4/§6): the engine's
/// caller-visible decision for this tick.
#[derive(Debug, Clone)]
pub struct Decision {
    pub final_state: HealthState,
    pub reasons: Vec<String>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub transition_reason: Option<String>,
    pub prevented_flapping: bool,
    /// Forwarded from the `Verdict` this tick produced, so the State Store
    /// can maintain `MonitorState::consecutive_slow_count` (spec §3) without
    /// decide() itself needing write access to monitor state.
    pub is_slow_response: bool,
    /// The pre-hysteresis target the classifier/window/baseline rules
    /// proposed this tick, before confirmation gating. Exposed so the State
    /// Store can distinguish a held-open grace period (`final_state` at the
    /// grace-surfaced state, `target` at what's being confirmed toward)
    /// from a genuinely stable tick (`target == final_state == current`).
    pub target: HealthState,
}

/// Aggregate verification classification (spec §4.6 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationClassification {
    GlobalOutage,
    PartialOutage,
    RoutingIssue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationSeverity {
    Critical,
    Warning,
    Info,
}

/// Result of running the Verification Orchestrator for one tick (spec §4.6).
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub monitor_id: String,
    pub results: Vec<RegionResult>,
    pub classification: VerificationClassification,
    pub severity: VerificationSeverity,
    pub success_count: usize,
    pub total_count: usize,
}

/// One entry published by the Event Publisher (spec §4.8):
/// `{ userId, monitorId, status, check? }`. `check_id` is the id of the
/// originating check record when the tick carries one; publishing events
/// has no dependency on that record existing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub user_id: Option<String>,
    pub monitor_id: String,
    pub status: HealthState,
    pub check_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// Statistics exposed by `getHealthStatistics` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatistics {
    pub current_state: HealthState,
    pub last_state_change: DateTime<Utc>,
    pub time_in_state_minutes: i64,
    pub consecutive_count: u32,
    pub total_state_changes: u32,
    pub uptime_score: f64,
}
