//! Top-level `Engine`: wires the Status Classifier, Baseline/Window
//! Analyzers, Hysteresis Engine, State Store, Verification Orchestrator,
//! Incident Manager and Event Publisher into the four operations exposed to
//! collaborators (spec §6). Plays the role the teacher's
//! `checker.rs::process_check_result` plays for a single SQLite-backed
//! service, generalized behind the trait seams the rest of this crate
//! defines.

use crate::baseline;
use crate::classifier;
use crate::config::{EngineConfig, MonitorPolicy};
use crate::events::EventTransport;
use crate::hysteresis;
use crate::incident::{self, IncidentRepository};
use crate::model::{CheckRecord, Decision, HealthEvent, HealthState, HealthStatistics, MonitorState, ProbeResult};
use crate::state_store::StateStore;
use crate::verification::VerificationOrchestrator;
use crate::window;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct Engine {
    config: EngineConfig,
    state_store: StateStore,
    verification: VerificationOrchestrator,
    incidents: Arc<dyn IncidentRepository>,
    events: Arc<dyn EventTransport>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        verification: VerificationOrchestrator,
        incidents: Arc<dyn IncidentRepository>,
        events: Arc<dyn EventTransport>,
    ) -> Self {
        Engine { config, state_store: StateStore::new(), verification, incidents, events }
    }

    /// `determineHealthState(probe, monitor, recentChecks) -> Decision`
    /// (spec §6). Runs the synchronous classify -> baseline/window ->
    /// hysteresis pipeline, commits the resulting state transition, and
    /// opens/resolves an incident when one is warranted — all without
    /// suspending on verification or event-stream I/O, which callers drive
    /// separately via `trigger_verification`.
    pub async fn determine_health_state(
        &self,
        probe: &ProbeResult,
        monitor: &MonitorPolicy,
        recent_checks: &[CheckRecord],
        now: DateTime<Utc>,
    ) -> Decision {
        self.state_store.reset_if_stale(&monitor.id, self.config.max_time_for_unknown_ms, now);

        let verdict = classifier::classify(probe, monitor, &self.config);
        let baseline = baseline::analyze_baseline(recent_checks, self.config.baseline_window_size);
        let window = window::analyze_window(
            recent_checks,
            self.config.check_window_size,
            self.config.degraded_threshold_ratio,
            self.config.min_checks_for_known_state,
        );

        let before = self.state_store.get_or_init(&monitor.id, now);
        let decision =
            hysteresis::decide(&verdict, baseline.as_ref(), window.as_ref(), &before, monitor, &self.config, now);
        let after = self.state_store.update_state_history(&monitor.id, &decision, now);

        if after.current_state != before.current_state {
            incident::handle_transition(
                self.incidents.as_ref(),
                &monitor.id,
                before.current_state,
                after.current_state,
                verdict.error_kind.clone(),
                now,
            )
            .await;
        }

        if decision.final_state != before.current_state {
            self.events
                .publish(HealthEvent {
                    user_id: None,
                    monitor_id: monitor.id.clone(),
                    status: decision.final_state,
                    check_id: None,
                    at: now,
                })
                .await;
        }

        decision
    }

    /// `clearStateHistory(monitorId)` (spec §6) — idempotent.
    pub fn clear_state_history(&self, monitor_id: &str, now: DateTime<Utc>) {
        self.state_store.clear_history(monitor_id, now);
    }

    /// Remove a monitor's state entirely, for use on monitor deletion
    /// (spec §5: "a monitor's deletion ... removes its MonitorState").
    pub fn remove_monitor(&self, monitor_id: &str) {
        self.state_store.remove(monitor_id);
    }

    /// `triggerVerification(monitor, probe, decision, checkId?)` (spec §6).
    /// Fans out to the verification providers, attaches results to the
    /// monitor's ongoing incident, and emits an alert event carrying the
    /// aggregate classification.
    pub async fn trigger_verification(
        &self,
        monitor: &MonitorPolicy,
        decision: &Decision,
        check_id: Option<String>,
    ) -> crate::model::VerificationOutcome {
        let outcome = self.verification.verify(monitor).await;

        let mut results = outcome.results.iter();
        if let Some(first) = results.next().cloned() {
            if let Some(incident) =
                incident::attach_verification_with_retry(self.incidents.as_ref(), &monitor.id, first).await
            {
                for remaining in results {
                    self.incidents.append_verification(&incident.id, remaining.clone()).await;
                }
            }
        }

        self.events
            .publish(HealthEvent {
                user_id: None,
                monitor_id: monitor.id.clone(),
                status: decision.final_state,
                check_id,
                at: Utc::now(),
            })
            .await;

        outcome
    }

    /// `getHealthStatistics(monitorId, timeRangeHours=24)` (spec §6).
    pub fn health_statistics(&self, monitor_id: &str, time_range_hours: i64, now: DateTime<Utc>) -> HealthStatistics {
        let state = self.state_store.get(monitor_id).unwrap_or_else(|| MonitorState::new(now));
        let window_start = now - Duration::hours(time_range_hours);

        HealthStatistics {
            current_state: state.current_state,
            last_state_change: state.last_state_change,
            time_in_state_minutes: (now - state.last_state_change).num_minutes().max(0),
            consecutive_count: state.consecutive_count,
            total_state_changes: state.transitions.iter().filter(|t| t.at >= window_start).count() as u32,
            uptime_score: uptime_score(&state, now, window_start),
        }
    }
}

/// Approximate uptime fraction over `[window_start, now]`, reconstructed
/// from the bounded transition log. When the log holds no transitions
/// (either genuinely none, or all evicted beyond the ring buffer's
/// capacity), falls back to treating the whole window as the current state
/// — the best available answer without a full persisted history.
fn uptime_score(state: &MonitorState, now: DateTime<Utc>, window_start: DateTime<Utc>) -> f64 {
    if state.transitions.is_empty() {
        return if state.current_state == HealthState::Up { 1.0 } else { 0.0 };
    }

    let mut segments: Vec<(DateTime<Utc>, DateTime<Utc>, HealthState)> = Vec::new();
    let mut cursor = window_start;
    let mut prev_state = state.transitions.front().unwrap().from;

    for t in &state.transitions {
        if t.at <= window_start {
            prev_state = t.to;
            continue;
        }
        if t.at > cursor {
            segments.push((cursor, t.at, prev_state));
        }
        prev_state = t.to;
        cursor = t.at;
    }
    segments.push((cursor, now, state.current_state));

    let total_ms: i64 = segments.iter().map(|(s, e, _)| (*e - *s).num_milliseconds().max(0)).sum();
    if total_ms <= 0 {
        return if state.current_state == HealthState::Up { 1.0 } else { 0.0 };
    }
    let up_ms: i64 = segments
        .iter()
        .filter(|(_, _, st)| *st == HealthState::Up)
        .map(|(s, e, _)| (*e - *s).num_milliseconds().max(0))
        .sum();
    up_ms as f64 / total_ms as f64
}
