//! Hysteresis Engine (spec §4.4): turns a tentative `Verdict`, plus baseline
//! and window context, into a confirmed `Decision`. Pure given `MonitorState`
//! — the only clock read is the `now` the caller passes in.

use crate::baseline::Baseline;
use crate::config::{EngineConfig, MonitorPolicy};
use crate::error::ErrorKind;
use crate::model::{Decision, HealthState, MonitorState, Verdict};
use crate::window::WindowAnalysis;
use chrono::{DateTime, Utc};

const FLAP_WINDOW_MINUTES: i64 = 10;
const FLAP_TRANSITION_THRESHOLD: usize = 4;

pub fn decide(
    verdict: &Verdict,
    baseline: Option<&Baseline>,
    window: Option<&WindowAnalysis>,
    state: &MonitorState,
    monitor: &MonitorPolicy,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Decision {
    use HealthState::*;

    // Rule 1: slow-but-successful 2xx is always surfaced as degraded,
    // bypassing hysteresis entirely — there's no "confirmation" to hold a
    // rate-limit-free slow success behind.
    if verdict.is_slow_response
        && verdict.state == Degraded
        && matches!(verdict.status_code, Some(c) if (200..300).contains(&c))
    {
        return Decision {
            final_state: Degraded,
            reasons: verdict.reasons.clone(),
            confidence: 1.0,
            transition_reason: None,
            prevented_flapping: false,
            is_slow_response: verdict.is_slow_response,
            target: Degraded,
        };
    }

    let target = compute_target(verdict, baseline, window);
    let decision = apply_hysteresis(verdict, target, state, monitor, config, now);
    apply_flap_suppression(decision, target, state, now)
}

/// Rules 2-6: the pre-hysteresis proposal, first rule to match wins.
fn compute_target(verdict: &Verdict, baseline: Option<&Baseline>, window: Option<&WindowAnalysis>) -> HealthState {
    use HealthState::*;

    if verdict.severity >= 0.9 {
        return Down;
    }
    if window.is_some_and(|w| w.should_be_down) && !verdict.is_fully_up {
        return Down;
    }
    if baseline.is_some_and(|b| !b.is_stable || b.reliability < 0.8) && !verdict.is_fully_up {
        return Degraded;
    }
    if !verdict.is_fully_up || window.is_some_and(|w| w.should_be_degraded) {
        return Degraded;
    }
    Up
}

fn apply_hysteresis(
    verdict: &Verdict,
    target: HealthState,
    state: &MonitorState,
    monitor: &MonitorPolicy,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Decision {
    use HealthState::*;

    let reasons = verdict.reasons.clone();

    if target == state.current_state {
        return Decision {
            final_state: target,
            reasons,
            confidence: 1.0,
            transition_reason: None,
            prevented_flapping: false,
            is_slow_response: verdict.is_slow_response,
            target,
        };
    }

    if state.current_state == Unknown {
        return Decision {
            final_state: target,
            reasons,
            confidence: 1.0,
            transition_reason: Some("Initial classification".to_string()),
            prevented_flapping: false,
            is_slow_response: verdict.is_slow_response,
            target,
        };
    }

    if matches!(verdict.error_kind, Some(ErrorKind::HttpRateLimit)) {
        return Decision {
            final_state: Degraded,
            reasons,
            confidence: 0.9,
            transition_reason: Some("Rate limit detected".to_string()),
            prevented_flapping: false,
            is_slow_response: verdict.is_slow_response,
            target,
        };
    }

    // Consecutive proposals toward this exact target, counting this tick.
    let count_so_far = if state.pending_target == Some(target) { state.consecutive_count } else { 0 };
    let prospective = count_so_far + 1;
    let threshold = monitor.alert_threshold.max(1);
    // Degradation confirms at whichever is stricter: the engine-wide default
    // or the monitor's own alert policy (spec §6: "overridden per-monitor by
    // alertThreshold").
    let degradation_threshold = threshold.min(config.consecutive_checks_for_degradation.max(1));

    let elapsed_ms = (now - state.last_state_change).num_milliseconds();
    let min_dwell_ms = monitor.min_time_in_state_ms / 2;

    match (state.current_state, target) {
        (Degraded, Down) | (Down, Degraded) if elapsed_ms < min_dwell_ms => Decision {
            final_state: state.current_state,
            reasons: vec!["Too soon after last transition".to_string()],
            confidence: 0.7,
            transition_reason: None,
            prevented_flapping: false,
            is_slow_response: verdict.is_slow_response,
            target,
        },

        (Up, Degraded) => {
            if prospective >= degradation_threshold {
                Decision {
                    final_state: Degraded,
                    reasons,
                    confidence: 1.0,
                    transition_reason: Some(format!("Degradation confirmed ({prospective}/{degradation_threshold})")),
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            } else {
                Decision {
                    final_state: Degraded,
                    reasons: vec![format!(
                        "Potential degradation, awaiting confirmation ({prospective}/{degradation_threshold})"
                    )],
                    confidence: 0.5,
                    transition_reason: None,
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            }
        }

        (Up, Down) => {
            if prospective >= threshold {
                Decision {
                    final_state: Down,
                    reasons,
                    confidence: 1.0,
                    transition_reason: Some(format!("Service failure confirmed ({prospective}/{threshold})")),
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            } else {
                Decision {
                    final_state: Degraded,
                    reasons: vec![format!("Service glitch detected, awaiting confirmation ({prospective}/{threshold})")],
                    confidence: 0.5,
                    transition_reason: None,
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            }
        }

        (Degraded, Down) => {
            if prospective >= threshold {
                Decision {
                    final_state: Down,
                    reasons,
                    confidence: 1.0,
                    transition_reason: Some(format!("Outage confirmed ({prospective}/{threshold})")),
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            } else {
                Decision {
                    final_state: Degraded,
                    reasons: vec![format!("Possible outage, awaiting confirmation ({prospective}/{threshold})")],
                    confidence: 0.5,
                    transition_reason: None,
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            }
        }

        (Down, Degraded) => {
            // Not gated by a rule of its own — an improvement signal from a
            // full outage is allowed through once the dwell guard above
            // passes, matching the "otherwise: allow" fallback.
            Decision {
                final_state: Degraded,
                reasons,
                confidence: 0.8,
                transition_reason: Some("Partial recovery".to_string()),
                prevented_flapping: false,
                is_slow_response: verdict.is_slow_response,
                target,
            }
        }

        (Down, Up) | (Degraded, Up) => {
            let fast_track = verdict.is_fully_up
                && (verdict.response_time_ms as f64) < 0.8 * monitor.expected_response_time_ms as f64;
            if fast_track {
                Decision {
                    final_state: Up,
                    reasons,
                    confidence: 1.0,
                    transition_reason: Some("Fast-track recovery".to_string()),
                    prevented_flapping: false,
                    is_slow_response: verdict.is_slow_response,
                    target,
                }
            } else {
                let needed = monitor.consecutive_checks_for_recovery.max(1);
                if prospective >= needed {
                    Decision {
                        final_state: Up,
                        reasons,
                        confidence: 1.0,
                        transition_reason: Some(format!("Recovery confirmed ({prospective}/{needed})")),
                        prevented_flapping: false,
                        is_slow_response: verdict.is_slow_response,
                        target,
                    }
                } else {
                    Decision {
                        final_state: state.current_state,
                        reasons: vec![format!("Recovery awaiting confirmation ({prospective}/{needed})")],
                        confidence: 0.5,
                        transition_reason: None,
                        prevented_flapping: false,
                        is_slow_response: verdict.is_slow_response,
                        target,
                    }
                }
            }
        }

        _ => Decision {
            final_state: target,
            reasons,
            confidence: 1.0,
            transition_reason: Some("Transition allowed".to_string()),
            prevented_flapping: false,
            is_slow_response: verdict.is_slow_response,
            target,
        },
    }
}

/// Flap suppression: evaluated against the raw proposal vs the currently
/// confirmed state, not against what hysteresis decided to surface — a
/// confirmed transition can still be capped back down to degraded.
fn apply_flap_suppression(
    mut decision: Decision,
    target: HealthState,
    state: &MonitorState,
    now: DateTime<Utc>,
) -> Decision {
    if target == state.current_state {
        return decision;
    }
    let recent_transitions = state
        .transitions
        .iter()
        .filter(|t| (now - t.at).num_minutes() < FLAP_WINDOW_MINUTES)
        .count();
    if recent_transitions >= FLAP_TRANSITION_THRESHOLD {
        decision.final_state = HealthState::Degraded;
        decision.prevented_flapping = true;
        decision.confidence = decision.confidence.min(0.5);
        decision.transition_reason = Some("Flap suppression: forced degraded".to_string());
        decision.reasons.push("Rapid state changes detected, holding at degraded".to_string());
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolKind;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn policy() -> MonitorPolicy {
        MonitorPolicy {
            id: "m1".into(),
            target: "https://example.com".into(),
            protocol: ProtocolKind::Http,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            alert_threshold: 2,
            degraded_threshold_ms: None,
            ssl_expiry_threshold_days: 30,
            expected_status_code: None,
            is_active: true,
            expected_response_time_ms: 1000,
            consecutive_checks_for_recovery: 1,
            min_time_in_state_ms: 30_000,
        }
    }

    fn verdict_down(reason: &str) -> Verdict {
        Verdict {
            state: HealthState::Down,
            severity: 0.9,
            reasons: vec![reason.to_string()],
            error_kind: Some(ErrorKind::HttpClientError { status: 404 }),
            is_slow_response: false,
            is_fully_up: false,
            status_code: Some(404),
            response_time_ms: 100,
        }
    }

    fn verdict_up() -> Verdict {
        Verdict {
            state: HealthState::Up,
            severity: 0.0,
            reasons: vec!["Response within normal parameters".to_string()],
            error_kind: None,
            is_slow_response: false,
            is_fully_up: true,
            status_code: Some(200),
            response_time_ms: 100,
        }
    }

    fn verdict_rate_limited() -> Verdict {
        Verdict {
            state: HealthState::Degraded,
            severity: 0.6,
            reasons: vec!["Rate Limit exceeded (HTTP 429)".to_string()],
            error_kind: Some(ErrorKind::HttpRateLimit),
            is_slow_response: true,
            is_fully_up: false,
            status_code: Some(429),
            response_time_ms: 100,
        }
    }

    fn up_state(now: DateTime<Utc>) -> MonitorState {
        MonitorState {
            current_state: HealthState::Up,
            last_state_change: now - chrono::Duration::minutes(30),
            consecutive_count: 5,
            consecutive_slow_count: 0,
            transitions: VecDeque::new(),
            created_at: now - chrono::Duration::hours(1),
            pending_target: None,
            last_check_at: now,
        }
    }

    #[test]
    fn http_404_threshold_3_awaits_then_confirms_down() {
        let mut policy = policy();
        policy.alert_threshold = 3;
        let now = Utc::now();
        let mut state = up_state(now);

        let v = verdict_down("Client error: HTTP 404");

        // Tick 1: up -> degraded (glitch) while awaiting confirmation.
        let d1 = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d1.final_state, HealthState::Degraded);
        assert_eq!(d1.target, HealthState::Down);
        state.pending_target = Some(HealthState::Down);
        state.consecutive_count = 1;

        // Tick 2: still awaiting.
        let d2 = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d2.final_state, HealthState::Degraded);
        state.consecutive_count = 2;

        // Tick 3: confirmed down.
        let d3 = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d3.final_state, HealthState::Down);
    }

    #[test]
    fn tcp_refused_threshold_2_confirms_down_then_recovers() {
        let policy = policy();
        let now = Utc::now();
        let mut state = up_state(now);
        let v = Verdict {
            state: HealthState::Down,
            severity: 0.95,
            reasons: vec!["Connection refused".to_string()],
            error_kind: Some(ErrorKind::ConnectionRefused),
            is_slow_response: false,
            is_fully_up: false,
            status_code: None,
            response_time_ms: 50,
        };

        let d1 = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d1.final_state, HealthState::Degraded);
        state.pending_target = Some(HealthState::Down);
        state.consecutive_count = 1;

        let d2 = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d2.final_state, HealthState::Down);

        // Confirmed down, now recovering.
        state.current_state = HealthState::Down;
        state.last_state_change = now - chrono::Duration::minutes(5);
        state.consecutive_count = 1;
        state.pending_target = None;

        let up = verdict_up();
        let recovered = decide(&up, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(recovered.final_state, HealthState::Up);
    }

    #[test]
    fn rate_limit_forces_degraded_without_confirmation() {
        let policy = policy();
        let now = Utc::now();
        let state = up_state(now);
        let v = verdict_rate_limited();

        let d = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.final_state, HealthState::Degraded);
        assert!(d.reasons.iter().any(|r| r.contains("Rate Limit")));
    }

    #[test]
    fn initial_unknown_state_allows_immediate_transition() {
        let policy = policy();
        let now = Utc::now();
        let state = MonitorState::new(now);
        let v = verdict_up();

        let d = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.final_state, HealthState::Up);
        assert_eq!(d.transition_reason.as_deref(), Some("Initial classification"));
    }

    #[test]
    fn same_state_proposal_is_a_noop() {
        let policy = policy();
        let now = Utc::now();
        let state = up_state(now);
        let v = verdict_up();

        let d = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.final_state, HealthState::Up);
        assert_eq!(d.confidence, 1.0);
        assert!(d.transition_reason.is_none());
    }

    #[test]
    fn fast_track_recovery_bypasses_confirmation() {
        let mut policy = policy();
        policy.consecutive_checks_for_recovery = 3;
        policy.expected_response_time_ms = 1000;
        let now = Utc::now();
        let mut state = up_state(now);
        state.current_state = HealthState::Down;
        state.last_state_change = now - chrono::Duration::minutes(5);

        let mut v = verdict_up();
        v.response_time_ms = 200; // well under 0.8 * 1000

        let d = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.final_state, HealthState::Up);
        assert_eq!(d.transition_reason.as_deref(), Some("Fast-track recovery"));
    }

    #[test]
    fn degraded_down_hop_blocked_within_min_dwell() {
        let policy = policy();
        let now = Utc::now();
        let mut state = up_state(now);
        state.current_state = HealthState::Degraded;
        state.last_state_change = now - chrono::Duration::seconds(5);

        let v = verdict_down("Client error: HTTP 404");
        let d = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.final_state, HealthState::Degraded);
        assert!(d.reasons.iter().any(|r| r.contains("Too soon")));
    }

    #[test]
    fn flap_suppression_forces_degraded_on_confirmed_down() {
        let mut policy = policy();
        policy.alert_threshold = 1;
        let now = Utc::now();
        let mut state = up_state(now);
        for i in 0..4 {
            state.transitions.push_back(crate::model::Transition {
                from: HealthState::Up,
                to: HealthState::Down,
                at: now - chrono::Duration::minutes(i),
                reason: "flap".to_string(),
            });
        }

        let v = verdict_down("Client error: HTTP 404");
        let d = decide(&v, None, None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.final_state, HealthState::Degraded);
        assert!(d.prevented_flapping);
    }

    #[test]
    fn up_to_degraded_grace_period_surfaces_degraded_not_up() {
        let mut policy = policy();
        policy.alert_threshold = 3;
        let now = Utc::now();
        let state = up_state(now);

        let mut v = verdict_up();
        v.is_fully_up = false;
        v.severity = 0.3;
        let baseline = Baseline {
            mean_response_ms: 400.0,
            variance: 0.0,
            std_dev: 0.0,
            reliability: 0.5,
            is_stable: false,
            trend: crate::baseline::Trend::Stable,
            sample_count: 5,
        };

        let d = decide(&v, Some(&baseline), None, &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.target, HealthState::Degraded);
        assert_eq!(d.final_state, HealthState::Degraded);
        assert!(d.reasons.iter().any(|r| r.contains("awaiting confirmation")));
    }

    #[test]
    fn window_confirmed_down_overrides_low_severity_verdict() {
        let policy = policy();
        let now = Utc::now();
        let state = up_state(now);
        let mut v = verdict_up();
        v.is_fully_up = false;
        v.severity = 0.2;
        let window = WindowAnalysis {
            failure_rate: 0.8,
            degradation_rate: 0.0,
            pattern: crate::window::Pattern::ConsistentlyDown,
            should_be_down: true,
            should_be_degraded: false,
        };

        let d = decide(&v, None, Some(&window), &state, &policy, &EngineConfig::default(), now);
        assert_eq!(d.target, HealthState::Down);
    }
}
