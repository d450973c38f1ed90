//! Window Analyzer (spec §4.3): weighted failure/degradation rate over the
//! last `W = min(5, history.len())` checks, recency-weighted.

use crate::model::{CheckRecord, HealthState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    ConsistentlyDown,
    ConsistentlyUp,
    Flapping,
    DegradedPattern,
    Stable,
}

#[derive(Debug, Clone)]
pub struct WindowAnalysis {
    pub failure_rate: f64,
    pub degradation_rate: f64,
    pub pattern: Pattern,
    pub should_be_down: bool,
    pub should_be_degraded: bool,
}

const RECENCY_DECAY: f64 = 0.8;

/// `should_be_degraded`'s thresholds aren't named by any engine-wide config
/// field (only `should_be_down`'s maps onto `degradedThresholdRatio`), so
/// they stay as spec-literal constants.
const DEGRADATION_RATE_THRESHOLD: f64 = 0.3;
const DEGRADED_FAILURE_RATE_THRESHOLD: f64 = 0.2;

/// `min_sample_size` gates the analysis the way `minChecksForKnownState`
/// governs confidence in a monitor's state elsewhere in the engine (spec
/// §6): fewer than that many recent checks isn't enough history to call a
/// pattern, regardless of how big `window_size` is.
pub fn analyze_window(
    history: &[CheckRecord],
    window_size: usize,
    degraded_threshold_ratio: f64,
    min_sample_size: usize,
) -> Option<WindowAnalysis> {
    if history.len() < min_sample_size.max(1) {
        return None;
    }
    let w = history.len().min(window_size);
    if w == 0 {
        return None;
    }
    let window = &history[history.len() - w..];

    let mut failure_weight = 0.0;
    let mut degradation_weight = 0.0;
    let mut weight_sum = 0.0;

    for (i, rec) in window.iter().enumerate() {
        let weight = RECENCY_DECAY.powi((w - 1 - i) as i32);
        weight_sum += weight;
        match rec.state {
            HealthState::Down => failure_weight += weight,
            HealthState::Degraded => degradation_weight += weight * 0.5,
            HealthState::Up => failure_weight -= 0.1 * weight,
            HealthState::Unknown => {}
        }
    }

    let failure_rate = (failure_weight / weight_sum).max(0.0);
    let degradation_rate = (degradation_weight / weight_sum).max(0.0);

    let pattern = compute_pattern(window);

    Some(WindowAnalysis {
        failure_rate,
        degradation_rate,
        pattern,
        should_be_down: failure_rate >= degraded_threshold_ratio,
        should_be_degraded: degradation_rate >= DEGRADATION_RATE_THRESHOLD || failure_rate >= DEGRADED_FAILURE_RATE_THRESHOLD,
    })
}

fn compute_pattern(window: &[CheckRecord]) -> Pattern {
    let last3_start = window.len().saturating_sub(3);
    let last3 = &window[last3_start..];

    let all_down = last3.iter().all(|c| c.state == HealthState::Down);
    if all_down {
        return Pattern::ConsistentlyDown;
    }
    let all_up = last3.iter().all(|c| c.state == HealthState::Up);
    if all_up {
        return Pattern::ConsistentlyUp;
    }
    let has_up = last3.iter().any(|c| c.state == HealthState::Up);
    let has_down = last3.iter().any(|c| c.state == HealthState::Down);
    if has_up && has_down {
        return Pattern::Flapping;
    }
    let has_degraded = last3.iter().any(|c| c.state == HealthState::Degraded);
    if has_degraded {
        return Pattern::DegradedPattern;
    }
    Pattern::Stable
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(state: HealthState) -> CheckRecord {
        CheckRecord { state, response_time_ms: 100, at: Utc::now() }
    }

    #[test]
    fn empty_history_yields_none() {
        assert!(analyze_window(&[], 5, 0.6, 3).is_none());
    }

    #[test]
    fn all_down_is_consistently_down_and_should_be_down() {
        let history: Vec<_> = (0..5).map(|_| rec(HealthState::Down)).collect();
        let w = analyze_window(&history, 5, 0.6, 3).unwrap();
        assert_eq!(w.pattern, Pattern::ConsistentlyDown);
        assert!(w.should_be_down);
    }

    #[test]
    fn all_up_is_consistently_up_and_not_down() {
        let history: Vec<_> = (0..5).map(|_| rec(HealthState::Up)).collect();
        let w = analyze_window(&history, 5, 0.6, 3).unwrap();
        assert_eq!(w.pattern, Pattern::ConsistentlyUp);
        assert!(!w.should_be_down);
        assert!(!w.should_be_degraded);
    }

    #[test]
    fn mixed_up_down_is_flapping() {
        let history = vec![
            rec(HealthState::Up),
            rec(HealthState::Down),
            rec(HealthState::Up),
        ];
        let w = analyze_window(&history, 5, 0.6, 3).unwrap();
        assert_eq!(w.pattern, Pattern::Flapping);
    }

    #[test]
    fn degraded_present_is_degraded_pattern() {
        let history = vec![
            rec(HealthState::Up),
            rec(HealthState::Degraded),
            rec(HealthState::Up),
        ];
        let w = analyze_window(&history, 5, 0.6, 3).unwrap();
        assert_eq!(w.pattern, Pattern::DegradedPattern);
    }

    #[test]
    fn only_last_five_considered() {
        let mut history: Vec<_> = (0..20).map(|_| rec(HealthState::Down)).collect();
        history.extend((0..5).map(|_| rec(HealthState::Up)));
        let w = analyze_window(&history, 5, 0.6, 3).unwrap();
        assert_eq!(w.pattern, Pattern::ConsistentlyUp);
    }
}
