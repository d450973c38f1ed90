//! Baseline Analyzer (spec §4.2): rolling response-time statistics and
//! reliability over the most recent successful checks.

use crate::model::{CheckRecord, HealthState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone)]
pub struct Baseline {
    pub mean_response_ms: f64,
    pub variance: f64,
    pub std_dev: f64,
    /// Fraction of checks in the window whose state was `up`.
    pub reliability: f64,
    pub is_stable: bool,
    pub trend: Trend,
    pub sample_count: usize,
}

/// Compute the baseline over `history`, using at most `window_size` of the
/// most recent records. Returns `None` if fewer than 3 successful samples
/// are available (spec: "Requires ≥ 3 samples to produce a baseline").
pub fn analyze_baseline(history: &[CheckRecord], window_size: usize) -> Option<Baseline> {
    let window_start = history.len().saturating_sub(window_size);
    let window = &history[window_start..];
    if window.is_empty() {
        return None;
    }

    let successful: Vec<&CheckRecord> = window
        .iter()
        .filter(|c| c.state == HealthState::Up)
        .collect();
    if successful.len() < 3 {
        return None;
    }

    let n = successful.len() as f64;
    let mean = successful.iter().map(|c| c.response_time_ms as f64).sum::<f64>() / n;
    let variance = successful
        .iter()
        .map(|c| {
            let d = c.response_time_ms as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();

    let up_count = window.iter().filter(|c| c.state == HealthState::Up).count();
    let reliability = up_count as f64 / window.len() as f64;

    let coefficient_of_variation = if mean > 0.0 { std_dev / mean } else { 0.0 };
    let is_stable = coefficient_of_variation < 0.5 && reliability > 0.8;

    let trend = compute_trend(&successful);

    Some(Baseline {
        mean_response_ms: mean,
        variance,
        std_dev,
        reliability,
        is_stable,
        trend,
        sample_count: successful.len(),
    })
}

fn compute_trend(successful: &[&CheckRecord]) -> Trend {
    let n = successful.len();
    let mid = n / 2;
    if mid == 0 {
        return Trend::Stable;
    }
    let older = &successful[..mid];
    let recent = &successful[mid..];

    let older_mean = older.iter().map(|c| c.response_time_ms as f64).sum::<f64>() / older.len() as f64;
    let recent_mean = recent.iter().map(|c| c.response_time_ms as f64).sum::<f64>() / recent.len() as f64;

    if recent_mean < older_mean * 0.9 {
        Trend::Improving
    } else if recent_mean > older_mean * 1.1 {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(state: HealthState, ms: u32) -> CheckRecord {
        CheckRecord { state, response_time_ms: ms, at: Utc::now() }
    }

    #[test]
    fn fewer_than_three_successes_yields_none() {
        let history = vec![rec(HealthState::Up, 100), rec(HealthState::Down, 200)];
        assert!(analyze_baseline(&history, 24).is_none());
    }

    #[test]
    fn stable_baseline_with_high_reliability() {
        let history: Vec<_> = (0..10).map(|_| rec(HealthState::Up, 100)).collect();
        let b = analyze_baseline(&history, 24).unwrap();
        assert!(b.is_stable);
        assert_eq!(b.reliability, 1.0);
        assert_eq!(b.trend, Trend::Stable);
    }

    #[test]
    fn degrading_trend_when_recent_half_slower() {
        let mut history = vec![];
        for _ in 0..5 {
            history.push(rec(HealthState::Up, 100));
        }
        for _ in 0..5 {
            history.push(rec(HealthState::Up, 500));
        }
        let b = analyze_baseline(&history, 24).unwrap();
        assert_eq!(b.trend, Trend::Degrading);
    }

    #[test]
    fn unreliable_window_is_not_stable() {
        let mut history = vec![];
        for _ in 0..3 {
            history.push(rec(HealthState::Up, 100));
        }
        for _ in 0..5 {
            history.push(rec(HealthState::Down, 0));
        }
        let b = analyze_baseline(&history, 24).unwrap();
        assert!(!b.is_stable);
    }
}
