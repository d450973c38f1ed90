//! State Store (spec §4.5): owns each monitor's `MonitorState` behind a
//! per-monitor lock, the way the teacher's `Db` wraps a single
//! `Mutex<Connection>` — here the lock granularity is per monitor rather
//! than global, since health state has no cross-monitor invariant to
//! protect.

use crate::model::{Decision, MonitorState, Transition};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store of `MonitorState`, keyed by monitor id. Callers needing
/// durability wrap this (or replace it) with their own persistence — the
/// engine itself has no opinion on where state is ultimately backed.
pub struct StateStore {
    monitors: Mutex<HashMap<String, Mutex<MonitorState>>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        StateStore { monitors: Mutex::new(HashMap::new()) }
    }

    /// Read a snapshot of a monitor's current state, creating it at
    /// `Unknown` if this is the first time it's been seen.
    pub fn get_or_init(&self, monitor_id: &str, now: DateTime<Utc>) -> MonitorState {
        let mut monitors = self.monitors.lock().expect("state store poisoned");
        let entry = monitors
            .entry(monitor_id.to_string())
            .or_insert_with(|| Mutex::new(MonitorState::new(now)));
        entry.lock().expect("monitor state poisoned").clone()
    }

    /// Read a snapshot without creating an entry.
    pub fn get(&self, monitor_id: &str) -> Option<MonitorState> {
        let monitors = self.monitors.lock().expect("state store poisoned");
        monitors.get(monitor_id).map(|m| m.lock().expect("monitor state poisoned").clone())
    }

    pub fn remove(&self, monitor_id: &str) {
        let mut monitors = self.monitors.lock().expect("state store poisoned");
        monitors.remove(monitor_id);
    }

    /// Snapshot every monitor currently tracked.
    pub fn snapshot(&self) -> HashMap<String, MonitorState> {
        let monitors = self.monitors.lock().expect("state store poisoned");
        monitors
            .iter()
            .map(|(id, state)| (id.clone(), state.lock().expect("monitor state poisoned").clone()))
            .collect()
    }

    /// Apply a `Decision` to the stored `MonitorState` for `monitor_id`,
    /// following spec §4.5's update rule. `decision.target` is the
    /// pre-hysteresis proposal; `decision.final_state` is what's surfaced to
    /// the caller. The two diverge only during a grace period, in which case
    /// the pending-confirmation bookkeeping advances without rotating the
    /// confirmed state.
    pub fn update_state_history(&self, monitor_id: &str, decision: &Decision, now: DateTime<Utc>) -> MonitorState {
        let mut monitors = self.monitors.lock().expect("state store poisoned");
        let entry = monitors
            .entry(monitor_id.to_string())
            .or_insert_with(|| Mutex::new(MonitorState::new(now)));
        let mut state = entry.lock().expect("monitor state poisoned");
        state.last_check_at = now;

        if decision.is_slow_response {
            state.consecutive_slow_count = state.consecutive_slow_count.saturating_add(1);
        } else {
            state.consecutive_slow_count = 0;
        }

        if decision.target == state.current_state {
            // Stable (or a pending transition just collapsed back to the
            // state we started in) — clear any pending bookkeeping and
            // count this as a confirming tick.
            state.pending_target = None;
            state.consecutive_count = state.consecutive_count.saturating_add(1);
        } else if decision.final_state == decision.target {
            // Confirmed transition: rotate.
            let transition = Transition {
                from: state.current_state,
                to: decision.target,
                at: now,
                reason: decision.transition_reason.clone().unwrap_or_default(),
            };
            if state.transitions.len() >= MonitorState::TRANSITIONS_CAPACITY {
                state.transitions.pop_front();
            }
            state.transitions.push_back(transition);
            state.current_state = decision.target;
            state.consecutive_count = 1;
            state.last_state_change = now;
            state.pending_target = None;
        } else {
            // Grace period: still accumulating confirmations toward target.
            if state.pending_target == Some(decision.target) {
                state.consecutive_count = state.consecutive_count.saturating_add(1);
            } else {
                state.pending_target = Some(decision.target);
                state.consecutive_count = 1;
            }
        }

        state.clone()
    }

    pub fn clear_history(&self, monitor_id: &str, now: DateTime<Utc>) {
        let mut monitors = self.monitors.lock().expect("state store poisoned");
        monitors.insert(monitor_id.to_string(), Mutex::new(MonitorState::new(now)));
    }

    /// Revert a monitor to `Unknown` if it hasn't been evaluated in longer
    /// than `max_gap_ms` (spec §6 `maxTimeForUnknownMs`), mirroring the
    /// teacher's `probe_stale_minutes` staleness handling. No-op for a
    /// monitor the store hasn't seen yet, or one already `Unknown`.
    pub fn reset_if_stale(&self, monitor_id: &str, max_gap_ms: i64, now: DateTime<Utc>) {
        let monitors = self.monitors.lock().expect("state store poisoned");
        let Some(entry) = monitors.get(monitor_id) else { return };
        let mut state = entry.lock().expect("monitor state poisoned");
        if state.current_state == crate::model::HealthState::Unknown {
            return;
        }
        if (now - state.last_check_at).num_milliseconds() > max_gap_ms {
            *state = MonitorState::new(now);
        }
    }
}
