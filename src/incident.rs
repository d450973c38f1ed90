//! Incident Manager (spec §4.7): tracks the no-incident -> ongoing ->
//! resolved lifecycle driven by hysteresis transitions, grounded in the
//! teacher's `process_check_result`/`resolve_transition` incident handling
//! in `checker.rs` and `consensus.rs::evaluate_and_apply` — generalized from
//! a SQLite `incidents` table into an `IncidentRepository` seam the host
//! application backs however it likes.

use crate::error::ErrorKind;
use crate::model::{HealthState, Incident, IncidentSeverity, IncidentStatus, RegionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const FIND_ONGOING_RETRY_ATTEMPTS: u32 = 6;
const FIND_ONGOING_RETRY_DELAY_MS: u64 = 500;

/// Persistence seam for incidents. The engine never assumes SQL — callers
/// wire in whatever store they already run (the reference `InMemory...` impl
/// below is what the test suite and any caller without its own store use).
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    async fn create(
        &self,
        monitor_id: &str,
        severity: IncidentSeverity,
        error_kind: Option<ErrorKind>,
        started_at: DateTime<Utc>,
    ) -> Incident;

    async fn find_ongoing(&self, monitor_id: &str) -> Option<Incident>;

    async fn resolve(&self, incident_id: &str, ended_at: DateTime<Utc>) -> Option<Incident>;

    async fn append_verification(&self, incident_id: &str, result: RegionResult) -> Option<Incident>;
}

/// Reference in-memory `IncidentRepository`, keyed by incident id with a
/// monitor_id index for `find_ongoing`.
#[derive(Default)]
pub struct InMemoryIncidentRepository {
    incidents: Mutex<HashMap<String, Incident>>,
}

impl InMemoryIncidentRepository {
    pub fn new() -> Self {
        InMemoryIncidentRepository::default()
    }
}

#[async_trait]
impl IncidentRepository for InMemoryIncidentRepository {
    async fn create(
        &self,
        monitor_id: &str,
        severity: IncidentSeverity,
        error_kind: Option<ErrorKind>,
        started_at: DateTime<Utc>,
    ) -> Incident {
        let incident = Incident {
            id: uuid::Uuid::new_v4().to_string(),
            monitor_id: monitor_id.to_string(),
            started_at,
            ended_at: None,
            severity,
            error_kind,
            verifications: Vec::new(),
            status: IncidentStatus::Ongoing,
        };
        let mut incidents = self.incidents.lock().expect("incident repository poisoned");
        incidents.insert(incident.id.clone(), incident.clone());
        incident
    }

    async fn find_ongoing(&self, monitor_id: &str) -> Option<Incident> {
        let incidents = self.incidents.lock().expect("incident repository poisoned");
        incidents
            .values()
            .filter(|i| i.monitor_id == monitor_id && i.status == IncidentStatus::Ongoing)
            .max_by_key(|i| i.started_at)
            .cloned()
    }

    async fn resolve(&self, incident_id: &str, ended_at: DateTime<Utc>) -> Option<Incident> {
        let mut incidents = self.incidents.lock().expect("incident repository poisoned");
        let incident = incidents.get_mut(incident_id)?;
        incident.ended_at = Some(ended_at);
        incident.status = IncidentStatus::Resolved;
        Some(incident.clone())
    }

    async fn append_verification(&self, incident_id: &str, result: RegionResult) -> Option<Incident> {
        let mut incidents = self.incidents.lock().expect("incident repository poisoned");
        let incident = incidents.get_mut(incident_id)?;
        incident.verifications.push(result);
        Some(incident.clone())
    }
}

/// Apply the incident-lifecycle consequences of a confirmed state
/// transition. Returns the incident that was created or resolved, if any.
pub async fn handle_transition(
    repo: &dyn IncidentRepository,
    monitor_id: &str,
    previous: HealthState,
    new_state: HealthState,
    error_kind: Option<ErrorKind>,
    now: DateTime<Utc>,
) -> Option<Incident> {
    use HealthState::*;
    match (previous, new_state) {
        (Up, Down) | (Unknown, Down) | (Degraded, Down) => {
            Some(repo.create(monitor_id, IncidentSeverity::Down, error_kind, now).await)
        }
        (Up, Degraded) | (Unknown, Degraded) => {
            Some(repo.create(monitor_id, IncidentSeverity::Degraded, error_kind, now).await)
        }
        (Down, Up) | (Degraded, Up) => {
            if let Some(incident) = repo.find_ongoing(monitor_id).await {
                repo.resolve(&incident.id, now).await
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Attach a verification result to the monitor's currently ongoing
/// incident, retrying briefly to cover the race where verification
/// completes before `handle_transition`'s `create` call has landed.
pub async fn attach_verification_with_retry(
    repo: &dyn IncidentRepository,
    monitor_id: &str,
    result: RegionResult,
) -> Option<Incident> {
    for attempt in 0..FIND_ONGOING_RETRY_ATTEMPTS {
        if let Some(incident) = repo.find_ongoing(monitor_id).await {
            return repo.append_verification(&incident.id, result).await;
        }
        if attempt + 1 < FIND_ONGOING_RETRY_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(FIND_ONGOING_RETRY_DELAY_MS)).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_result(up: bool) -> RegionResult {
        RegionResult {
            region: "us-east".to_string(),
            country: None,
            is_up: up,
            response_time_ms: 80,
            status_code: Some(200),
            error_message: None,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn up_to_down_creates_ongoing_incident() {
        let repo = InMemoryIncidentRepository::new();
        let now = Utc::now();
        let incident = handle_transition(&repo, "m1", HealthState::Up, HealthState::Down, None, now).await;
        let incident = incident.unwrap();
        assert_eq!(incident.status, IncidentStatus::Ongoing);
        assert_eq!(incident.severity, IncidentSeverity::Down);
    }

    #[tokio::test]
    async fn down_to_up_resolves_ongoing_incident() {
        let repo = InMemoryIncidentRepository::new();
        let now = Utc::now();
        handle_transition(&repo, "m1", HealthState::Up, HealthState::Down, None, now).await;
        let resolved = handle_transition(&repo, "m1", HealthState::Down, HealthState::Up, None, now).await.unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert!(resolved.ended_at.is_some());
    }

    #[tokio::test]
    async fn no_incident_created_on_stable_transition() {
        let repo = InMemoryIncidentRepository::new();
        let now = Utc::now();
        let result = handle_transition(&repo, "m1", HealthState::Degraded, HealthState::Degraded, None, now).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn verification_attaches_once_incident_exists() {
        let repo = InMemoryIncidentRepository::new();
        let now = Utc::now();
        handle_transition(&repo, "m1", HealthState::Up, HealthState::Down, None, now).await;
        let updated = attach_verification_with_retry(&repo, "m1", region_result(false)).await.unwrap();
        assert_eq!(updated.verifications.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_retries_until_incident_exists() {
        let repo = std::sync::Arc::new(InMemoryIncidentRepository::new());
        let now = Utc::now();

        let repo_bg = repo.clone();
        let waiter = tokio::spawn(async move { attach_verification_with_retry(repo_bg.as_ref(), "m1", region_result(true)).await });

        tokio::time::sleep(Duration::from_millis(900)).await;
        handle_transition(repo.as_ref(), "m1", HealthState::Up, HealthState::Down, None, now).await;

        let result = waiter.await.unwrap();
        assert!(result.is_some());
    }
}
