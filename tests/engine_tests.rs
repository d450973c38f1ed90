//! End-to-end scenarios against the public `Engine` surface (spec §8).
//! Each test drives a literal sequence of probes through
//! `determine_health_state` and asserts the confirmed state sequence the
//! spec's worked examples describe.

use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uptime_engine::{
    BroadcastEventTransport, CheckRecord, Engine, EngineConfig, HealthState, IncidentRepository,
    InMemoryIncidentRepository, MonitorPolicy, ProbeMeta, ProbeResult, ProtocolKind, SslInfo, VerificationOrchestrator,
};

fn monitor(protocol: ProtocolKind, alert_threshold: u32) -> MonitorPolicy {
    MonitorPolicy {
        id: "m1".into(),
        target: "https://example.com".into(),
        protocol,
        interval: StdDuration::from_secs(60),
        timeout: StdDuration::from_secs(30),
        alert_threshold,
        degraded_threshold_ms: None,
        ssl_expiry_threshold_days: 30,
        expected_status_code: None,
        is_active: true,
        expected_response_time_ms: 1000,
        consecutive_checks_for_recovery: 1,
        min_time_in_state_ms: 30_000,
    }
}

fn engine() -> (Engine, Arc<InMemoryIncidentRepository>) {
    let verification = VerificationOrchestrator::new(vec![], None, None, 3, 120_000, 0);
    let incidents = Arc::new(InMemoryIncidentRepository::new());
    let engine = Engine::new(
        EngineConfig::default(),
        verification,
        incidents.clone(),
        Arc::new(BroadcastEventTransport::new(100)),
    );
    (engine, incidents)
}

fn probe(is_up: bool, status: Option<u16>, ms: u32, error_code: Option<&str>) -> ProbeResult {
    ProbeResult {
        is_up,
        response_time_ms: ms,
        status_code: status,
        error_code: error_code.map(String::from),
        error_message: None,
        meta: ProbeMeta::default(),
    }
}

/// Scenario 1: HTTP 200 healthy, previous state `unknown`.
#[tokio::test]
async fn scenario_http_200_from_unknown_is_up() {
    let (engine, _incidents) = engine();
    let now = Utc::now();
    let decision = engine
        .determine_health_state(&probe(true, Some(200), 100, None), &monitor(ProtocolKind::Http, 2), &[], now)
        .await;
    assert_eq!(decision.final_state, HealthState::Up);
    assert!(decision.reasons.iter().any(|r| r.contains("normal parameters")));
}

/// Scenario 2: HTTP 404, threshold 3, three consecutive ticks from `up`.
#[tokio::test]
async fn scenario_http_404_threshold_3_confirms_on_third_tick() {
    let (engine, _incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Http, 3);
    let mut history = vec![];

    engine.determine_health_state(&probe(true, Some(200), 100, None), &mon, &history, now).await;
    history.push(CheckRecord { state: HealthState::Up, response_time_ms: 100, at: now });

    let p = probe(false, Some(404), 100, None);

    let d1 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d1.final_state, HealthState::Degraded);
    history.push(CheckRecord { state: d1.final_state, response_time_ms: 100, at: now });

    let d2 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d2.final_state, HealthState::Degraded);
    history.push(CheckRecord { state: d2.final_state, response_time_ms: 100, at: now });

    let d3 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d3.final_state, HealthState::Down);
}

/// Scenario 3: HTTP 500, threshold 2. Tick 1 awaiting, tick 2 confirms down
/// and opens an incident with severity DOWN.
#[tokio::test]
async fn scenario_http_500_threshold_2_opens_down_incident() {
    let (engine, incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Http, 2);
    let mut history = vec![];

    engine.determine_health_state(&probe(true, Some(200), 100, None), &mon, &history, now).await;
    history.push(CheckRecord { state: HealthState::Up, response_time_ms: 100, at: now });

    let p = probe(false, Some(500), 100, None);
    let d1 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d1.final_state, HealthState::Degraded);
    history.push(CheckRecord { state: d1.final_state, response_time_ms: 100, at: now });

    let d2 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d2.final_state, HealthState::Down);

    let incident = incidents.find_ongoing("m1").await.expect("incident opened");
    assert_eq!(incident.severity, uptime_engine::IncidentSeverity::Down);
}

/// Scenario 4: HTTP 429, threshold 2. Two consecutive ticks both stay
/// `degraded`; no `down` transition.
#[tokio::test]
async fn scenario_http_429_stays_degraded_never_down() {
    let (engine, _incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Http, 2);
    let mut history = vec![];

    engine.determine_health_state(&probe(true, Some(200), 100, None), &mon, &history, now).await;
    history.push(CheckRecord { state: HealthState::Up, response_time_ms: 100, at: now });

    let p = probe(true, Some(429), 100, None);

    let d1 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d1.final_state, HealthState::Degraded);
    assert!(d1.reasons.iter().any(|r| r.contains("Rate Limit")));
    history.push(CheckRecord { state: d1.final_state, response_time_ms: 100, at: now });

    let d2 = engine.determine_health_state(&p, &mon, &history, now).await;
    assert_eq!(d2.final_state, HealthState::Degraded);
}

/// Scenario 5: SSL expired on HTTPS with HTTP 200 stays `degraded`, not
/// `down` — HTTP availability dominates SSL quality.
#[tokio::test]
async fn scenario_ssl_expired_on_https_is_degraded() {
    let (engine, _incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Https, 2);

    let mut p = probe(true, Some(200), 100, None);
    p.meta.ssl_info = Some(SslInfo { error: Some("CERT_HAS_EXPIRED".into()), days_until_expiry: None });

    let decision = engine.determine_health_state(&p, &mon, &[], now).await;
    assert_eq!(decision.final_state, HealthState::Degraded);
}

/// Scenario 6: TCP connection refused, threshold 2: awaiting, then down
/// with incident opened, then a fast recovery resolves it.
#[tokio::test]
async fn scenario_tcp_refused_then_fast_recovery_resolves_incident() {
    let (engine, incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Tcp, 2);
    let mut history = vec![];

    engine.determine_health_state(&probe(true, None, 50, None), &mon, &history, now).await;
    history.push(CheckRecord { state: HealthState::Up, response_time_ms: 50, at: now });

    let refused = probe(false, None, 50, Some("ECONNREFUSED"));

    let d1 = engine.determine_health_state(&refused, &mon, &history, now).await;
    assert_eq!(d1.final_state, HealthState::Degraded);
    history.push(CheckRecord { state: d1.final_state, response_time_ms: 50, at: now });

    let d2 = engine.determine_health_state(&refused, &mon, &history, now).await;
    assert_eq!(d2.final_state, HealthState::Down);
    assert!(incidents.find_ongoing("m1").await.is_some());
    history.push(CheckRecord { state: d2.final_state, response_time_ms: 50, at: now });

    let later = now + Duration::seconds(60);
    let d3 = engine.determine_health_state(&probe(true, None, 50, None), &mon, &history, later).await;
    assert_eq!(d3.final_state, HealthState::Up);
    assert!(incidents.find_ongoing("m1").await.is_none());
}

/// Flap suppression: four or more state changes within 10 minutes forces
/// the next differing transition to `degraded` rather than letting it
/// through directly.
#[tokio::test]
async fn flap_suppression_forces_degraded_after_four_transitions() {
    let (engine, _incidents) = engine();
    let mon = monitor(ProtocolKind::Http, 1);
    let mut now = Utc::now();
    let mut history = vec![];

    let up = probe(true, Some(200), 100, None);
    let down = probe(false, Some(500), 100, None);

    for i in 0..4 {
        let p = if i % 2 == 0 { &down } else { &up };
        let d = engine.determine_health_state(p, &mon, &history, now).await;
        history.push(CheckRecord { state: d.final_state, response_time_ms: 100, at: now });
        now += Duration::seconds(10);
    }

    let d = engine.determine_health_state(&down, &mon, &history, now).await;
    assert_eq!(d.final_state, HealthState::Degraded);
    assert!(d.prevented_flapping);
}

/// Verification cache: two invocations within the TTL window for the same
/// monitor reuse the cached result rather than re-querying providers.
#[tokio::test]
async fn verification_cache_reused_within_ttl() {
    let verification = VerificationOrchestrator::new(vec![], None, None, 3, 120_000, 0);
    let mon = monitor(ProtocolKind::Http, 2);

    let first = verification.verify(&mon).await;
    let second = verification.verify(&mon).await;

    assert_eq!(first.results.len(), second.results.len());
}

/// `getHealthStatistics` reports full uptime when a monitor has been
/// continuously `up` with no transitions in its log.
#[tokio::test]
async fn health_statistics_full_uptime_with_no_transitions() {
    let (engine, _incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Http, 2);
    engine.determine_health_state(&probe(true, Some(200), 100, None), &mon, &[], now).await;

    let stats = engine.health_statistics("m1", 24, now);
    assert_eq!(stats.current_state, HealthState::Up);
    assert_eq!(stats.uptime_score, 1.0);
}

/// `clearStateHistory` is idempotent and resets a monitor back to
/// `unknown`.
#[tokio::test]
async fn clear_state_history_is_idempotent() {
    let (engine, _incidents) = engine();
    let now = Utc::now();
    let mon = monitor(ProtocolKind::Http, 2);
    engine.determine_health_state(&probe(true, Some(200), 100, None), &mon, &[], now).await;

    engine.clear_state_history("m1", now);
    engine.clear_state_history("m1", now);

    let stats = engine.health_statistics("m1", 24, now);
    assert_eq!(stats.current_state, HealthState::Unknown);
}
