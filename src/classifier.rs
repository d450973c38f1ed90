//! Status Classifier (spec §4.1): maps a `ProbeResult` to a tentative
//! `Verdict`. Pure aside from reading monitor policy — no I/O, no clock
//! reads beyond what's already in the probe result.

use crate::config::{EngineConfig, MonitorPolicy, ProtocolKind};
use crate::error::ErrorKind;
use crate::model::{ProbeResult, Verdict};

/// Apply the classifier rules in spec order. Rule 1 (SSL hard failure) only
/// fires unconditionally for dedicated SSL-certificate monitors; for HTTPS
/// monitors the combined rule below lets HTTP availability dominate SSL
/// quality, matching the spec's worked example ("SSL expired on HTTPS with
/// HTTP 200" classifies as `degraded`, not `down`).
pub fn classify(probe: &ProbeResult, monitor: &MonitorPolicy, config: &EngineConfig) -> Verdict {
    let mut reasons = Vec::new();

    if monitor.protocol == ProtocolKind::Ssl {
        if let Some(verdict) = ssl_hard_failure(probe, &mut reasons) {
            return verdict;
        }
    }

    let mut verdict = classify_base(probe, monitor, config, &mut reasons);

    if monitor.protocol == ProtocolKind::Https {
        apply_https_ssl_quality(&mut verdict, probe, monitor, config, &mut reasons);
    }

    apply_content_mismatch(&mut verdict, probe, config, &mut reasons);
    apply_expected_status_mismatch(&mut verdict, probe, monitor, &mut reasons);

    verdict.reasons = reasons;
    verdict
}

/// Rule 1: SSL hard failure. Only consulted for `ProtocolKind::Ssl` — see
/// module docs.
fn ssl_hard_failure(probe: &ProbeResult, reasons: &mut Vec<String>) -> Option<Verdict> {
    let ssl = probe.meta.ssl_info.as_ref()?;
    let code = ssl.error.as_ref()?;
    let kind = ErrorKind::from_probe_code(code);
    if !kind.is_ssl_hard_failure() {
        return None;
    }
    reasons.push(format!("SSL certificate error: {code}"));
    Some(Verdict {
        state: crate::model::HealthState::Down,
        severity: 0.95,
        reasons: reasons.clone(),
        error_kind: Some(kind),
        is_slow_response: false,
        is_fully_up: false,
        status_code: probe.status_code,
        response_time_ms: probe.response_time_ms,
    })
}

/// Rules 2-4 and the rule-7 fallback, ignoring SSL quality entirely.
fn classify_base(probe: &ProbeResult, monitor: &MonitorPolicy, config: &EngineConfig, reasons: &mut Vec<String>) -> Verdict {
    use crate::model::HealthState::*;

    let slow_threshold = monitor.slow_threshold_ms();
    let error_kind = probe.error_kind();

    // Rule 3: network-class errors dominate regardless of the is_up flag
    // a probe driver happened to set.
    if let Some(kind) = &error_kind {
        if kind.is_network_class() {
            reasons.push(
                probe
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Network error".to_string()),
            );
            return Verdict {
                state: Down,
                severity: 0.95,
                reasons: reasons.clone(),
                error_kind: Some(kind.clone()),
                is_slow_response: false,
                is_fully_up: false,
                status_code: probe.status_code,
                response_time_ms: probe.response_time_ms,
            };
        }
    }

    if let Some(code) = probe.status_code {
        // Rule 4: HTTP errors sub-classified by status code, regardless of
        // what the probe's `is_up` flag said — the code is authoritative.
        if code >= 500 {
            reasons.push(format!("Server error: HTTP {code}"));
            return Verdict {
                state: Down,
                severity: 0.95,
                reasons: reasons.clone(),
                error_kind: Some(ErrorKind::HttpServerError { status: code }),
                is_slow_response: false,
                is_fully_up: false,
                status_code: Some(code),
                response_time_ms: probe.response_time_ms,
            };
        }
        if code == 429 {
            reasons.push("Rate Limit exceeded (HTTP 429)".to_string());
            return Verdict {
                state: Degraded,
                severity: 0.6,
                reasons: reasons.clone(),
                error_kind: Some(ErrorKind::HttpRateLimit),
                is_slow_response: true,
                is_fully_up: false,
                status_code: Some(code),
                response_time_ms: probe.response_time_ms,
            };
        }
        if (400..500).contains(&code) {
            reasons.push(format!("Client error: HTTP {code}"));
            return Verdict {
                state: Down,
                severity: 0.9,
                reasons: reasons.clone(),
                error_kind: Some(ErrorKind::HttpClientError { status: code }),
                is_slow_response: false,
                is_fully_up: false,
                status_code: Some(code),
                response_time_ms: probe.response_time_ms,
            };
        }
        if (100..200).contains(&code) {
            reasons.push(format!("Informational response: HTTP {code}"));
            return Verdict {
                state: Degraded,
                severity: 0.5,
                reasons: reasons.clone(),
                error_kind: Some(ErrorKind::HttpInformational { status: code }),
                is_slow_response: false,
                is_fully_up: false,
                status_code: Some(code),
                response_time_ms: probe.response_time_ms,
            };
        }
        // 2xx/3xx: up, subject to the slow-response check below.
        return slow_or_up(probe, slow_threshold, config.slow_response_weight, reasons);
    }

    if probe.is_up {
        // Protocols without a status code (TCP/UDP/DNS/PING/SMTP success).
        return slow_or_up(probe, slow_threshold, config.slow_response_weight, reasons);
    }

    // Rule 7 fallback: down with no rule matched.
    reasons.push("Unknown service failure".to_string());
    Verdict {
        state: Down,
        severity: 0.9,
        reasons: reasons.clone(),
        error_kind: Some(ErrorKind::UnknownServiceFailure),
        is_slow_response: false,
        is_fully_up: false,
        status_code: probe.status_code,
        response_time_ms: probe.response_time_ms,
    }
}

/// Rule 2: successful but slow, or plain healthy.
fn slow_or_up(probe: &ProbeResult, slow_threshold: u32, slow_response_weight: f64, reasons: &mut Vec<String>) -> Verdict {
    use crate::model::HealthState::*;
    if probe.response_time_ms > slow_threshold {
        reasons.push(format!(
            "Response time {}ms exceeds {}ms threshold",
            probe.response_time_ms, slow_threshold
        ));
        Verdict {
            state: Degraded,
            severity: slow_response_weight,
            reasons: reasons.clone(),
            error_kind: Some(ErrorKind::SlowResponse),
            is_slow_response: true,
            is_fully_up: false,
            status_code: probe.status_code,
            response_time_ms: probe.response_time_ms,
        }
    } else {
        reasons.push("Response within normal parameters".to_string());
        Verdict {
            state: Up,
            severity: 0.0,
            reasons: reasons.clone(),
            error_kind: None,
            is_slow_response: false,
            is_fully_up: true,
            status_code: probe.status_code,
            response_time_ms: probe.response_time_ms,
        }
    }
}

/// HTTPS combined rule: HTTP availability dominates SSL quality.
fn apply_https_ssl_quality(
    verdict: &mut Verdict,
    probe: &ProbeResult,
    monitor: &MonitorPolicy,
    config: &EngineConfig,
    reasons: &mut Vec<String>,
) {
    use crate::model::HealthState::*;

    if verdict.state == Down {
        // HTTP down: SSL is informational only.
        return;
    }

    let Some(ssl) = &probe.meta.ssl_info else {
        return;
    };

    if let Some(code) = &ssl.error {
        let kind = ErrorKind::from_probe_code(code);
        if kind.is_ssl_hard_failure() {
            reasons.push(format!("Certificate quality issue: {code}"));
            verdict.state = Degraded;
            verdict.severity = verdict.severity.max(config.ssl_warning_weight);
            verdict.error_kind = Some(kind);
            verdict.is_fully_up = false;
            return;
        }
    }

    if let Some(days) = ssl.days_until_expiry {
        if days <= monitor.ssl_expiry_threshold_days {
            reasons.push(format!("Certificate expiring in {days} day(s)"));
            verdict.state = Degraded;
            verdict.severity = verdict.severity.max(config.ssl_warning_weight);
            verdict.error_kind = Some(ErrorKind::CertExpiringSoon { days_remaining: days });
            verdict.is_fully_up = false;
        }
    }
}

/// Rule 5: content mismatch is additive — it can only make things worse.
fn apply_content_mismatch(verdict: &mut Verdict, probe: &ProbeResult, config: &EngineConfig, reasons: &mut Vec<String>) {
    use crate::model::HealthState::*;
    if !matches!(probe.error_kind(), Some(ErrorKind::KeywordMismatch)) {
        return;
    }
    reasons.push("Expected content keyword not found".to_string());
    if verdict.state == Up {
        verdict.state = Degraded;
    }
    verdict.severity = verdict.severity.max(config.content_mismatch_weight);
    verdict.error_kind = Some(ErrorKind::KeywordMismatch);
    verdict.is_fully_up = false;
}

/// Rule 6: expected-status-code mismatch always wins — severity 1.0.
fn apply_expected_status_mismatch(
    verdict: &mut Verdict,
    probe: &ProbeResult,
    monitor: &MonitorPolicy,
    reasons: &mut Vec<String>,
) {
    use crate::model::HealthState::Down;
    let (Some(expected), Some(actual)) = (monitor.expected_status_code, probe.status_code) else {
        return;
    };
    if actual == expected {
        return;
    }
    reasons.push(format!("Expected status {expected}, got {actual}"));
    verdict.state = Down;
    verdict.severity = 1.0;
    verdict.error_kind = Some(ErrorKind::ExpectedStatusMismatch { expected, actual });
    verdict.is_fully_up = false;
}
