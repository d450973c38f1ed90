//! Error taxonomy for the health-state engine (spec §7).
//!
//! `ErrorKind` is the tagged replacement for the loose string error codes
//! probes historically produced. It never crosses an `await` point holding
//! a lock and is always cheap to construct.

use thiserror::Error;

/// Finite enumeration of error classes the classifier and pipeline can see.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail")]
#[non_exhaustive]
pub enum ErrorKind {
    // Network
    Timeout,
    DnsError,
    ConnectionRefused,
    ConnectionReset,
    HostUnreachable,

    // SSL
    CertExpired,
    CertExpiringSoon { days_remaining: i64 },
    CertHostnameMismatch,
    SelfSignedCert,
    UnableToVerifyLeafSignature,
    CertChainError,

    // HTTP
    HttpServerError { status: u16 },
    HttpClientError { status: u16 },
    HttpRateLimit,
    HttpInformational { status: u16 },
    HttpNotFound,

    // Performance
    SlowResponse,
    HighLatency,

    // Protocol-specific
    DnsNotFound,
    UdpNoResponse,
    SmtpNoBanner,
    SmtpServiceUnavailable,
    PingTimeout,

    // Content / policy
    KeywordMismatch,
    ExpectedStatusMismatch { expected: u16, actual: u16 },

    /// The classifier could not attribute the failure to a known class.
    UnknownServiceFailure,

    /// An internal failure in a pipeline component was caught and the tick
    /// fell back to its pre-failure decision rather than crashing (§7).
    HealthEvaluationError,
}

impl ErrorKind {
    /// Map a probe's free-form error code string (as produced by an
    /// external probe driver) onto the closest `ErrorKind`. Probe drivers
    /// are consumed, not implemented here, so this mapping is deliberately
    /// permissive: unknown codes fall back to `UnknownServiceFailure`.
    pub fn from_probe_code(code: &str) -> Self {
        match code {
            "TIMEOUT" => ErrorKind::Timeout,
            "DNS_ERROR" | "ENOTFOUND" => ErrorKind::DnsError,
            "CONNECTION_REFUSED" | "ECONNREFUSED" => ErrorKind::ConnectionRefused,
            "CONNECTION_RESET" | "ECONNRESET" => ErrorKind::ConnectionReset,
            "EHOSTUNREACH" | "ENETUNREACH" => ErrorKind::HostUnreachable,
            "CERT_HAS_EXPIRED" | "CERT_EXPIRED" => ErrorKind::CertExpired,
            "CERT_HOSTNAME_MISMATCH" => ErrorKind::CertHostnameMismatch,
            "DEPTH_ZERO_SELF_SIGNED_CERT" => ErrorKind::SelfSignedCert,
            "UNABLE_TO_VERIFY_LEAF_SIGNATURE" => ErrorKind::UnableToVerifyLeafSignature,
            "KEYWORD_MISMATCH" => ErrorKind::KeywordMismatch,
            "DNS_NOT_FOUND" => ErrorKind::DnsNotFound,
            "UDP_NO_RESPONSE" => ErrorKind::UdpNoResponse,
            "SMTP_NO_BANNER" => ErrorKind::SmtpNoBanner,
            "SMTP_SERVICE_UNAVAILABLE" => ErrorKind::SmtpServiceUnavailable,
            "PING_TIMEOUT" => ErrorKind::PingTimeout,
            _ => ErrorKind::UnknownServiceFailure,
        }
    }

    /// True for the network-class errors rule 3 of the classifier groups.
    pub fn is_network_class(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::DnsError
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::HostUnreachable
        )
    }

    /// True for the SSL hard-failure codes in classifier rule 1.
    pub fn is_ssl_hard_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::CertExpired
                | ErrorKind::CertHostnameMismatch
                | ErrorKind::SelfSignedCert
                | ErrorKind::UnableToVerifyLeafSignature
        )
    }
}

/// Wraps failures that must not escape the tick pipeline (§7 propagation
/// policy: "Unhandled exceptions in the classifier fall back to the
/// original pre-classifier decision... and are not allowed to crash the
/// tick").
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("health evaluation failed: {0}")]
    HealthEvaluation(String),

    #[error("verification provider failed: {0}")]
    VerificationProvider(String),

    #[error("incident repository failed: {0}")]
    IncidentRepository(String),
}
