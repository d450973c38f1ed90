//! Verification providers (spec §4.6/§6): the pluggable seam the
//! Verification Orchestrator calls out to for independent, remote-vantage
//! confirmation of a monitor's apparent outage. Grounded in the teacher's
//! `execute_http_check`/`execute_tcp_check`/`execute_dns_check`
//! (`checker.rs`), generalized from "the local probe" into "one of N
//! independent verification vantages".

use crate::config::{MonitorPolicy, ProtocolKind};
use crate::model::RegionResult;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, Once};
use std::time::Instant;

/// A single remote vantage capable of independently re-checking a monitor's
/// target. Implementations are expected to be cheap to clone/share (the
/// orchestrator calls this concurrently, bounded by its own semaphore).
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    /// Stable identifier for this vantage, surfaced in `RegionResult::region`.
    fn name(&self) -> &str;

    async fn verify(&self, monitor: &MonitorPolicy) -> RegionResult;
}

/// Marker for providers that can also attest to SSL/TLS certificate state,
/// distinct from `VerificationProvider` since not every vantage needs it
/// (e.g. a TCP-only region prober has no certificate to report on).
#[async_trait]
pub trait SslVerificationProvider: Send + Sync {
    async fn verify_ssl(&self, monitor: &MonitorPolicy) -> RegionResult;
}

/// Reference `VerificationProvider` for HTTP/HTTPS/TCP targets, backed by a
/// shared `reqwest::Client` the way `checker.rs::execute_http_check` reuses
/// one client across checks.
pub struct ReqwestRegionProvider {
    region: String,
    client: reqwest::Client,
}

impl ReqwestRegionProvider {
    pub fn new(region: impl Into<String>, client: reqwest::Client) -> Self {
        ReqwestRegionProvider { region: region.into(), client }
    }
}

#[async_trait]
impl VerificationProvider for ReqwestRegionProvider {
    fn name(&self) -> &str {
        &self.region
    }

    async fn verify(&self, monitor: &MonitorPolicy) -> RegionResult {
        let start = Instant::now();
        match monitor.protocol {
            ProtocolKind::Tcp | ProtocolKind::Udp => self.verify_tcp(monitor, start).await,
            _ => self.verify_http(monitor, start).await,
        }
    }
}

impl ReqwestRegionProvider {
    async fn verify_http(&self, monitor: &MonitorPolicy, start: Instant) -> RegionResult {
        let result = self.client.get(&monitor.target).timeout(monitor.timeout).send().await;
        let elapsed_ms = start.elapsed().as_millis() as u32;
        match result {
            Ok(resp) => {
                let code = resp.status().as_u16();
                let is_up = match monitor.expected_status_code {
                    Some(expected) => code == expected,
                    None => resp.status().is_success(),
                };
                RegionResult {
                    region: self.region.clone(),
                    country: None,
                    is_up,
                    response_time_ms: elapsed_ms,
                    status_code: Some(code),
                    error_message: if is_up { None } else { Some(format!("unexpected status {code}")) },
                    at: Utc::now(),
                }
            }
            Err(e) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some(if e.is_timeout() { "request timed out".to_string() } else { e.to_string() }),
                at: Utc::now(),
            },
        }
    }

    async fn verify_tcp(&self, monitor: &MonitorPolicy, start: Instant) -> RegionResult {
        use tokio::net::TcpStream;
        let addr = monitor.target.strip_prefix("tcp://").unwrap_or(&monitor.target);
        let result = tokio::time::timeout(monitor.timeout, TcpStream::connect(addr)).await;
        let elapsed_ms = start.elapsed().as_millis() as u32;
        match result {
            Ok(Ok(_stream)) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: true,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: None,
                at: Utc::now(),
            },
            Ok(Err(e)) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some(e.to_string()),
                at: Utc::now(),
            },
            Err(_) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some("TCP connect timed out".to_string()),
                at: Utc::now(),
            },
        }
    }
}

/// Reference DNS verification provider, grounded in
/// `checker.rs::execute_dns_check` — resolves the target as an A record from
/// a remote vantage and reports reachability rather than content.
pub struct HickoryDnsProvider {
    region: String,
    resolver: hickory_resolver::TokioAsyncResolver,
}

impl HickoryDnsProvider {
    pub fn new(region: impl Into<String>) -> Self {
        use hickory_resolver::config::{ResolverConfig, ResolverOpts};
        HickoryDnsProvider {
            region: region.into(),
            resolver: hickory_resolver::TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

#[async_trait]
impl VerificationProvider for HickoryDnsProvider {
    fn name(&self) -> &str {
        &self.region
    }

    async fn verify(&self, monitor: &MonitorPolicy) -> RegionResult {
        let start = Instant::now();
        let hostname = monitor.target.strip_prefix("dns://").unwrap_or(&monitor.target);
        let result = tokio::time::timeout(monitor.timeout, self.resolver.lookup_ip(hostname)).await;
        let elapsed_ms = start.elapsed().as_millis() as u32;
        match result {
            Ok(Ok(lookup)) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: lookup.iter().next().is_some(),
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: None,
                at: Utc::now(),
            },
            Ok(Err(e)) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some(e.to_string()),
                at: Utc::now(),
            },
            Err(_) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some("DNS lookup timed out".to_string()),
                at: Utc::now(),
            },
        }
    }
}

static CRYPTO_PROVIDER_INIT: Once = Once::new();

/// Installs the process-wide default `rustls` crypto provider exactly once.
/// `rustls` 0.23 panics if a default is installed twice, which would happen
/// if more than one `TlsCertVerificationProvider` were constructed.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Splits a monitor target into `(host, port)` for a raw TLS handshake,
/// defaulting to 443 the way a browser would for a bare hostname.
fn host_port(target: &str) -> (String, u16) {
    let stripped = target
        .strip_prefix("https://")
        .or_else(|| target.strip_prefix("ssl://"))
        .or_else(|| target.strip_prefix("tls://"))
        .unwrap_or(target);
    let stripped = stripped.split('/').next().unwrap_or(stripped);
    match stripped.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (stripped.to_string(), 443),
        },
        None => (stripped.to_string(), 443),
    }
}

/// A `rustls` certificate verifier that accepts every certificate
/// unconditionally and captures the leaf certificate's DER bytes, so the
/// handshake itself never fails on an invalid/expired/self-signed cert —
/// inspection happens afterward against the captured DER.
#[derive(Debug)]
struct CapturingVerifier {
    captured: Mutex<Option<Vec<u8>>>,
}

impl CapturingVerifier {
    fn new() -> Self {
        CapturingVerifier { captured: Mutex::new(None) }
    }

    fn take(&self) -> Option<Vec<u8>> {
        self.captured.lock().expect("capturing verifier poisoned").take()
    }
}

impl rustls::client::danger::ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        *self.captured.lock().expect("capturing verifier poisoned") = Some(end_entity.as_ref().to_vec());
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
    }
}

/// Reference `SslVerificationProvider`: opens a raw TLS connection to the
/// monitor's host, accepts whatever certificate it presents (so expired or
/// self-signed certs don't abort the handshake), then parses the captured
/// leaf certificate's validity window with `x509-parser` and reports days
/// until expiry the way spec §4.6's SSL vantage is described.
pub struct TlsCertVerificationProvider {
    region: String,
}

impl TlsCertVerificationProvider {
    pub fn new(region: impl Into<String>) -> Self {
        ensure_crypto_provider();
        TlsCertVerificationProvider { region: region.into() }
    }
}

#[async_trait]
impl SslVerificationProvider for TlsCertVerificationProvider {
    async fn verify_ssl(&self, monitor: &MonitorPolicy) -> RegionResult {
        let start = Instant::now();
        let (host, port) = host_port(&monitor.target);
        let result = tokio::time::timeout(monitor.timeout, self.fetch_leaf_cert(&host, port)).await;
        let elapsed_ms = start.elapsed().as_millis() as u32;

        match result {
            Ok(Ok(der)) => self.inspect_cert(&der, monitor, elapsed_ms),
            Ok(Err(e)) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some(e),
                at: Utc::now(),
            },
            Err(_) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some("TLS handshake timed out".to_string()),
                at: Utc::now(),
            },
        }
    }
}

impl TlsCertVerificationProvider {
    async fn fetch_leaf_cert(&self, host: &str, port: u16) -> Result<Vec<u8>, String> {
        let verifier = Arc::new(CapturingVerifier::new());
        let tls_config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| format!("invalid hostname {host}: {e}"))?;

        let stream =
            tokio::net::TcpStream::connect((host, port)).await.map_err(|e| format!("tcp connect failed: {e}"))?;

        // The handshake fails server-cert validation never, by construction
        // of `CapturingVerifier`; an `Err` here means a transport/protocol
        // problem, not an untrusted certificate.
        connector.connect(server_name, stream).await.map_err(|e| format!("tls handshake failed: {e}"))?;

        verifier.take().ok_or_else(|| "server presented no certificate".to_string())
    }

    fn inspect_cert(&self, der: &[u8], monitor: &MonitorPolicy, elapsed_ms: u32) -> RegionResult {
        match x509_parser::parse_x509_certificate(der) {
            Ok((_, cert)) => {
                let now = x509_parser::time::ASN1Time::now();
                let validity = cert.validity();
                let expired = now > validity.not_after;
                let not_yet_valid = now < validity.not_before;
                let days_until_expiry = (validity.not_after.timestamp() - now.timestamp()) / 86_400;
                let expiring_soon = !expired && days_until_expiry <= monitor.ssl_expiry_threshold_days as i64;

                let (is_up, error_message) = if expired {
                    (false, Some("CERT_HAS_EXPIRED".to_string()))
                } else if not_yet_valid {
                    (false, Some("CERT_NOT_YET_VALID".to_string()))
                } else if expiring_soon {
                    (true, Some(format!("certificate expires in {days_until_expiry} day(s)")))
                } else {
                    (true, None)
                };

                RegionResult {
                    region: self.region.clone(),
                    country: None,
                    is_up,
                    response_time_ms: elapsed_ms,
                    status_code: None,
                    error_message,
                    at: Utc::now(),
                }
            }
            Err(e) => RegionResult {
                region: self.region.clone(),
                country: None,
                is_up: false,
                response_time_ms: elapsed_ms,
                status_code: None,
                error_message: Some(format!("certificate parse failed: {e}")),
                at: Utc::now(),
            },
        }
    }
}
