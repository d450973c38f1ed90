//! Verification Orchestrator (spec §4.6): independently confirms an
//! apparent outage from other vantages before an incident is opened,
//! grounded in the teacher's `consensus.rs` multi-location aggregation,
//! generalized from SQLite-backed heartbeats to a pluggable provider list.

pub mod providers;

pub use providers::{
    HickoryDnsProvider, ReqwestRegionProvider, SslVerificationProvider, TlsCertVerificationProvider, VerificationProvider,
};

use crate::config::{MonitorPolicy, ProtocolKind};
use crate::model::{RegionResult, VerificationClassification, VerificationOutcome, VerificationSeverity};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

struct CacheEntry {
    outcome: VerificationOutcome,
    fetched_at: Instant,
}

/// Runs verification checks against a bounded, rate-limited queue shared
/// across every monitor, the way a single `reqwest::Client` is shared across
/// all of the teacher's checks rather than one per request.
pub struct VerificationOrchestrator {
    providers: Vec<Arc<dyn VerificationProvider>>,
    local_fallback: Option<Arc<dyn VerificationProvider>>,
    /// The SSL-specific vantage (spec §4.6: "plus an SSL-specific provider
    /// for SSL monitors"), consulted in addition to `providers` whenever
    /// the monitor being verified is a dedicated `ssl` monitor.
    ssl_provider: Option<Arc<dyn SslVerificationProvider>>,
    cache: std::sync::Mutex<HashMap<String, CacheEntry>>,
    last_dispatch: AsyncMutex<Instant>,
    semaphore: Arc<Semaphore>,
    cache_ttl: Duration,
    inter_slot: Duration,
}

impl VerificationOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn VerificationProvider>>,
        local_fallback: Option<Arc<dyn VerificationProvider>>,
        ssl_provider: Option<Arc<dyn SslVerificationProvider>>,
        concurrency: usize,
        cache_ttl_ms: i64,
        inter_slot_ms: u64,
    ) -> Self {
        VerificationOrchestrator {
            providers,
            local_fallback,
            ssl_provider,
            cache: std::sync::Mutex::new(HashMap::new()),
            last_dispatch: AsyncMutex::new(Instant::now() - Duration::from_secs(3600)),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            cache_ttl: Duration::from_millis(cache_ttl_ms.max(0) as u64),
            inter_slot: Duration::from_millis(inter_slot_ms),
        }
    }

    fn cache_key(monitor: &MonitorPolicy) -> String {
        format!("{:?}:{}", monitor.protocol, monitor.target)
    }

    /// Run (or return a cached) verification pass for `monitor`. Entry point
    /// called by the engine when the hysteresis engine confirms a `down` or
    /// `degraded` transition.
    pub async fn verify(&self, monitor: &MonitorPolicy) -> VerificationOutcome {
        let key = Self::cache_key(monitor);
        if let Some(cached) = self.cached(&key) {
            return cached;
        }

        // FIFO admission: one global permit queue plus a minimum spacing
        // between dispatched slots, so a burst of simultaneous outages
        // doesn't hammer the verification providers all at once.
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        {
            let mut last = self.last_dispatch.lock().await;
            let elapsed = last.elapsed();
            if elapsed < self.inter_slot {
                tokio::time::sleep(self.inter_slot - elapsed).await;
            }
            *last = Instant::now();
        }

        let mut results = Vec::with_capacity(self.providers.len() + 1);
        for provider in &self.providers {
            results.push(verify_with_retry(provider.as_ref(), monitor).await);
        }

        if monitor.protocol == ProtocolKind::Ssl {
            if let Some(ssl_provider) = &self.ssl_provider {
                results.push(ssl_provider.verify_ssl(monitor).await);
            }
        }

        if results.is_empty() {
            if let Some(fallback) = &self.local_fallback {
                let mut r = fallback.verify(monitor).await;
                r.region = "Local (Fallback)".to_string();
                results.push(r);
            }
        }

        let outcome = classify(monitor.id.clone(), results);
        self.store(&key, &outcome);
        outcome
    }

    fn cached(&self, key: &str) -> Option<VerificationOutcome> {
        let cache = self.cache.lock().expect("verification cache poisoned");
        cache.get(key).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.cache_ttl {
                Some(entry.outcome.clone())
            } else {
                None
            }
        })
    }

    fn store(&self, key: &str, outcome: &VerificationOutcome) {
        let mut cache = self.cache.lock().expect("verification cache poisoned");
        cache.insert(key.to_string(), CacheEntry { outcome: outcome.clone(), fetched_at: Instant::now() });
    }
}

/// Retry a single provider call up to 3 attempts with exponential backoff
/// (3s, 6s) when its error reads as an upstream rate limit, rather than a
/// genuine connectivity failure worth reporting immediately.
async fn verify_with_retry(provider: &dyn VerificationProvider, monitor: &MonitorPolicy) -> RegionResult {
    let mut delay = Duration::from_secs(3);
    loop {
        let result = provider.verify(monitor).await;
        let rate_limited = result
            .error_message
            .as_deref()
            .map(|m| m.to_lowercase().contains("limit exceeded") || m.to_lowercase().contains("rate limit"))
            .unwrap_or(false);
        if !rate_limited || delay > Duration::from_secs(6) {
            return result;
        }
        tokio::time::sleep(delay).await;
        delay *= 2;
    }
}

fn classify(monitor_id: String, results: Vec<RegionResult>) -> VerificationOutcome {
    let total_count = results.len();
    let success_count = results.iter().filter(|r| r.is_up).count();

    let (classification, severity) = if total_count == 0 {
        (VerificationClassification::GlobalOutage, VerificationSeverity::Warning)
    } else if success_count == 0 {
        let severity = if total_count >= 2 { VerificationSeverity::Critical } else { VerificationSeverity::Warning };
        (VerificationClassification::GlobalOutage, severity)
    } else if (success_count as f64 / total_count as f64) < 0.5 {
        (VerificationClassification::PartialOutage, VerificationSeverity::Warning)
    } else {
        (VerificationClassification::RoutingIssue, VerificationSeverity::Info)
    };

    VerificationOutcome { monitor_id, results, classification, severity, success_count, total_count }
}
