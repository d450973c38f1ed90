//! Multi-protocol uptime monitoring health-state engine: classifies probe
//! results, confirms state transitions through a hysteresis layer,
//! verifies suspected outages from remote vantages, and manages incident
//! lifecycle and event publication. A library, not a service — the HTTP
//! API, persistence, scheduler, and probe drivers are external
//! collaborators, consumed through the trait seams this crate defines.

pub mod baseline;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hysteresis;
pub mod incident;
pub mod model;
pub mod state_store;
pub mod verification;
pub mod window;

pub use config::{EngineConfig, MonitorPolicy, ProtocolKind};
pub use engine::Engine;
pub use error::{EngineError, ErrorKind};
pub use events::{BroadcastEventTransport, EventTransport};
pub use incident::{IncidentRepository, InMemoryIncidentRepository};
pub use model::{
    CheckRecord, Decision, HealthEvent, HealthState, HealthStatistics, Incident, IncidentSeverity, IncidentStatus,
    MonitorState, ProbeMeta, ProbeResult, RegionResult, SslInfo, Transition, Verdict, VerificationClassification,
    VerificationOutcome, VerificationSeverity,
};
pub use verification::{
    HickoryDnsProvider, ReqwestRegionProvider, SslVerificationProvider, TlsCertVerificationProvider,
    VerificationOrchestrator, VerificationProvider,
};
