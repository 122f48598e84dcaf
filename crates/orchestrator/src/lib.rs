//! Orchestration engine for continuous code sniffing
//!
//! Wires the analyzer registry, the sniffing loop, the results cache, the
//! audit trail and host monitoring into [`SniffOrchestrator`].
//!
//! # Architecture
//!
//! - **SniffingLoop**: bounded ingestion, per-file fan-out/fan-in, per-domain workers
//! - **ResultsCache**: latest aggregated result per file, swapped atomically
//! - **AuditLog**: append-only trail owned by a single writer task
//! - **ReportWriter**: per-domain and per-run JSON reports
//! - **FixAdvisor**: confidence-gated boundary to the scoring oracle
//! - **MonitoringSystem**: metrics, health checks, alerts and retention
//!
//! # Usage
//!
//! ```no_run
//! use common::SniffConfig;
//! use orchestrator::SniffOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = analyzers::builtin_registry()?;
//!     let orchestrator = SniffOrchestrator::new(SniffConfig::default(), registry, None).await?;
//!     orchestrator.start().await;
//!
//!     let result = orchestrator.run_file_sniffing("src/app.py", &[]).await;
//!     println!("{}: {} issues", result.status, result.issue_count);
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod cache;
pub mod degradation;
pub mod monitoring;
pub mod orchestrator;
pub mod reports;
pub mod scoring;
pub mod sniffing_loop;
pub mod storage;

pub use audit::AuditLog;
pub use cache::ResultsCache;
pub use degradation::{DegradationTracker, DegradedEntry};
pub use monitoring::{
    Alert, AlertDispatcher, AlertSeverity, CheckResult, HealthReport, HealthState,
    MetricSnapshot, MonitoringSystem, NotificationSender, ResourceProbe, SysinfoProbe,
};
pub use orchestrator::{HookOutcome, OrchestratorBuilder, SniffOrchestrator};
pub use reports::ReportWriter;
pub use scoring::{FixAdvisor, HttpScoringOracle};
pub use sniffing_loop::{FileLease, LoopSettings, SniffingLoop};
