//! Gangway - privileged impersonation sessions for multi-tenant platforms
//!
//! Lets platform operators act inside a customer tenant under tight control:
//! every session is justified, time-boxed, optionally gated behind step-up
//! verification, and recorded in a tamper-evident audit trail.
//!
//! # Components
//!
//! - **Session Manager** ([`SessionManager`]): request, verify, end, revoke,
//!   and resolve sessions; one open session per operator
//! - **Step-Up Verifier** ([`StepUpVerifier`]): TOTP and single-use backup
//!   codes checked against the operator's own enrollment
//! - **Audit Recorder** ([`AuditRecorder`]): append-only, hash-chained, fail
//!   closed when the sink is unavailable
//! - **Authorization Gate** ([`AuthorizationGate`]): per-request decision on
//!   whose behalf a request runs and whether it may
//! - **HTTP** (`http` feature): axum routes and an [`http::ImpersonationLayer`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gangway::{
//!     ImpersonationMode, InMemoryAuditSink, InMemoryImpersonationStore, Justification,
//!     SessionManager, SessionRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> gangway::Result<()> {
//!     gangway::init_tracing();
//!
//!     let manager = SessionManager::builder()
//!         .store(InMemoryImpersonationStore::new())
//!         .directory(my_directory)
//!         .operator_tiers(my_tiers)
//!         .second_factors(my_factors)
//!         .audit_sink(InMemoryAuditSink::new())
//!         .build()?;
//!
//!     let session = manager
//!         .request_session(SessionRequest::new(
//!             "op-1",
//!             "tenant-1",
//!             Some("user-1".into()),
//!             ImpersonationMode::ViewOnly,
//!             Justification::ticket("TICKET-1: investigate"),
//!             30,
//!         ))
//!         .await?;
//!
//!     let context = manager.get_effective_context(&session.id).await?;
//!     println!("acting for {} until {}", context.tenant_id, context.expires_at);
//!     Ok(())
//! }
//! ```

#![allow(async_fn_in_trait)] // async_trait macro handles Send/Sync bounds properly

pub mod audit;
pub mod clock;
mod config;
pub mod directory;
mod error;
pub mod gate;
#[cfg(feature = "http")]
pub mod http;
pub mod session;
pub mod stepup;
pub mod testing;
pub mod tier;
mod utils;

// Re-exports for public API
pub use audit::{AuditEntry, AuditOutcome, AuditRecorder, AuditSink, ChainVerification, InMemoryAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigBuilder, LoggingConfig};
pub use directory::{Directory, InMemoryDirectory, TenantSummary, TenantUser};
pub use error::{ErrorKind, ImpersonationError, Result};
pub use gate::{
    AccessKind, Authorization, AuthorizationGate, GateRequest, ImpersonatedIdentity,
    InMemoryPermissionResolver, PermissionResolver, PermissionSet,
};
pub use session::{
    DenialCause, EffectiveContext, ExpirySweeper, ImpersonationMode, ImpersonationPolicy,
    ImpersonationSession, ImpersonationStore, InMemoryImpersonationStore, Justification,
    JustificationType, SessionManager, SessionManagerBuilder, SessionRequest, SessionStatus,
    SessionStatusView, SweepReport, SweeperConfig, SweeperHandle,
};
pub use stepup::{
    BackupCodeGenerator, InMemorySecondFactorStore, SecondFactorStore, StepUpChallenge,
    StepUpMethod, StepUpVerifier, TotpConfig, TotpVerifier,
};
pub use tier::{InMemoryOperatorTiers, OperatorTier, OperatorTiers, StepUpPolicy, TierExemptionPolicy};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// Call this once, early in `main()`.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "impersonation=debug")
/// - `GANGWAY_LOG_JSON`: Set to "true" for JSON formatted logs
///
/// Every event this crate emits uses a target under `impersonation.`, so
/// `RUST_LOG=impersonation.security_alert=warn` routes just the alerts.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("GANGWAY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
