//! Testing utilities for code built on gangway.
//!
//! [`Harness`] wires a [`SessionManager`] to in-memory stores and a
//! [`ManualClock`], with one support operator enrolled in TOTP and backup
//! codes, one exempt operator, and a small tenant directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use gangway::testing::Harness;
//! use gangway::{ImpersonationMode, SessionStatus, StepUpMethod};
//!
//! #[tokio::test]
//! async fn act_as_requires_step_up() {
//!     let h = Harness::new().await;
//!     let session = h.request(ImpersonationMode::ActAs, 60).await.unwrap();
//!     assert_eq!(session.status, SessionStatus::PendingStepUp);
//!
//!     let code = h.totp_code();
//!     let session = h.manager.complete_step_up(&session.id, &code, StepUpMethod::Totp).await.unwrap();
//!     assert_eq!(session.status, SessionStatus::Active);
//! }
//! ```

use crate::audit::InMemoryAuditSink;
use crate::clock::{Clock, ManualClock};
use crate::directory::InMemoryDirectory;
use crate::error::Result;
use crate::gate::{AuthorizationGate, InMemoryPermissionResolver, PermissionSet};
use crate::session::{
    ImpersonationMode, ImpersonationPolicy, ImpersonationSession, InMemoryImpersonationStore,
    Justification, SessionManager, SessionRequest,
};
use crate::stepup::{
    BackupCodeGenerator, BackupCodes, InMemorySecondFactorStore, StepUpMethod, TotpVerifier,
};
use crate::tier::{InMemoryOperatorTiers, OperatorTier};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

/// Support-tier operator. Needs step-up for act-as.
pub const OPERATOR: &str = "op-support-1";
/// Second support-tier operator, also enrolled.
pub const OTHER_OPERATOR: &str = "op-support-2";
/// Operator whose tier is exempt from step-up.
pub const EXEMPT_OPERATOR: &str = "op-super-1";
/// Active tenant with two users.
pub const TENANT: &str = "tenant-acme";
/// A user in [`TENANT`].
pub const USER: &str = "user-alice";
/// Another user in [`TENANT`].
pub const OTHER_USER: &str = "user-bob";
/// A suspended tenant with no users.
pub const INACTIVE_TENANT: &str = "tenant-dormant";

/// A fully wired in-memory deployment.
pub struct Harness {
    pub manager: SessionManager,
    pub gate: AuthorizationGate,
    pub clock: ManualClock,
    pub store: InMemoryImpersonationStore,
    pub directory: InMemoryDirectory,
    pub tiers: InMemoryOperatorTiers,
    pub factors: InMemorySecondFactorStore,
    pub permissions: InMemoryPermissionResolver,
    pub audit_sink: InMemoryAuditSink,
    /// TOTP secret shared by [`OPERATOR`] and [`OTHER_OPERATOR`].
    pub totp_secret: String,
    /// Plain backup codes issued to [`OPERATOR`].
    pub backup_codes: BackupCodes,
}

impl Harness {
    /// Harness with the default policy.
    pub async fn new() -> Self {
        Self::with_policy(ImpersonationPolicy::default()).await
    }

    /// Harness with a custom policy.
    ///
    /// # Panics
    ///
    /// Panics if the policy is invalid.
    pub async fn with_policy(policy: ImpersonationPolicy) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap());
        let store = InMemoryImpersonationStore::new();
        let directory = InMemoryDirectory::new();
        let tiers = InMemoryOperatorTiers::new();
        let factors = InMemorySecondFactorStore::new();
        let permissions = InMemoryPermissionResolver::new();
        let audit_sink = InMemoryAuditSink::new();

        directory.add_tenant(TENANT, "Acme Corp", true).await;
        directory.add_tenant(INACTIVE_TENANT, "Dormant Ltd", false).await;
        directory
            .add_user(TENANT, USER, "alice@acme.test", "admin")
            .await;
        directory
            .add_user(TENANT, OTHER_USER, "bob@acme.test", "member")
            .await;

        tiers.set_tier(OPERATOR, OperatorTier::support()).await;
        tiers.set_tier(OTHER_OPERATOR, OperatorTier::support()).await;
        tiers
            .set_tier(EXEMPT_OPERATOR, OperatorTier::super_operator())
            .await;

        let totp_secret = TotpVerifier::new(Default::default())
            .generate_setup(OPERATOR)
            .unwrap()
            .secret;
        factors.set_totp_secret(OPERATOR, totp_secret.clone()).await;
        factors
            .set_totp_secret(OTHER_OPERATOR, totp_secret.clone())
            .await;

        let backup_codes = BackupCodeGenerator::new().generate();
        factors
            .set_backup_codes(OPERATOR, backup_codes.hashes.clone())
            .await;

        permissions
            .grant(
                TENANT,
                Some(USER),
                PermissionSet::from_iter(["projects.*", "invoices.read"]),
            )
            .await;
        permissions
            .grant(TENANT, None, PermissionSet::from_iter(["*.read"]))
            .await;

        let manager = SessionManager::builder()
            .store(store.clone())
            .directory(directory.clone())
            .operator_tiers(tiers.clone())
            .second_factors(factors.clone())
            .audit_sink(audit_sink.clone())
            .clock(clock.clone())
            .policy(policy)
            .build()
            .unwrap();
        let gate = AuthorizationGate::new(manager.clone(), Arc::new(permissions.clone()));

        Self {
            manager,
            gate,
            clock,
            store,
            directory,
            tiers,
            factors,
            permissions,
            audit_sink,
            totp_secret,
            backup_codes,
        }
    }

    /// A request from [`OPERATOR`] for [`USER`] in [`TENANT`].
    pub fn session_request(&self, mode: ImpersonationMode, duration_minutes: u32) -> SessionRequest {
        SessionRequest::new(
            OPERATOR,
            TENANT,
            Some(USER.to_string()),
            mode,
            Justification::ticket("TICKET-1: investigate"),
            duration_minutes,
        )
    }

    /// Submit [`Harness::session_request`].
    pub async fn request(
        &self,
        mode: ImpersonationMode,
        duration_minutes: u32,
    ) -> Result<ImpersonationSession> {
        self.manager
            .request_session(self.session_request(mode, duration_minutes))
            .await
    }

    /// Request an act-as session and verify it with a fresh TOTP code.
    ///
    /// # Panics
    ///
    /// Panics if any step fails.
    pub async fn activate_act_as(&self, duration_minutes: u32) -> ImpersonationSession {
        let session = self
            .request(ImpersonationMode::ActAs, duration_minutes)
            .await
            .unwrap();
        self.manager.begin_step_up(&session.id).await.unwrap();
        self.manager
            .complete_step_up(&session.id, &self.totp_code(), StepUpMethod::Totp)
            .await
            .unwrap()
    }

    /// The operator's TOTP code at the harness clock's current time.
    ///
    /// # Panics
    ///
    /// Panics if the secret is invalid.
    pub fn totp_code(&self) -> String {
        let now = self.clock.now().timestamp() as u64;
        self.manager
            .verifier()
            .totp()
            .generate_at(&self.totp_secret, now)
            .unwrap()
    }

    /// A code that is well-formed but never correct for the current window.
    pub fn wrong_totp_code(&self) -> String {
        let current = self.totp_code();
        let mut candidate = 0u32;
        loop {
            let code = format!("{candidate:06}");
            if code != current && !self.accepts_nearby(&code) {
                return code;
            }
            candidate += 1;
        }
    }

    fn accepts_nearby(&self, code: &str) -> bool {
        let now = self.clock.now().timestamp() as u64;
        self.manager
            .verifier()
            .totp()
            .matching_step(&self.totp_secret, code, now)
            .map(|step| step.is_some())
            .unwrap_or(false)
    }
}
