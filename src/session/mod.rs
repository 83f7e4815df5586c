//! Impersonation sessions: lifecycle, policy, and storage.
//!
//! [`SessionManager`] is the only writer. It drives the state machine in
//! `machine`, enforces [`ImpersonationPolicy`], and records every transition
//! through the audit recorder before the caller sees the result.

mod in_memory;
mod locks;
mod machine;
mod manager;
mod policy;
mod storage;
mod sweeper;
mod types;

pub use in_memory::InMemoryImpersonationStore;
pub use machine::{ActivationProof, InvalidTransition, NewSession, generate_session_id};
pub use manager::{SessionManager, SessionManagerBuilder, SweepReport};
pub use policy::{
    DEFAULT_ALLOWED_DURATIONS, DEFAULT_MAX_STEP_UP_ATTEMPTS, DEFAULT_PENDING_STEP_UP_SECS,
    ImpersonationPolicy,
};
pub use storage::ImpersonationStore;
pub use sweeper::{ExpirySweeper, SweeperConfig, SweeperHandle};
pub use types::{
    DenialCause, EffectiveContext, EndReason, ImpersonationMode, ImpersonationSession,
    Justification, JustificationType, SessionRequest, SessionStatus, SessionStatusView,
};
