//! Step-up verification.
//!
//! Proves an operator's identity a second time before act-as capability is
//! granted. Supports TOTP and single-use backup codes, always checked against
//! the operator's own enrollment.
//!
//! # Example
//!
//! ```rust,ignore
//! use gangway::stepup::{BackupCodeGenerator, TotpConfig, TotpVerifier};
//!
//! // Enroll an operator
//! let totp = TotpVerifier::new(TotpConfig::new("Support Console"));
//! let setup = totp.generate_setup("op-42")?;
//!
//! // Backup codes: show `codes` once, store `hashes`
//! let backup = BackupCodeGenerator::new().generate();
//! println!("Save these codes: {:?}", backup.display_codes());
//! ```

mod backup;
mod challenge;
mod storage;
mod totp;
mod verifier;

pub use backup::{BackupCodeGenerator, BackupCodes, hash_backup_code, normalize_backup_code};
pub use challenge::{FailureReason, StepUpChallenge, StepUpMethod};
pub use storage::{InMemorySecondFactorStore, SecondFactorStore};
pub use totp::{TotpConfig, TotpSetup, TotpVerifier};
pub use verifier::{StepUpVerifier, Verification};
