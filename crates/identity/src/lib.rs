//! Biometric enrollment and the Global Uniqueness Registry for Pramaan.
//!
//! # Core Concepts
//!
//! - **Registry**: one row per biometric commitment across every organization,
//!   with uniqueness enforced by SQLite constraints
//! - **Enrollment**: commitment/nullifier derivation, salt sealing, registration
//! - **Revocation**: administrative reset that retires a whole salt lineage
//!
//! # Privacy
//!
//! A rejected duplicate never reveals which scholar or organization holds the
//! conflicting commitment, neither in the error nor in the audit event.

pub mod enrollment;
pub mod error;
pub mod registry;

pub use enrollment::{EnrollmentReceipt, EnrollmentRequest, EnrollmentService};
pub use error::{IdentityError, Result};
pub use registry::{
    BiometricRegistry, CommitmentDirectory, EnrollmentStatus, NewRegistration,
    RegistrationResult, RegistryEntry, SUSPICIOUS_ATTEMPT_THRESHOLD,
};
