//! Attendance challenges, proof verification and session records for Pramaan.
//!
//! # Flow
//!
//! 1. An organization issues a single-use [`Challenge`](pramaan_core::Challenge)
//! 2. The scholar's device proves knowledge of its enrolled commitment
//!    preimage, bound to that challenge
//! 3. [`AttendanceService::submit`] records a pending attempt, runs the
//!    verification stages cheapest first, and atomically consumes the
//!    challenge and session nullifier on success
//!
//! Pending records whose challenge lapses are expired by a background sweep
//! or on read.

pub mod challenge;
pub mod error;
pub mod geofence;
pub mod pipeline;
pub mod service;
pub mod state;
pub mod store;

pub use challenge::ChallengeIssuer;
pub use error::{AttendanceError, Result};
pub use geofence::{LocationPolicy, LocationVerdict};
pub use pipeline::{BoundInputs, Rejection, VerificationPipeline, VerificationRequest};
pub use service::{AttendanceService, Submission, SubmissionOutcome};
pub use state::{AttendanceRecord, AttendanceStatus};
pub use store::{AttendanceStore, ChallengeState, CommitOutcome, Consumption, OverrideEntry};
