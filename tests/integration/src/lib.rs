//! End-to-end tests for the Pramaan attendance core
//!
//! This test suite validates:
//! - Enrollment through proof verification over on-disk stores
//! - Replay and concurrent double-submission handling
//! - Global uniqueness and revocation across organizations
//! - Commitment determinism and collision resistance

pub mod test_utils;

#[cfg(test)]
mod end_to_end_tests;

#[cfg(test)]
mod replay_attack_tests;

#[cfg(test)]
mod uniqueness_tests;

#[cfg(test)]
mod commitment_property_tests;
