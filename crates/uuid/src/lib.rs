//! Identifier and sharded-path utilities for the care portal.
//!
//! Patients and facilities are stored under sharded directories derived from their
//! identifier. Identifiers issued by the portal use a *canonical* form: **32 lowercase
//! hexadecimal characters** (no hyphens), the same value produced by
//! `Uuid::new_v4().simple().to_string()`.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u` the record lives at:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `portal_data/patients/55/0e/550e8400e29b41d4a716446655440000/`
//!
//! Documents are content addressed by [`Sha256Hash`] and sharded the same way on the
//! first four hex characters of the digest.

mod service;

pub use service::{Sha256Hash, ShardableUuid, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
