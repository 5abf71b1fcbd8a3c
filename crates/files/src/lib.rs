//! Portal document storage
//!
//! Patients upload documents (referral letters, lab results, scans) through the portal.
//! The profile record keeps only a reference; the bytes live in a content-addressed store
//! beside the owner's record directory:
//!
//! ```text
//! patients/
//! └── <s1>/<s2>/<patient_id>/
//!     ├── patient.yaml
//!     └── documents/        # binary blobs, never rewritten
//!         └── sha256/
//!             └── ab/
//!                 └── cd/
//!                     └── abcd3f9e…
//! ```
//!
//! - Blobs are immutable once stored; identical content is rejected as a duplicate
//! - The profile record stays valid if the blob store is absent
//! - Storage is scoped per owner, there is no cross-patient namespace
//!
//! ## Example Usage
//!
//! ```no_run
//! use portal_files::DocumentsService;
//! use portal_uuid::ShardableUuid;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new("portal_data/patients");
//! let owner = ShardableUuid::parse("550e8400e29b41d4a716446655440000")?;
//!
//! let service = DocumentsService::new(root, owner)?;
//! let metadata = service.add_bytes("referral.pdf", b"%PDF-1.7")?;
//! let bytes = service.read(metadata.hash.as_str())?;
//! # Ok(())
//! # }
//! ```

mod documents;

pub use documents::{DocumentMetadata, DocumentsService};
pub use portal_uuid::ShardableUuid;

/// Name of the per-owner folder holding document blobs.
pub const DOCUMENTS_FOLDER_NAME: &str = "documents";

/// Errors that can occur during document operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Owner record directory does not exist
    #[error("Owner record not found: {0}")]
    OwnerNotFound(String),

    /// Filename is empty or contains path separators
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Document with identical content already stored
    #[error("Document with hash {0} already exists in storage")]
    DocumentAlreadyExists(String),

    /// No document stored under the requested hash
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Identifier or hash failed validation
    #[error("UUID error: {0}")]
    Uuid(#[from] portal_uuid::UuidError),
}
