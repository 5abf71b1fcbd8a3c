//! Owner-scoped document blob storage.
//!
//! [`DocumentsService`] is bound to one owner record (a patient directory) and stores
//! uploaded bytes by SHA-256 digest. The constructor validates that the owner exists;
//! blob directories are created lazily on first upload.

use crate::{FilesError, DOCUMENTS_FOLDER_NAME};
use chrono::{DateTime, Utc};
use portal_types::NonEmptyText;
use portal_uuid::{Sha256Hash, ShardableUuid};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata for a stored document.
///
/// Appended to the owner's profile so the portal can list and fetch documents without
/// touching the blob store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Hexadecimal SHA-256 digest of the content
    pub hash: Sha256Hash,

    /// Path relative to the owner directory
    pub relative_path: NonEmptyText,

    pub size_bytes: u64,

    /// Sniffed media type; best-effort, `None` when unrecognised
    pub media_type: Option<NonEmptyText>,

    /// Filename as uploaded
    pub original_filename: NonEmptyText,

    pub stored_at: DateTime<Utc>,
}

/// Document storage for a single owner record.
#[derive(Debug)]
pub struct DocumentsService {
    root_directory: PathBuf,
    owner_id: ShardableUuid,
}

impl DocumentsService {
    /// Creates a `DocumentsService` for one owner.
    ///
    /// # Arguments
    ///
    /// * `root_directory` - Directory holding owner records of one kind (e.g. `patients/`)
    /// * `owner_id` - Identifier of the owning record
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the root or the owner's sharded directory is missing or
    /// is not a directory, or if the root cannot be canonicalised.
    pub fn new(root_directory: &Path, owner_id: ShardableUuid) -> Result<Self, FilesError> {
        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        let owner_root = owner_id.sharded_dir(&root_directory);
        if !owner_root.is_dir() {
            return Err(FilesError::OwnerNotFound(format!(
                "Owner directory does not exist: {}",
                owner_root.display()
            )));
        }

        Ok(Self {
            root_directory,
            owner_id,
        })
    }

    /// Stores `bytes` under their SHA-256 digest.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `filename` is blank or contains a path separator
    /// - identical content is already stored for this owner
    /// - the blob directory or file cannot be written
    pub fn add_bytes(&self, filename: &str, bytes: &[u8]) -> Result<DocumentMetadata, FilesError> {
        let original_filename = NonEmptyText::new(filename)
            .map_err(|_| FilesError::InvalidFilename(filename.to_owned()))?;
        if original_filename.as_str().contains(['/', '\\'])
            || original_filename.as_str() == ".."
        {
            return Err(FilesError::InvalidFilename(filename.to_owned()));
        }

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let hash = Sha256Hash::from_bytes(&digest);

        let relative_path = Self::relative_path(&hash);
        let storage_path = self.owner_root().join(relative_path.as_str());

        if storage_path.exists() {
            return Err(FilesError::DocumentAlreadyExists(hash.to_string()));
        }

        if let Some(parent) = storage_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create storage directory {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;
        }

        fs::write(&storage_path, bytes).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write document to {}: {}", storage_path.display(), e),
            ))
        })?;

        let media_type = infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(DocumentMetadata {
            hash,
            relative_path,
            size_bytes: bytes.len() as u64,
            media_type,
            original_filename,
            stored_at: Utc::now(),
        })
    }

    /// Reads a stored document by its hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Uuid`] for a malformed digest, [`FilesError::DocumentNotFound`]
    /// if nothing is stored under it, or an I/O error if the read fails.
    pub fn read(&self, hash: &str) -> Result<Vec<u8>, FilesError> {
        let hash = Sha256Hash::parse(hash)?;
        let storage_path = self.owner_root().join(Self::relative_path(&hash).as_str());

        if !storage_path.is_file() {
            return Err(FilesError::DocumentNotFound(hash.to_string()));
        }

        fs::read(&storage_path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read document from {}: {}", storage_path.display(), e),
            ))
        })
    }

    /// Deletes a stored document. Used to discard a blob whose upload could not be
    /// recorded on the owner's profile.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::DocumentNotFound`] if nothing is stored under `hash`.
    pub fn remove(&self, hash: &str) -> Result<(), FilesError> {
        let hash = Sha256Hash::parse(hash)?;
        let storage_path = self.owner_root().join(Self::relative_path(&hash).as_str());

        if !storage_path.is_file() {
            return Err(FilesError::DocumentNotFound(hash.to_string()));
        }

        fs::remove_file(&storage_path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to remove document {}: {}", storage_path.display(), e),
            ))
        })
    }

    pub fn owner_id(&self) -> &ShardableUuid {
        &self.owner_id
    }

    /// `documents/sha256/<ab>/<cd>/<hash>`
    fn relative_path(hash: &Sha256Hash) -> NonEmptyText {
        let hex = hash.as_str();
        NonEmptyText::new(format!(
            "{}/sha256/{}/{}/{}",
            DOCUMENTS_FOLDER_NAME,
            &hex[0..2],
            &hex[2..4],
            hex
        ))
        .unwrap_or_else(|_| unreachable!("formatted path always has content"))
    }

    fn owner_root(&self) -> PathBuf {
        self.owner_id.sharded_dir(&self.root_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_owner(root: &Path, id: &ShardableUuid) {
        fs::create_dir_all(id.sharded_dir(root)).expect("Failed to create owner directory");
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = DocumentsService::new(&temp.path().join("missing"), ShardableUuid::new());

        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_new_rejects_missing_owner() {
        let temp = TempDir::new().unwrap();
        let result = DocumentsService::new(temp.path(), ShardableUuid::new());

        assert!(matches!(result, Err(FilesError::OwnerNotFound(_))));
    }

    #[test]
    fn test_add_and_read_document() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner.clone()).unwrap();
        let metadata = service.add_bytes("lab-results.txt", b"Hb 13.2 g/dL").unwrap();

        assert_eq!(metadata.size_bytes, 12);
        assert_eq!(metadata.original_filename.as_str(), "lab-results.txt");
        assert!(metadata
            .relative_path
            .as_str()
            .starts_with("documents/sha256/"));

        let stored = service.read(metadata.hash.as_str()).unwrap();
        assert_eq!(stored, b"Hb 13.2 g/dL");
    }

    #[test]
    fn test_add_duplicate_content_is_rejected() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner).unwrap();
        service.add_bytes("a.txt", b"same").unwrap();
        let second = service.add_bytes("b.txt", b"same");

        assert!(matches!(second, Err(FilesError::DocumentAlreadyExists(_))));
    }

    #[test]
    fn test_add_detects_png_media_type() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner).unwrap();
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let metadata = service.add_bytes("scan.png", &png_header).unwrap();

        assert_eq!(
            metadata.media_type.as_ref().map(|t| t.as_str()),
            Some("image/png")
        );
    }

    #[test]
    fn test_add_rejects_path_like_filename() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner).unwrap();

        assert!(matches!(
            service.add_bytes("../escape.txt", b"x"),
            Err(FilesError::InvalidFilename(_))
        ));
        assert!(matches!(
            service.add_bytes("  ", b"x"),
            Err(FilesError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_read_unknown_hash_is_not_found() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner).unwrap();
        let result = service.read(&"0".repeat(64));

        assert!(matches!(result, Err(FilesError::DocumentNotFound(_))));
    }

    #[test]
    fn test_read_rejects_malformed_hash() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner).unwrap();

        assert!(matches!(service.read("../../x"), Err(FilesError::Uuid(_))));
    }

    #[test]
    fn test_remove_allows_the_same_content_again() {
        let temp = TempDir::new().unwrap();
        let owner = ShardableUuid::new();
        create_owner(temp.path(), &owner);

        let service = DocumentsService::new(temp.path(), owner).unwrap();
        let metadata = service.add_bytes("a.txt", b"discard me").unwrap();

        service.remove(metadata.hash.as_str()).unwrap();

        assert!(matches!(
            service.read(metadata.hash.as_str()),
            Err(FilesError::DocumentNotFound(_))
        ));
        assert!(matches!(
            service.remove(metadata.hash.as_str()),
            Err(FilesError::DocumentNotFound(_))
        ));
        assert!(service.add_bytes("a.txt", b"discard me").is_ok());
    }
}
