//! Document-scoped attachment storage service implementation
//!
//! This module provides the [`FilesService`] type, which stores and retrieves the binary
//! attachments referenced by document headers and CC entries.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/
//! └── <scope>/
//!     └── <document_number>/
//!         └── <filename>
//! ```
//!
//! # Security Model
//!
//! - The root path is canonicalised at construction time
//! - Every path segment (scope, document number, file name) is validated so no operation can
//!   escape the root directory
//! - Directories are created lazily on first write

use crate::{FilesError, HASH_ALGORITHM};
use approval_types::NonEmptyText;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Metadata for a stored attachment
///
/// Returned when an attachment is added so callers can record what was stored. The hash
/// allows later integrity checks without re-reading the source.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Hashing algorithm used (always "sha256" for current implementation)
    pub hash_algorithm: NonEmptyText,

    /// Hexadecimal digest of the file content
    pub hash: String,

    /// Path relative to the attachments root where the file is stored
    pub relative_path: NonEmptyText,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// This is a best-effort detection and should not be considered authoritative.
    pub media_type: Option<NonEmptyText>,

    /// File name the attachment is referenced by
    pub original_filename: NonEmptyText,

    /// UTC timestamp when the file was stored
    pub stored_at: DateTime<Utc>,
}

/// Service for managing attachments under one root directory
///
/// The service is cheap to clone and performs no I/O beyond validation in the constructor.
#[derive(Debug, Clone)]
pub struct FilesService {
    /// Canonicalised root directory containing all attachment scopes
    root_directory: PathBuf,
}

impl FilesService {
    /// Creates a new `FilesService` rooted at `root_directory`
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the root does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
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

        Ok(Self { root_directory })
    }

    /// Stores `content` as attachment `filename` of a document
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if a path segment is invalid, the attachment already exists, or
    /// the write fails.
    pub fn add_bytes(
        &self,
        scope: &str,
        document_number: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<FileMetadata, FilesError> {
        let storage_path = self.storage_path(scope, document_number, filename)?;

        if storage_path.exists() {
            return Err(FilesError::FileAlreadyExists(format!(
                "{}/{}/{}",
                scope, document_number, filename
            )));
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

        fs::write(&storage_path, content).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write file to {}: {}", storage_path.display(), e),
            ))
        })?;

        let mut hasher = Sha256::new();
        hasher.update(content);
        let hash = hex::encode(hasher.finalize());

        // Detect media type (best-effort)
        let media_type = infer::get(content).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(FileMetadata {
            hash_algorithm: text(HASH_ALGORITHM)?,
            hash,
            relative_path: text(format!("{}/{}/{}", scope, document_number, filename))?,
            size_bytes: content.len() as u64,
            media_type,
            original_filename: text(filename)?,
            stored_at: Utc::now(),
        })
    }

    /// Reads an attachment
    ///
    /// # Errors
    ///
    /// Returns `FilesError::NotFound` if the attachment is not stored, or an I/O error.
    pub fn read(
        &self,
        scope: &str,
        document_number: &str,
        filename: &str,
    ) -> Result<Vec<u8>, FilesError> {
        let storage_path = self.storage_path(scope, document_number, filename)?;

        if !storage_path.exists() {
            return Err(FilesError::NotFound(format!(
                "{}/{}/{}",
                scope, document_number, filename
            )));
        }

        fs::read(&storage_path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read file from {}: {}", storage_path.display(), e),
            ))
        })
    }

    /// Returns true when the attachment is stored.
    pub fn exists(&self, scope: &str, document_number: &str, filename: &str) -> bool {
        self.storage_path(scope, document_number, filename)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Deletes an attachment
    ///
    /// Idempotent: deleting an attachment that is already absent succeeds.
    ///
    /// # Returns
    ///
    /// `true` if a file was removed, `false` if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidPath` for unsafe path segments, or an I/O error other
    /// than "not found".
    pub fn delete(
        &self,
        scope: &str,
        document_number: &str,
        filename: &str,
    ) -> Result<bool, FilesError> {
        let storage_path = self.storage_path(scope, document_number, filename)?;

        match fs::remove_file(&storage_path) {
            Ok(()) => {
                tracing::debug!("deleted attachment {}", storage_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to delete file {}: {}", storage_path.display(), e),
            ))),
        }
    }

    /// Returns the canonicalised root directory
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Computes the absolute storage path after validating every segment
    fn storage_path(
        &self,
        scope: &str,
        document_number: &str,
        filename: &str,
    ) -> Result<PathBuf, FilesError> {
        validate_segment(scope)?;
        validate_segment(document_number)?;
        validate_segment(filename)?;

        Ok(self
            .root_directory
            .join(scope)
            .join(document_number)
            .join(filename))
    }
}

/// Rejects empty, hidden, traversal and multi-component path segments.
fn validate_segment(segment: &str) -> Result<(), FilesError> {
    let trimmed = segment.trim();
    if trimmed.is_empty()
        || trimmed != segment
        || segment.starts_with('.')
        || segment.contains(['/', '\\', '\0'])
        || segment.contains("..")
    {
        return Err(FilesError::InvalidPath(format!(
            "Unsafe path segment: {:?}",
            segment
        )));
    }
    Ok(())
}

fn text(value: impl AsRef<str>) -> Result<NonEmptyText, FilesError> {
    NonEmptyText::new(value.as_ref())
        .map_err(|_| FilesError::InvalidPath(format!("Empty metadata value: {:?}", value.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FilesService) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("attachments");
        fs::create_dir_all(&root).unwrap();
        let service = FilesService::new(&root).unwrap();
        (temp, service)
    }

    #[test]
    fn test_files_service_root_not_exists() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("non-existent");

        let service = FilesService::new(&root);

        assert!(matches!(service, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_files_service_root_not_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("file.txt");
        fs::write(&root, "not a directory").unwrap();

        let service = FilesService::new(&root);

        assert!(matches!(service, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_add_file_success() {
        let (temp, service) = setup();

        let metadata = service
            .add_bytes("bpb", "BPB-JPJL-2026-0001", "handover.txt", b"Hello, World!")
            .unwrap();
        assert!(!temp.path().join("handover.txt").exists());

        assert_eq!(metadata.hash_algorithm.as_str(), "sha256");
        assert_eq!(metadata.size_bytes, 13);
        assert_eq!(metadata.original_filename.as_str(), "handover.txt");
        assert_eq!(metadata.hash.len(), 64);
        assert_eq!(
            metadata.relative_path.as_str(),
            "bpb/BPB-JPJL-2026-0001/handover.txt"
        );

        let stored = service
            .read("bpb", "BPB-JPJL-2026-0001", "handover.txt")
            .unwrap();
        assert_eq!(stored, b"Hello, World!");
    }

    #[test]
    fn test_add_file_immutability() {
        let (_temp, service) = setup();

        service
            .add_bytes("helpdesk", "HD-ITSP-2026-0001", "log.txt", b"first")
            .unwrap();
        let second = service.add_bytes("helpdesk", "HD-ITSP-2026-0001", "log.txt", b"second");

        assert!(matches!(second, Err(FilesError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_add_file_with_media_type() {
        let (_temp, service) = setup();

        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let metadata = service
            .add_bytes("bpb", "BPB-JPJL-2026-0002", "photo.png", &png_header)
            .unwrap();

        assert_eq!(
            metadata.media_type.as_ref().map(|t| t.as_str()),
            Some("image/png")
        );
    }

    #[test]
    fn test_read_file_not_found() {
        let (_temp, service) = setup();

        let result = service.read("bpb", "BPB-JPJL-2026-0001", "missing.pdf");

        assert!(matches!(result, Err(FilesError::NotFound(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_temp, service) = setup();

        service
            .add_bytes("bpb", "BPB-JPJL-2026-0001", "form.pdf", b"%PDF")
            .unwrap();
        assert!(service.exists("bpb", "BPB-JPJL-2026-0001", "form.pdf"));

        assert!(service.delete("bpb", "BPB-JPJL-2026-0001", "form.pdf").unwrap());
        assert!(!service.delete("bpb", "BPB-JPJL-2026-0001", "form.pdf").unwrap());
        assert!(!service.exists("bpb", "BPB-JPJL-2026-0001", "form.pdf"));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_temp, service) = setup();

        for bad in ["..", "../etc", "a/b", ".hidden", "", " padded"] {
            let result = service.add_bytes("bpb", "BPB-JPJL-2026-0001", bad, b"x");
            assert!(
                matches!(result, Err(FilesError::InvalidPath(_))),
                "expected {:?} to be rejected",
                bad
            );
        }

        let result = service.delete("../bpb", "BPB-JPJL-2026-0001", "form.pdf");
        assert!(matches!(result, Err(FilesError::InvalidPath(_))));
    }

    #[test]
    fn test_documents_are_isolated() {
        let (_temp, service) = setup();

        service
            .add_bytes("bpb", "BPB-JPJL-2026-0001", "form.pdf", b"one")
            .unwrap();
        service
            .add_bytes("bpb", "BPB-JPJL-2026-0002", "form.pdf", b"two")
            .unwrap();

        assert_eq!(
            service.read("bpb", "BPB-JPJL-2026-0001", "form.pdf").unwrap(),
            b"one"
        );
        assert_eq!(
            service.read("bpb", "BPB-JPJL-2026-0002", "form.pdf").unwrap(),
            b"two"
        );
    }

    #[test]
    fn test_file_metadata_serialization() {
        let (_temp, service) = setup();

        let metadata = service
            .add_bytes("bpb", "BPB-JPJL-2026-0001", "form.pdf", b"content")
            .unwrap();

        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: FileMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }
}
