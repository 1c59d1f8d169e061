//! Attachment storage for approval documents.
//!
//! Attachments (scanned handover forms, screenshots, signed approvals) are binary files that
//! live beside the versioned document records but are never committed with them.
//!
//! ## Design Principles
//!
//! - Document records reference attachments by file name only
//! - Binary files are not tracked in Git
//! - A stored attachment is immutable; replacing it means storing a new name
//! - Deletion is idempotent so callers can clean up superseded files best-effort
//!
//! ## Storage Model
//!
//! ```text
//! <attachments_root>/
//! └── <scope>/                # document kind, e.g. bpb or helpdesk
//!     └── <document_number>/
//!         └── <filename>
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use approval_files::FilesService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FilesService::new(Path::new("approval_data/attachments"))?;
//! let metadata = service.add_bytes("bpb", "BPB-JPJL-2026-0001", "form.pdf", b"%PDF-1.7")?;
//! service.delete("bpb", "BPB-JPJL-2026-0001", metadata.original_filename.as_str())?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;

pub use constants::HASH_ALGORITHM;
pub use files::{FileMetadata, FilesService};

/// Errors that can occur during attachment operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// An attachment with the same name is already stored for this document
    #[error("Attachment already exists: {0}")]
    FileAlreadyExists(String),

    /// The requested attachment is not stored
    #[error("Attachment not found: {0}")]
    NotFound(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
