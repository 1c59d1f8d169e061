//! Constants used throughout the approval core crate.
//!
//! This module contains organisational conventions, path and filename constants to ensure
//! consistency across the codebase and make maintenance easier.

/// Default code of the top authority at the root of the org tree.
pub const DEFAULT_TOP_AUTHORITY: &str = "MGMG";

/// Default suffix that turns a department code into its head's user code.
pub const DEFAULT_HEAD_SUFFIX: &str = "-01";

/// Length of a bare department code (e.g. `JPJL`).
pub const DEPARTMENT_CODE_LEN: usize = 4;

/// Default directory for workflow data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "approval_data";

/// Default domain used to build commit e-mail addresses for actors.
pub const DEFAULT_COMMIT_EMAIL_DOMAIN: &str = "approvals.local";

/// Directory name for versioned document records.
pub const DOCUMENTS_DIR_NAME: &str = "documents";

/// Directory name for attachment storage (not versioned).
pub const ATTACHMENTS_DIR_NAME: &str = "attachments";

/// Directory name for org master data.
pub const ORG_DIR_NAME: &str = "org";

/// Filename for a document header.
pub const HEADER_FILENAME: &str = "header.yaml";

/// Filename for a document CC list.
pub const CC_LIST_FILENAME: &str = "cc.yaml";

/// Filename for a document note ledger.
pub const NOTES_FILENAME: &str = "notes.yaml";

/// Filename for document detail lines.
pub const DETAILS_FILENAME: &str = "details.yaml";

/// Filename for the pending notification set of a document.
pub const NOTIFICATIONS_FILENAME: &str = "notifications.yaml";

/// Filename for org users.
pub const USERS_FILENAME: &str = "users.yaml";

/// Filename for org departments.
pub const DEPARTMENTS_FILENAME: &str = "departments.yaml";

/// Author recorded on notes written by the workflow itself.
pub const SYSTEM_AUTHOR: &str = "system";

/// Text placed after an escalated mention marker in a review-request comment.
pub const ADDED_BY_SYSTEM_MARKER: &str = "! (added by system)";

/// Number of digits in the sequence part of a document number.
pub const SEQUENCE_WIDTH: usize = 4;

/// Upper bound on attempts when reserving a document number under contention.
pub const MAX_SEQUENCE_ATTEMPTS: usize = 16;
