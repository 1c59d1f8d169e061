//! # Approval Core
//!
//! Core business logic for the BPB / Helpdesk document approval workflow.
//!
//! This crate contains pure data operations and file/folder management:
//! - The approval chain engine, review-mention expansion and escalation-aware mention removal
//! - Per-scope document numbering
//! - The append-only note ledger and notification fan-out
//! - A git-backed document store with one repository per document under the data directory
//! - [`DocumentService`], which runs every client operation as one committed transaction
//!
//! **No API concerns**: authentication, HTTP servers and CLI parsing belong in `api-rest` and
//! `cli`.

pub mod author;
pub mod config;
pub mod constants;
pub mod document;
pub mod engine;
mod error;
pub mod fanout;
pub mod notes;
pub mod org;
mod records;
pub mod sequence;
pub mod service;
pub mod store;
pub mod versioned_files;

pub use author::Author;
pub use config::CoreConfig;
pub use document::{
    CcAction, CcDraft, CcEntry, CcList, DetailDraft, DetailLine, DetailStatus, Document,
    DocumentDraft, DocumentKind, DocumentPolicy, DocumentStatus,
};
pub use engine::{ApprovalEngine, Feedback, Outcome};
pub use error::{WorkflowError, WorkflowResult};
pub use fanout::Notification;
pub use notes::{Note, NoteLedger, ReopenRole};
pub use org::{Department, OrgConventions, OrgDirectory, OrgHierarchy, OrgUser};
pub use service::{Category, DocumentService, PendingNotification};
