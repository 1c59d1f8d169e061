//! Git-backed document store.
//!
//! Layout under the data directory:
//!
//! ```text
//! documents/
//!   bpb/
//!     BPB-JPJL-2026-0001/      <- one git repository per document
//!       header.yaml
//!       cc.yaml
//!       notes.yaml
//!       details.yaml
//!       notifications.yaml
//!   helpdesk/
//!     HD-...
//! ```
//!
//! Every mutation writes the changed files and commits them in one commit, restoring the
//! previous contents on failure. Callers hold [`DocumentStore::lock`] across
//! load, compute and commit so transactions never interleave.

use crate::author::Author;
use crate::config::CoreConfig;
use crate::constants::{
    CC_LIST_FILENAME, DETAILS_FILENAME, HEADER_FILENAME, NOTES_FILENAME, NOTIFICATIONS_FILENAME,
};
use crate::document::{Document, DocumentKind};
use crate::fanout::Notification;
use crate::records::{self, DocumentFiles};
use crate::sequence;
use crate::versioned_files::{
    FileToWrite, VersionedFileService, WorkflowCommitAction, WorkflowCommitMessage,
};
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// A document as read from disk, with the raw file contents kept for rollback and change
/// detection.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub notifications: Vec<Notification>,
    files: DocumentFiles,
    notifications_text: Option<String>,
}

#[derive(Clone)]
pub struct DocumentStore {
    cfg: Arc<CoreConfig>,
    lock: Arc<Mutex<()>>,
}

impl DocumentStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serialise a read-compute-commit cycle.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        // A panic in another transaction leaves no partial state behind the guard.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Directory of `number`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the number has no known prefix or is not a safe
    /// path segment.
    pub fn document_dir(&self, number: &str) -> WorkflowResult<PathBuf> {
        let kind = DocumentKind::from_number(number).ok_or_else(|| {
            WorkflowError::InvalidInput(format!("{number:?} is not a document number"))
        })?;
        if number.contains(['/', '\\', '.', '\0']) || number.chars().any(char::is_whitespace) {
            return Err(WorkflowError::InvalidInput(format!(
                "{number:?} is not a document number"
            )));
        }
        Ok(self.cfg.kind_dir(kind).join(number))
    }

    /// Reserve the next number for `scope` by creating its directory.
    pub fn reserve(
        &self,
        kind: DocumentKind,
        scope: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<(String, PathBuf)> {
        sequence::reserve_number(&self.cfg.kind_dir(kind), kind, scope, now)
    }

    /// Load a document.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::NotFound` if there is no header for `number`.
    pub fn load(&self, number: &str) -> WorkflowResult<LoadedDocument> {
        let dir = self.document_dir(number)?;
        let header = match std::fs::read_to_string(dir.join(HEADER_FILENAME)) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowError::NotFound(format!("document {number}")))
            }
            Err(e) => return Err(WorkflowError::FileRead(e)),
        };

        let files = DocumentFiles {
            header,
            cc: read_required(&dir, CC_LIST_FILENAME)?,
            notes: read_required(&dir, NOTES_FILENAME)?,
            details: read_required(&dir, DETAILS_FILENAME)?,
        };
        let document = records::parse_document(&files, &self.cfg)?;

        let notifications_text = read_optional(&dir, NOTIFICATIONS_FILENAME)?;
        let notifications = match notifications_text.as_deref() {
            Some(text) => records::parse_notifications(text)?,
            None => Vec::new(),
        };

        Ok(LoadedDocument {
            document,
            notifications,
            files,
            notifications_text,
        })
    }

    /// Initialise the repository of a freshly reserved directory with the first commit.
    pub fn create(
        &self,
        dir: &Path,
        document: &Document,
        notifications: &[Notification],
        actor: &Author,
    ) -> WorkflowResult<()> {
        let files = records::render_document(document, self.cfg.policy(document.kind))?;
        let notifications_text = records::render_notifications(notifications)?;
        let message = commit_message(document, WorkflowCommitAction::Create, "document created")?;

        let to_write = [
            file(HEADER_FILENAME, &files.header, None),
            file(CC_LIST_FILENAME, &files.cc, None),
            file(NOTES_FILENAME, &files.notes, None),
            file(DETAILS_FILENAME, &files.details, None),
            file(NOTIFICATIONS_FILENAME, &notifications_text, None),
        ];
        VersionedFileService::init_and_commit(dir, actor, &message, &to_write)?;
        tracing::info!(number = %document.number, "document created");
        Ok(())
    }

    /// Commit the changes between `before` and the new state. Returns `false` when nothing
    /// changed and no commit was made.
    pub fn commit(
        &self,
        before: &LoadedDocument,
        document: &Document,
        notifications: Option<&[Notification]>,
        actor: &Author,
        action: WorkflowCommitAction,
        summary: &str,
    ) -> WorkflowResult<bool> {
        let dir = self.document_dir(&document.number)?;
        let files = records::render_document(document, self.cfg.policy(document.kind))?;
        let notifications_text = notifications
            .map(records::render_notifications)
            .transpose()?;

        let mut to_write: Vec<FileToWrite> = Vec::new();
        for (name, new, old) in [
            (HEADER_FILENAME, &files.header, &before.files.header),
            (CC_LIST_FILENAME, &files.cc, &before.files.cc),
            (NOTES_FILENAME, &files.notes, &before.files.notes),
            (DETAILS_FILENAME, &files.details, &before.files.details),
        ] {
            if new != old {
                to_write.push(file(name, new, Some(old)));
            }
        }
        if let Some(text) = notifications_text.as_ref() {
            if before.notifications_text.as_ref() != Some(text) {
                to_write.push(file(
                    NOTIFICATIONS_FILENAME,
                    text,
                    before.notifications_text.as_deref(),
                ));
            }
        }

        if to_write.is_empty() {
            return Ok(false);
        }

        let message = commit_message(document, action, summary)?;
        VersionedFileService::write_and_commit_files(&dir, actor, &message, &to_write)?;
        tracing::debug!(number = %document.number, %action, files = to_write.len(), "document committed");
        Ok(true)
    }

    /// Every readable document of `kind`, ordered by number.
    pub fn list(&self, kind: DocumentKind) -> WorkflowResult<Vec<LoadedDocument>> {
        let kind_dir = self.cfg.kind_dir(kind);
        let entries = match std::fs::read_dir(&kind_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkflowError::FileRead(e)),
        };

        let mut numbers: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(WorkflowError::FileRead)?;
            if let Some(name) = entry.file_name().to_str() {
                numbers.push(name.to_string());
            }
        }
        numbers.sort();

        let mut documents = Vec::with_capacity(numbers.len());
        for number in numbers {
            match self.load(&number) {
                Ok(doc) => documents.push(doc),
                // Reserved but not yet committed.
                Err(WorkflowError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(documents)
    }

    /// Every readable document of every kind.
    pub fn list_all(&self) -> WorkflowResult<Vec<LoadedDocument>> {
        let mut all = Vec::new();
        for kind in DocumentKind::ALL {
            all.extend(self.list(kind)?);
        }
        Ok(all)
    }

    /// Number of commits in a document's history.
    pub fn history_len(&self, number: &str) -> WorkflowResult<usize> {
        VersionedFileService::open(&self.document_dir(number)?)?.commit_count()
    }
}

fn file<'a>(name: &'a str, content: &'a str, old: Option<&'a str>) -> FileToWrite<'a> {
    FileToWrite {
        relative_path: Path::new(name),
        content,
        old_content: old,
    }
}

fn commit_message(
    document: &Document,
    action: WorkflowCommitAction,
    summary: &str,
) -> WorkflowResult<WorkflowCommitMessage> {
    WorkflowCommitMessage::new(document.kind, action, summary)?
        .with_trailer("Document-Number", &document.number)
}

fn read_required(dir: &Path, name: &str) -> WorkflowResult<String> {
    std::fs::read_to_string(dir.join(name)).map_err(WorkflowError::FileRead)
}

fn read_optional(dir: &Path, name: &str) -> WorkflowResult<Option<String>> {
    match std::fs::read_to_string(dir.join(name)) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkflowError::FileRead(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CcDraft, DocumentDraft, DocumentPolicy};
    use crate::engine::ApprovalEngine;
    use crate::org::tests::sample_org;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DocumentStore) {
        let temp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(temp.path().to_path_buf()).unwrap());
        cfg.ensure_layout().unwrap();
        (temp, DocumentStore::new(cfg))
    }

    fn create(store: &DocumentStore) -> String {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let draft = DocumentDraft {
            kind: DocumentKind::Bpb,
            origin: "JPJL".into(),
            recipient: "GDGD".into(),
            subject: "Desk".into(),
            attachment: None,
            details: vec![],
            cc: ["GDGD", "JPJL", "MGMG"]
                .iter()
                .map(|c| CcDraft {
                    approver_code: c.to_string(),
                    action: Default::default(),
                    attachment: None,
                })
                .collect(),
        };
        let now = Utc::now();
        let (number, dir) = store.reserve(DocumentKind::Bpb, "JPJL", now).unwrap();
        let (doc, outcome) = engine.create(number.clone(), &draft, now).unwrap();
        let markers = crate::fanout::markers(outcome.notify.unwrap_or_default(), now);
        let author = Author::for_actor("JPJL-01", "approvals.local").unwrap();
        store.create(&dir, &doc, &markers, &author).unwrap();
        number
    }

    #[test]
    fn test_create_then_load_preserves_chain_order() {
        let (_temp, store) = setup();
        let number = create(&store);

        let loaded = store.load(&number).unwrap();
        let codes: Vec<_> = loaded
            .document
            .cc_list
            .entries()
            .iter()
            .map(|e| e.approver_code.as_str())
            .collect();
        assert_eq!(codes, ["GDGD", "JPJL", "MGMG"]);
        assert!(loaded.document.notes.is_empty());
        assert_eq!(loaded.notifications[0].recipient, "GDGD-01");
        assert_eq!(store.history_len(&number).unwrap(), 1);
    }

    #[test]
    fn test_commit_skips_unchanged_and_writes_changes() {
        let (_temp, store) = setup();
        let number = create(&store);
        let author = Author::for_actor("GDGD-01", "approvals.local").unwrap();

        let before = store.load(&number).unwrap();
        let unchanged = store
            .commit(&before, &before.document, None, &author, WorkflowCommitAction::FollowUp, "noop")
            .unwrap();
        assert!(!unchanged);

        let mut doc = before.document.clone();
        doc.subject = "Two desks".into();
        assert!(store
            .commit(&before, &doc, Some(&[]), &author, WorkflowCommitAction::Revise, "subject")
            .unwrap());

        let after = store.load(&number).unwrap();
        assert_eq!(after.document.subject, "Two desks");
        assert!(after.notifications.is_empty());
        assert_eq!(store.history_len(&number).unwrap(), 2);
    }

    #[test]
    fn test_load_unknown_number_is_not_found() {
        let (_temp, store) = setup();
        assert!(matches!(
            store.load("BPB-JPJL-2026-0099"),
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            store.load("../etc"),
            Err(WorkflowError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_list_skips_reserved_directories() {
        let (_temp, store) = setup();
        let number = create(&store);
        store
            .reserve(DocumentKind::Bpb, "JPJL", Utc::now())
            .unwrap();

        let listed = store.list(DocumentKind::Bpb).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].document.number, number);
        assert!(store.list(DocumentKind::Helpdesk).unwrap().is_empty());
    }
}
