//! Document service.
//!
//! Every client operation runs as one transaction: take the store lock, snapshot the org tree,
//! authorise the actor, load the document, run the [`ApprovalEngine`], and commit the changed
//! record files (plus the replacement notification set) in a single git commit. Superseded
//! attachments are removed after the commit, best-effort.

use crate::author::Author;
use crate::config::CoreConfig;
use crate::document::{
    CcAction, DetailStatus, Document, DocumentDraft, DocumentKind, DocumentStatus,
};
use crate::engine::{ApprovalEngine, Feedback, Outcome};
use crate::fanout::{self, Notification};
use crate::notes::ReopenRole;
use crate::org::{OrgDirectory, OrgHierarchy};
use crate::store::{DocumentStore, LoadedDocument};
use crate::versioned_files::WorkflowCommitAction;
use crate::{WorkflowError, WorkflowResult};
use approval_files::{FileMetadata, FilesService};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// Selection categories
// ============================================================================

/// Document lists offered to a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    All,
    Created,
    Unpublished,
    Approved,
    Revision,
    Rejected,
    WaitingForApproval,
    WaitingForReview,
    JobRegistration,
    Done,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::All,
        Category::Created,
        Category::Unpublished,
        Category::Approved,
        Category::Revision,
        Category::Rejected,
        Category::WaitingForApproval,
        Category::WaitingForReview,
        Category::JobRegistration,
        Category::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::All => "all",
            Category::Created => "created",
            Category::Unpublished => "unpublished",
            Category::Approved => "approved",
            Category::Revision => "revision",
            Category::Rejected => "rejected",
            Category::WaitingForApproval => "waiting-for-approval",
            Category::WaitingForReview => "waiting-for-review",
            Category::JobRegistration => "job-registration",
            Category::Done => "done",
        }
    }
}

impl FromStr for Category {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidInput(format!("unknown category {s:?}")))
    }
}

/// An unread notification of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingNotification {
    pub number: String,
    pub kind: DocumentKind,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct DocumentService {
    cfg: Arc<CoreConfig>,
    store: DocumentStore,
    files: FilesService,
    org: OrgDirectory,
}

impl DocumentService {
    /// Create the service, laying out the data directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::StorageDirCreation` if the layout cannot be created, or
    /// `WorkflowError::Files` if the attachment root is unusable.
    pub fn new(cfg: Arc<CoreConfig>) -> WorkflowResult<Self> {
        cfg.ensure_layout()?;
        let files = FilesService::new(&cfg.attachments_dir())?;
        Ok(Self {
            store: DocumentStore::new(cfg.clone()),
            org: OrgDirectory::new(cfg.org_dir()),
            files,
            cfg,
        })
    }

    pub fn org(&self) -> &OrgDirectory {
        &self.org
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Publish a new document and notify its first approver.
    ///
    /// # Arguments
    ///
    /// * `draft` - Header, details and CC chain. The origin is also the numbering scope.
    /// * `actor` - Username of the publisher; must belong to the origin department.
    ///
    /// # Returns
    ///
    /// The stored document, including its newly allocated number.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::AuthorizationFailed` for an unknown, inactive or foreign actor,
    /// `WorkflowError::InvalidInput` for an invalid draft, or a storage error. A failed create
    /// leaves no document directory behind.
    pub fn create(&self, draft: &DocumentDraft, actor: &str) -> WorkflowResult<Document> {
        draft.validate()?;
        let _guard = self.store.lock();
        let org = self.hierarchy()?;
        org.active_user(actor)?;
        ensure_belongs_to(&org, draft.origin.trim(), actor, "publish for")?;

        let author = self.author(actor)?;
        let now = Utc::now();
        let (number, dir) = self.store.reserve(draft.kind, draft.origin.trim(), now)?;
        let policy = self.cfg.policy(draft.kind);
        let created = ApprovalEngine::new(policy, &org).create(number, draft, now);
        let (document, outcome) = match created {
            Ok(created) => created,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir(&dir) {
                    tracing::warn!(path = %dir.display(), error = %cleanup, "failed to release reserved number");
                }
                return Err(e);
            }
        };

        let markers = fanout::markers(outcome.notify.unwrap_or_default(), now);
        self.store.create(&dir, &document, &markers, &author)?;
        Ok(document)
    }

    /// Replace header, details and chain of a document after a revision request.
    pub fn revise(
        &self,
        number: &str,
        draft: &DocumentDraft,
        note: Option<&str>,
        actor: &str,
    ) -> WorkflowResult<Document> {
        self.transact(
            number,
            actor,
            WorkflowCommitAction::Revise,
            "document revised",
            |engine, org, doc, now| {
                ensure_belongs_to(org, &doc.origin, actor, "revise")?;
                engine.revise(doc, draft, note, actor, now)
            },
        )
    }

    /// Record an approver's response on one CC line.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::AuthorizationFailed` if `actor` does not hold the line,
    /// `WorkflowError::InvalidTransition` for a rejected document or a missing line.
    pub fn apply_feedback(
        &self,
        number: &str,
        feedback: Feedback,
        actor: &str,
    ) -> WorkflowResult<Document> {
        let summary = format!(
            "{} on cc{}",
            feedback.action,
            feedback.line_number.saturating_add(1)
        );
        self.transact(
            number,
            actor,
            WorkflowCommitAction::Feedback,
            &summary,
            |engine, org, doc, now| {
                let holder = doc
                    .cc_list
                    .get(feedback.line_number)
                    .map(|e| e.approver_code.clone());
                if let Some(code) = holder {
                    if !org.conventions().same_party(&code, actor) {
                        return Err(WorkflowError::AuthorizationFailed(format!(
                            "{actor} cannot respond for {code}"
                        )));
                    }
                }
                engine.apply_feedback(doc, feedback, actor, now)
            },
        )
    }

    /// Answer the open review request.
    pub fn reply_for_review(
        &self,
        number: &str,
        comment: &str,
        mentions: Vec<String>,
        actor: &str,
    ) -> WorkflowResult<Document> {
        self.transact(
            number,
            actor,
            WorkflowCommitAction::Reply,
            "review reply",
            |engine, _org, doc, now| engine.reply_for_review(doc, actor, comment, mentions, now),
        )
    }

    /// Put a document back into circulation.
    ///
    /// `role` names the capacity the actor reopens in and must match them: the publisher
    /// belongs to the origin, the recipient to the recipient department, a CC role to its line.
    pub fn reopen(
        &self,
        number: &str,
        role: ReopenRole,
        comment: Option<&str>,
        actor: &str,
    ) -> WorkflowResult<Document> {
        self.transact(
            number,
            actor,
            WorkflowCommitAction::Reopen,
            &format!("reopened by {role}"),
            |engine, org, doc, now| {
                match role {
                    ReopenRole::Publisher => ensure_belongs_to(org, &doc.origin, actor, "reopen for")?,
                    ReopenRole::Recipient => {
                        ensure_belongs_to(org, &doc.recipient, actor, "reopen for")?
                    }
                    ReopenRole::Cc(line) => {
                        if let Some(entry) = doc.cc_list.get(line) {
                            if !org.conventions().same_party(&entry.approver_code, actor) {
                                return Err(WorkflowError::AuthorizationFailed(format!(
                                    "{actor} cannot reopen for {}",
                                    entry.approver_code
                                )));
                            }
                        }
                    }
                }
                engine.reopen(doc, role, comment, actor, now)
            },
        )
    }

    /// Remind the current approver. Only the notification set changes.
    pub fn follow_up(&self, number: &str, actor: &str) -> WorkflowResult<Document> {
        self.transact(
            number,
            actor,
            WorkflowCommitAction::FollowUp,
            "follow-up",
            |engine, org, doc, _now| {
                if !involved(org, doc, actor) {
                    return Err(WorkflowError::AuthorizationFailed(format!(
                        "{actor} is not involved in {}",
                        doc.number
                    )));
                }
                engine.follow_up(doc)
            },
        )
    }

    /// Update the sub-status of one detail line. Only the recipient department may do this.
    pub fn set_detail_status(
        &self,
        number: &str,
        line_number: usize,
        status: DetailStatus,
        actor: &str,
    ) -> WorkflowResult<Document> {
        self.transact(
            number,
            actor,
            WorkflowCommitAction::DetailStatus,
            &format!("detail {} {status}", line_number.saturating_add(1)),
            |engine, org, doc, _now| {
                ensure_belongs_to(org, &doc.recipient, actor, "update details for")?;
                engine.set_detail_status(doc, line_number, status)
            },
        )
    }

    /// Read one document.
    pub fn get(&self, number: &str, actor: &str) -> WorkflowResult<Document> {
        let org = self.hierarchy()?;
        org.active_user(actor)?;
        Ok(self.store.load(number)?.document)
    }

    /// Documents of every kind in `category` as seen by `actor`, ordered by number.
    pub fn list_by_selection(
        &self,
        actor: &str,
        category: Category,
    ) -> WorkflowResult<Vec<Document>> {
        let org = self.hierarchy()?;
        org.active_user(actor)?;
        let documents = self.store.list_all()?;
        Ok(documents
            .into_iter()
            .map(|loaded| loaded.document)
            .filter(|doc| in_category(&org, doc, actor, category))
            .collect())
    }

    /// Documents with an unread notification for `actor`.
    pub fn notifications_for(&self, actor: &str) -> WorkflowResult<Vec<PendingNotification>> {
        let org = self.hierarchy()?;
        org.active_user(actor)?;
        let mut pending = Vec::new();
        for loaded in self.store.list_all()? {
            if let Some(marker) = loaded.notifications.iter().find(|n| n.recipient == actor) {
                pending.push(PendingNotification {
                    number: loaded.document.number.clone(),
                    kind: loaded.document.kind,
                    subject: loaded.document.subject.clone(),
                    created_at: marker.created_at,
                });
            }
        }
        Ok(pending)
    }

    /// Clear `actor`'s unread marker on a document. Returns `false` if there was none.
    pub fn mark_read(&self, number: &str, actor: &str) -> WorkflowResult<bool> {
        let _guard = self.store.lock();
        let org = self.hierarchy()?;
        org.active_user(actor)?;
        let loaded = self.store.load(number)?;

        let remaining: Vec<Notification> = loaded
            .notifications
            .iter()
            .filter(|n| n.recipient != actor)
            .cloned()
            .collect();
        if remaining.len() == loaded.notifications.len() {
            return Ok(false);
        }

        self.store.commit(
            &loaded,
            &loaded.document,
            Some(&remaining),
            &self.author(actor)?,
            WorkflowCommitAction::MarkRead,
            &format!("read by {actor}"),
        )
    }

    /// Store an attachment for an existing document. The document records reference it by
    /// `filename` once a create, revise or feedback names it.
    pub fn attach(
        &self,
        number: &str,
        filename: &str,
        content: &[u8],
        actor: &str,
    ) -> WorkflowResult<FileMetadata> {
        let org = self.hierarchy()?;
        org.active_user(actor)?;
        let document = self.store.load(number)?.document;
        let metadata = self
            .files
            .add_bytes(document.kind.as_str(), number, filename, content)?;
        tracing::info!(%number, %filename, size = metadata.size_bytes, "attachment stored");
        Ok(metadata)
    }

    /// Read an attachment of a document.
    pub fn read_attachment(&self, number: &str, filename: &str) -> WorkflowResult<Vec<u8>> {
        let kind = DocumentKind::from_number(number).ok_or_else(|| {
            WorkflowError::InvalidInput(format!("{number:?} is not a document number"))
        })?;
        Ok(self.files.read(kind.as_str(), number, filename)?)
    }

    // ------------------------------------------------------------------------

    fn hierarchy(&self) -> WorkflowResult<OrgHierarchy> {
        self.org.hierarchy(self.cfg.conventions())
    }

    fn author(&self, actor: &str) -> WorkflowResult<Author> {
        Author::for_actor(actor, self.cfg.commit_email_domain())
    }

    /// Run one engine operation on a stored document and commit the result.
    fn transact<F>(
        &self,
        number: &str,
        actor: &str,
        action: WorkflowCommitAction,
        summary: &str,
        operation: F,
    ) -> WorkflowResult<Document>
    where
        F: FnOnce(&ApprovalEngine<'_>, &OrgHierarchy, &mut Document, DateTime<Utc>) -> WorkflowResult<Outcome>,
    {
        let (document, superseded) = {
            let _guard = self.store.lock();
            let org = self.hierarchy()?;
            org.active_user(actor)?;

            let loaded: LoadedDocument = self.store.load(number)?;
            let engine = ApprovalEngine::new(self.cfg.policy(loaded.document.kind), &org);
            let now = Utc::now();

            let mut document = loaded.document.clone();
            let outcome = operation(&engine, &org, &mut document, now)?;
            let markers = outcome.notify.map(|to| fanout::markers(to, now));

            self.store.commit(
                &loaded,
                &document,
                markers.as_deref(),
                &self.author(actor)?,
                action,
                summary,
            )?;
            (document, outcome.superseded_attachments)
        };

        self.remove_attachments(&document, &superseded);
        Ok(document)
    }

    fn remove_attachments(&self, document: &Document, names: &[String]) {
        for name in names {
            if let Err(e) = self.files.delete(document.kind.as_str(), &document.number, name) {
                tracing::warn!(
                    number = %document.number,
                    attachment = %name,
                    error = %e,
                    "failed to delete superseded attachment"
                );
            }
        }
    }
}

// ============================================================================
// Authorisation and selection helpers
// ============================================================================

/// `actor` is `code`, heads it, or works under its head.
fn belongs_to(org: &OrgHierarchy, code: &str, actor: &str) -> bool {
    let conventions = org.conventions();
    conventions.same_party(code, actor) || conventions.same_party(code, &org.approver_code_for(actor))
}

fn ensure_belongs_to(org: &OrgHierarchy, code: &str, actor: &str, what: &str) -> WorkflowResult<()> {
    if belongs_to(org, code, actor) {
        Ok(())
    } else {
        Err(WorkflowError::AuthorizationFailed(format!(
            "{actor} cannot {what} {code}"
        )))
    }
}

fn involved(org: &OrgHierarchy, doc: &Document, actor: &str) -> bool {
    doc.involves(actor, org.conventions())
        || belongs_to(org, &doc.origin, actor)
        || belongs_to(org, &doc.recipient, actor)
}

fn in_category(org: &OrgHierarchy, doc: &Document, actor: &str, category: Category) -> bool {
    let conventions = org.conventions();
    match category {
        Category::All => involved(org, doc, actor),
        Category::Created => belongs_to(org, &doc.origin, actor),
        Category::Unpublished => {
            belongs_to(org, &doc.origin, actor) && doc.status == DocumentStatus::Unpublished
        }
        Category::Approved => doc.cc_list.entries().iter().any(|e| {
            e.action == CcAction::Approve && conventions.same_party(&e.approver_code, actor)
        }),
        Category::Revision => doc.status == DocumentStatus::Revision && involved(org, doc, actor),
        Category::Rejected => doc.status == DocumentStatus::Rejected && involved(org, doc, actor),
        Category::WaitingForApproval => {
            doc.status == DocumentStatus::Unpublished
                && doc
                    .cc_list
                    .current()
                    .is_some_and(|e| conventions.same_party(&e.approver_code, actor))
        }
        Category::WaitingForReview => doc.notes.open_review_request().is_some_and(|open| {
            let covered = org.covered_by(actor);
            open.mentions.iter().any(|m| org.is_resolved(m, &covered))
        }),
        Category::JobRegistration => {
            doc.status == DocumentStatus::Completed
                && belongs_to(org, &doc.recipient, actor)
                && doc.details.iter().any(|d| d.sub_status != DetailStatus::Done)
        }
        Category::Done => {
            doc.status == DocumentStatus::Completed
                && doc.details.iter().all(|d| d.sub_status == DetailStatus::Done)
                && involved(org, doc, actor)
        }
    }
}
