//! Approval chain engine.
//!
//! The engine applies one client operation to an in-memory [`Document`]. It never touches
//! storage: the caller loads the document, runs the engine and commits the result together with
//! the notification set the engine returns. Any error leaves the caller free to discard the
//! mutated copy.

mod mentions;

pub use mentions::{expand_review_mentions, MentionExpansion};

use crate::constants::SYSTEM_AUTHOR;
use crate::document::{
    not_completed, CcAction, CcEntry, DetailStatus, Document, DocumentDraft, DocumentPolicy,
    DocumentStatus,
};
use crate::fanout::{self, FanoutEvent};
use crate::notes::{NoteLedger, NoteTag, ReopenRole};
use crate::org::OrgHierarchy;
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};

/// Feedback on one CC line.
#[derive(Clone, Debug, Default)]
pub struct Feedback {
    pub line_number: usize,
    pub action: CcAction,
    /// New attachment for the entry; replaces (and supersedes) the previous one.
    pub attachment: Option<String>,
    pub comment: Option<String>,
    pub mentions: Vec<String>,
}

/// Side effects the caller applies after committing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Attachments no longer referenced; deleted best-effort after commit.
    pub superseded_attachments: Vec<String>,
    /// Replacement notification set, or `None` to keep the current one.
    pub notify: Option<Vec<String>>,
}

/// Stateless engine bound to one document policy and org snapshot.
pub struct ApprovalEngine<'a> {
    policy: &'a DocumentPolicy,
    org: &'a OrgHierarchy,
}

impl<'a> ApprovalEngine<'a> {
    pub fn new(policy: &'a DocumentPolicy, org: &'a OrgHierarchy) -> Self {
        Self { policy, org }
    }

    /// Build a new `UNPUBLISHED` document from a draft.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the draft is invalid or of another kind.
    pub fn create(
        &self,
        number: String,
        draft: &DocumentDraft,
        now: DateTime<Utc>,
    ) -> WorkflowResult<(Document, Outcome)> {
        draft.validate()?;
        self.check_kind(draft)?;

        let document = Document {
            number,
            kind: draft.kind,
            origin: draft.origin.trim().to_string(),
            recipient: draft.recipient.trim().to_string(),
            subject: draft.subject.clone(),
            status: DocumentStatus::Unpublished,
            issued_at: now,
            completed_at: not_completed(),
            attachment: draft.attachment.clone(),
            details: draft.detail_lines(),
            cc_list: draft.cc_list(),
            notes: NoteLedger::default(),
        };
        let notify = fanout::recipients(
            &document.cc_list,
            &FanoutEvent::Created,
            self.org.conventions(),
        );

        Ok((
            document,
            Outcome {
                superseded_attachments: Vec::new(),
                notify,
            },
        ))
    }

    /// Apply an approver's feedback to `line_number`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` if the document is `REJECTED` or the line does
    /// not exist.
    pub fn apply_feedback(
        &self,
        doc: &mut Document,
        feedback: Feedback,
        actor: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Outcome> {
        if doc.status == DocumentStatus::Rejected {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} is rejected",
                doc.number
            )));
        }
        let conventions = self.org.conventions();
        let mut line = feedback.line_number;
        let mut outcome = Outcome::default();

        let entry = doc.cc_list.get_mut(line).ok_or_else(|| {
            WorkflowError::InvalidTransition(format!("{} has no CC line {line}", doc.number))
        })?;
        let replaced = feedback.attachment.and_then(|new_attachment| {
            entry
                .attachment
                .replace(new_attachment.clone())
                .filter(|old| *old != new_attachment)
        });
        entry.action = feedback.action;
        entry.action_at = Some(now);
        let approver_code = entry.approver_code.clone();
        if let Some(old) = replaced.filter(|old| !doc.references_attachment(old)) {
            outcome.superseded_attachments.push(old);
        }
        let is_top = conventions.is_top_authority(&approver_code);

        match feedback.action {
            CcAction::Approve if doc.cc_list.is_last(line) => {
                doc.status = DocumentStatus::Completed;
                doc.completed_at = now;
            }
            CcAction::Revision => doc.status = DocumentStatus::Revision,
            CcAction::Reject => doc.status = DocumentStatus::Rejected,
            _ => {}
        }

        self.resolve_open_review(doc, &approver_code);

        let mut mentions: Vec<String> = Vec::new();
        if self.policy.action_requires_note(feedback.action) {
            let mut comment = feedback.comment.unwrap_or_default();
            mentions = feedback.mentions;

            if feedback.action == CcAction::RequestingReview && is_top && !mentions.is_empty() {
                let expansion =
                    expand_review_mentions(&doc.cc_list, self.org, &mentions, &comment);
                if !expansion.staged.is_empty() {
                    tracing::debug!(
                        number = %doc.number,
                        staged = ?expansion.staged,
                        "review request extends the CC chain"
                    );
                    let staged = expansion
                        .staged
                        .iter()
                        .map(|code| CcEntry::pending(code.clone()))
                        .collect();
                    line = doc.cc_list.insert_before(line, staged);
                }
                mentions = expansion.mentions;
                comment = expansion.comment;
            }

            mentions.retain(|m| {
                doc.cc_list.contains_party(m, conventions)
                    || doc
                        .cc_list
                        .contains_party(&self.org.approver_code_for(m), conventions)
            });

            let tag = match feedback.action {
                CcAction::Revision => NoteTag::Revision(line),
                CcAction::Reject => NoteTag::Rejected(line),
                CcAction::RequestingReview => NoteTag::RequestingReview(line),
                _ => NoteTag::Approved(line),
            };
            doc.notes
                .append(now, actor, tag.comment(Some(&comment)), mentions.clone());
        }

        outcome.notify = fanout::recipients(
            &doc.cc_list,
            &FanoutEvent::Feedback {
                line,
                action: feedback.action,
                mentions: &mentions,
            },
            conventions,
        );
        Ok(outcome)
    }

    /// Clear mentions of the open review request answered by `approver_code`.
    fn resolve_open_review(&self, doc: &mut Document, approver_code: &str) {
        let conventions = self.org.conventions();
        let Some(open) = doc.notes.open_review_request() else {
            return;
        };
        if !open
            .mentions
            .iter()
            .any(|m| conventions.same_party(m, approver_code))
        {
            return;
        }

        let username = self
            .org
            .resolve_account(approver_code)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| approver_code.to_string());
        let mut covered = self.org.covered_by(&username);
        covered.insert(approver_code.to_string());

        if let Some(resolution) = doc
            .notes
            .resolve_mentions(|m| self.org.is_resolved(m, &covered))
        {
            tracing::debug!(
                number = %doc.number,
                removed = ?resolution.removed,
                "feedback resolved review mentions"
            );
            if resolution.emptied {
                reset_review_origin(doc, resolution.originating_line);
            }
        }
    }

    /// Answer the open review request as `actor`.
    ///
    /// Mentions covered by the actor are removed; the note is always appended. Replying twice
    /// changes nothing beyond the extra note.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the comment is blank.
    pub fn reply_for_review(
        &self,
        doc: &mut Document,
        actor: &str,
        comment: &str,
        mentions: Vec<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Outcome> {
        if comment.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "a review reply needs a comment".into(),
            ));
        }

        let covered = self.org.covered_by(actor);
        let resolution = doc
            .notes
            .resolve_mentions(|m| self.org.is_resolved(m, &covered));

        let mut origin_line = None;
        if let Some(resolution) = resolution {
            tracing::debug!(
                number = %doc.number,
                removed = ?resolution.removed,
                "reply resolved review mentions"
            );
            origin_line = resolution.originating_line;
            if resolution.emptied {
                reset_review_origin(doc, origin_line);
            }
        }
        doc.notes
            .append(now, actor, comment.trim().to_string(), mentions);

        let approver = origin_line
            .and_then(|l| doc.cc_list.get(l))
            .or_else(|| {
                (doc.status == DocumentStatus::Revision)
                    .then(|| {
                        doc.cc_list
                            .entries()
                            .iter()
                            .rev()
                            .find(|e| e.action == CcAction::Revision)
                    })
                    .flatten()
            })
            .map(|e| e.approver_code.clone());

        Ok(Outcome {
            superseded_attachments: Vec::new(),
            notify: fanout::recipients(
                &doc.cc_list,
                &FanoutEvent::ReplyForReview {
                    approver: approver.as_deref(),
                },
                self.org.conventions(),
            ),
        })
    }

    /// Replace header, details and chain after a revision request.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` for a `REJECTED` document and
    /// `WorkflowError::InvalidInput` for an invalid draft or a changed origin.
    pub fn revise(
        &self,
        doc: &mut Document,
        draft: &DocumentDraft,
        note: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Outcome> {
        if doc.status == DocumentStatus::Rejected {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} is rejected and cannot be revised",
                doc.number
            )));
        }
        draft.validate()?;
        self.check_kind(draft)?;
        if draft.kind != doc.kind || draft.origin.trim() != doc.origin {
            return Err(WorkflowError::InvalidInput(
                "kind and origin of a document cannot change".into(),
            ));
        }

        let new_cc = draft.cc_list();
        let still_referenced = |name: &str| {
            new_cc
                .entries()
                .iter()
                .any(|e| e.attachment.as_deref() == Some(name))
                || draft.attachment.as_deref() == Some(name)
        };

        let mut superseded: Vec<String> = Vec::new();
        for old in doc.cc_list.entries() {
            let Some(attachment) = old.attachment.as_deref() else {
                continue;
            };
            let changed = new_cc
                .get(old.line_number)
                .map_or(true, |e| e.approver_code != old.approver_code);
            if changed && !still_referenced(attachment) {
                superseded.push(attachment.to_string());
            }
        }
        if let Some(old) = doc.attachment.as_deref() {
            if !still_referenced(old) && !superseded.iter().any(|s| s == old) {
                superseded.push(old.to_string());
            }
        }

        doc.recipient = draft.recipient.trim().to_string();
        doc.subject = draft.subject.clone();
        doc.attachment = draft.attachment.clone();
        doc.details = draft.detail_lines();
        doc.cc_list = new_cc;
        doc.status = DocumentStatus::Unpublished;
        doc.completed_at = not_completed();

        if let Some(text) = note.map(str::trim).filter(|t| !t.is_empty()) {
            doc.notes.append(now, actor, text.to_string(), Vec::new());
        }
        doc.notes.append(
            now,
            SYSTEM_AUTHOR,
            NoteTag::RevisionDone.to_string(),
            Vec::new(),
        );

        Ok(Outcome {
            superseded_attachments: superseded,
            notify: fanout::recipients(
                &doc.cc_list,
                &FanoutEvent::Revised,
                self.org.conventions(),
            ),
        })
    }

    /// Put a finished document back into circulation.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` for a `REJECTED` document and
    /// `WorkflowError::InvalidInput` for a CC role outside the chain.
    pub fn reopen(
        &self,
        doc: &mut Document,
        role: ReopenRole,
        comment: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Outcome> {
        if doc.status == DocumentStatus::Rejected {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} is rejected and cannot be reopened",
                doc.number
            )));
        }
        if let ReopenRole::Cc(line) = role {
            if doc.cc_list.get(line).is_none() {
                return Err(WorkflowError::InvalidInput(format!(
                    "{} has no CC line {line}",
                    doc.number
                )));
            }
        }

        doc.status = DocumentStatus::Unpublished;
        doc.completed_at = not_completed();
        for detail in &mut doc.details {
            detail.sub_status = DetailStatus::Pending;
        }
        doc.notes.append(
            now,
            actor,
            NoteTag::Reopen(role).comment(comment),
            Vec::new(),
        );

        Ok(Outcome::default())
    }

    /// Remind the current approver.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` when nobody is waiting to act.
    pub fn follow_up(&self, doc: &Document) -> WorkflowResult<Outcome> {
        if matches!(
            doc.status,
            DocumentStatus::Completed | DocumentStatus::Rejected
        ) {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} is {} and needs no follow-up",
                doc.number,
                self.policy.status_label(doc.status)
            )));
        }
        let notify = fanout::recipients(
            &doc.cc_list,
            &FanoutEvent::FollowUp,
            self.org.conventions(),
        )
        .ok_or_else(|| {
            WorkflowError::InvalidTransition(format!("{} has no current approver", doc.number))
        })?;

        Ok(Outcome {
            superseded_attachments: Vec::new(),
            notify: Some(notify),
        })
    }

    /// Update the sub-status of one detail line.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the line does not exist.
    pub fn set_detail_status(
        &self,
        doc: &mut Document,
        line_number: usize,
        status: DetailStatus,
    ) -> WorkflowResult<Outcome> {
        let detail = doc.details.get_mut(line_number).ok_or_else(|| {
            WorkflowError::InvalidInput(format!(
                "{} has no detail line {line_number}",
                doc.number
            ))
        })?;
        detail.sub_status = status;
        Ok(Outcome::default())
    }

    fn check_kind(&self, draft: &DocumentDraft) -> WorkflowResult<()> {
        if draft.kind != self.policy.kind() {
            return Err(WorkflowError::InvalidInput(format!(
                "a {} draft cannot use the {} policy",
                draft.kind,
                self.policy.kind()
            )));
        }
        Ok(())
    }
}

/// Flip the entry that opened a now-empty review request back to `NO_ACTION`.
fn reset_review_origin(doc: &mut Document, line: Option<usize>) {
    if let Some(entry) = line.and_then(|l| doc.cc_list.get_mut(l)) {
        if entry.action == CcAction::RequestingReview {
            entry.action = CcAction::NoAction;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CcDraft, DetailDraft, DocumentKind};
    use crate::org::tests::sample_org;

    fn draft(kind: DocumentKind, codes: &[&str]) -> DocumentDraft {
        DocumentDraft {
            kind,
            origin: "JPJL".into(),
            recipient: "GDGD".into(),
            subject: "Laptop handover".into(),
            attachment: None,
            details: vec![DetailDraft {
                item: "Laptop".into(),
                quantity: 2,
                remark: None,
            }],
            cc: codes
                .iter()
                .map(|c| CcDraft {
                    approver_code: c.to_string(),
                    action: CcAction::NoAction,
                    attachment: None,
                })
                .collect(),
        }
    }

    fn new_doc(engine: &ApprovalEngine<'_>, kind: DocumentKind, codes: &[&str]) -> Document {
        engine
            .create("DOC-1".into(), &draft(kind, codes), Utc::now())
            .unwrap()
            .0
    }

    fn feedback(line: usize, action: CcAction) -> Feedback {
        Feedback {
            line_number: line,
            action,
            ..Feedback::default()
        }
    }

    fn review(line: usize, mentions: &[&str], comment: &str) -> Feedback {
        Feedback {
            line_number: line,
            action: CcAction::RequestingReview,
            attachment: None,
            comment: Some(comment.into()),
            mentions: mentions.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn codes(doc: &Document) -> Vec<&str> {
        doc.cc_list
            .entries()
            .iter()
            .map(|e| e.approver_code.as_str())
            .collect()
    }

    #[test]
    fn test_create_notifies_first_approver_without_notes() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let (doc, outcome) = engine
            .create("BPB-JPJL-2026-0001".into(), &draft(DocumentKind::Bpb, &["GDGD", "MGMG"]), Utc::now())
            .unwrap();

        assert_eq!(doc.status, DocumentStatus::Unpublished);
        assert!(!doc.is_completed());
        assert!(doc.notes.is_empty());
        assert_eq!(outcome.notify.unwrap(), ["GDGD-01"]);
    }

    #[test]
    fn test_approve_on_last_entry_completes() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["GDGD", "MGMG"]);

        engine
            .apply_feedback(&mut doc, feedback(0, CcAction::Approve), "GDGD-01", Utc::now())
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Unpublished);
        assert!(doc.notes.is_empty());

        let before = Utc::now();
        engine
            .apply_feedback(&mut doc, feedback(1, CcAction::Approve), "MGMG-01", Utc::now())
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert!(doc.completed_at >= before);
        assert!(doc.cc_list.current().is_none());
    }

    #[test]
    fn test_helpdesk_approve_appends_tagged_note() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Helpdesk);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Helpdesk, &["GDGD", "MGMG"]);

        let mut fb = feedback(0, CcAction::Approve);
        fb.comment = Some("ok".into());
        engine.apply_feedback(&mut doc, fb, "GDGD-01", Utc::now()).unwrap();

        let note = doc.notes.last().unwrap();
        assert_eq!(note.comment, "approved_cc1: ok");
        assert_eq!(note.author, "GDGD-01");
    }

    #[test]
    fn test_feedback_on_rejected_document_is_invalid_transition() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["GDGD", "MGMG"]);

        engine
            .apply_feedback(&mut doc, feedback(0, CcAction::Reject), "GDGD-01", Utc::now())
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Rejected);
        assert_eq!(doc.notes.last().unwrap().comment, "rejected_cc1");

        for action in [CcAction::Approve, CcAction::NoAction, CcAction::Revision] {
            let err = engine
                .apply_feedback(&mut doc, feedback(1, action), "MGMG-01", Utc::now())
                .unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidTransition(_)));
        }
        let draft = draft(DocumentKind::Bpb, &["GDGD", "MGMG"]);
        assert!(matches!(
            engine.revise(&mut doc, &draft, None, "JPJL-01", Utc::now()),
            Err(WorkflowError::InvalidTransition(_))
        ));
        assert!(matches!(
            engine.reopen(&mut doc, ReopenRole::Publisher, None, "JPJL-01", Utc::now()),
            Err(WorkflowError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_missing_line_is_invalid_transition() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["MGMG"]);
        let err = engine
            .apply_feedback(&mut doc, feedback(5, CcAction::Approve), "MGMG-01", Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
    }

    #[test]
    fn test_top_review_of_department_stages_only_that_department() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["MGMG"]);

        let outcome = engine
            .apply_feedback(&mut doc, review(0, &["JPJL"], "@JPJL please check"), "MGMG-01", Utc::now())
            .unwrap();

        assert_eq!(codes(&doc), ["JPJL", "MGMG"]);
        assert!(doc.cc_list.is_contiguous());
        assert_eq!(doc.cc_list.get(1).unwrap().action, CcAction::RequestingReview);
        let note = doc.notes.open_review_request().unwrap();
        assert_eq!(note.comment, "requesting_review_cc2: @JPJL please check");
        assert_eq!(note.mentions, ["JPJL"]);
        assert_eq!(outcome.notify.unwrap(), ["JPJL-01"]);
    }

    #[test]
    fn test_top_review_of_staff_inserts_head_before_reviewer() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["X", "MGMG"]);
        engine
            .apply_feedback(&mut doc, feedback(0, CcAction::Approve), "X-01", Utc::now())
            .unwrap();

        engine
            .apply_feedback(&mut doc, review(1, &["U"], "@U confirm stock"), "MGMG-01", Utc::now())
            .unwrap();

        assert_eq!(codes(&doc), ["X", "Y", "MGMG"]);
        assert_eq!(doc.cc_list.get(1).unwrap().line_number, 1);
        assert_eq!(doc.cc_list.get(2).unwrap().line_number, 2);
        assert_eq!(doc.cc_list.get(0).unwrap().action, CcAction::Approve);
        assert_eq!(doc.cc_list.current().unwrap().approver_code, "Y");

        let note = doc.notes.open_review_request().unwrap();
        assert_eq!(note.mentions, ["U", "Y"]);
        assert_eq!(
            note.comment,
            "requesting_review_cc3: @U @Y! (added by system) confirm stock"
        );
    }

    #[test]
    fn test_non_top_review_filters_mentions_to_chain() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["JPJL", "Y", "MGMG"]);

        engine
            .apply_feedback(&mut doc, review(0, &["U", "GDGD"], "question"), "JPJL-01", Utc::now())
            .unwrap();

        assert_eq!(codes(&doc), ["JPJL", "Y", "MGMG"]);
        assert_eq!(doc.notes.last().unwrap().mentions, ["U"]);
        assert_eq!(doc.status, DocumentStatus::Unpublished);
    }

    #[test]
    fn test_head_reply_clears_subordinate_mentions_and_resets_reviewer() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["JPJL", "GDGD", "MGMG"]);
        engine
            .apply_feedback(&mut doc, review(2, &["JPJL", "GDGD"], "explain"), "MGMG-01", Utc::now())
            .unwrap();
        assert_eq!(doc.notes.open_review_request().unwrap().mentions, ["JPJL", "GDGD"]);

        let outcome = engine
            .reply_for_review(&mut doc, "JPJL-01", "covered by my team", vec![], Utc::now())
            .unwrap();

        assert!(doc.notes.open_review_request().is_none());
        assert_eq!(doc.cc_list.get(2).unwrap().action, CcAction::NoAction);
        assert_eq!(outcome.notify.unwrap(), ["MGMG-01"]);
        assert_eq!(doc.notes.last().unwrap().comment, "covered by my team");
    }

    #[test]
    fn test_head_reply_clears_subordinate_head_mentioned_by_username() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["JPJL", "GDGD", "MGMG"]);
        engine
            .apply_feedback(&mut doc, review(2, &["JPJL", "GDGD-01"], "explain"), "MGMG-01", Utc::now())
            .unwrap();
        assert_eq!(doc.notes.open_review_request().unwrap().mentions, ["JPJL", "GDGD-01"]);

        engine
            .reply_for_review(&mut doc, "JPJL-01", "answered for both", vec![], Utc::now())
            .unwrap();

        assert!(doc.notes.open_review_request().is_none());
        assert_eq!(doc.cc_list.get(2).unwrap().action, CcAction::NoAction);
    }

    #[test]
    fn test_reply_for_review_is_idempotent() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["JPJL", "Y", "MGMG"]);
        engine
            .apply_feedback(&mut doc, review(2, &["U", "JPJL"], "both?"), "MGMG-01", Utc::now())
            .unwrap();

        engine
            .reply_for_review(&mut doc, "U", "done on my side", vec![], Utc::now())
            .unwrap();
        let after_first = doc.notes.open_review_request().unwrap().mentions.clone();
        let cc_after_first = doc.cc_list.clone();

        engine
            .reply_for_review(&mut doc, "U", "done on my side", vec![], Utc::now())
            .unwrap();
        assert_eq!(doc.notes.open_review_request().unwrap().mentions, after_first);
        assert_eq!(after_first, ["Y", "JPJL"]);
        assert_eq!(doc.cc_list, cc_after_first);
        assert_eq!(doc.cc_list.get(2).unwrap().action, CcAction::RequestingReview);
    }

    #[test]
    fn test_feedback_from_mentioned_head_resolves_review() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["MGMG"]);
        engine
            .apply_feedback(&mut doc, review(0, &["S"], "who signed?"), "MGMG-01", Utc::now())
            .unwrap();
        assert_eq!(codes(&doc), ["GDGD", "JPJL", "MGMG"]);
        assert_eq!(
            doc.notes.open_review_request().unwrap().mentions,
            ["S", "GDGD", "JPJL"]
        );

        engine
            .apply_feedback(&mut doc, feedback(0, CcAction::Approve), "GDGD-01", Utc::now())
            .unwrap();
        assert_eq!(doc.notes.open_review_request().unwrap().mentions, ["JPJL"]);

        engine
            .apply_feedback(&mut doc, feedback(1, CcAction::Approve), "JPJL-01", Utc::now())
            .unwrap();
        assert!(doc.notes.open_review_request().is_none());
        assert_eq!(doc.cc_list.current().unwrap().approver_code, "MGMG");
        assert_eq!(doc.cc_list.get(2).unwrap().action, CcAction::NoAction);
    }

    #[test]
    fn test_top_revision_notifies_previous_entries_and_reply_goes_back() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["JPJL", "GDGD", "MGMG"]);

        let mut fb = feedback(2, CcAction::Revision);
        fb.comment = Some("wrong quantity".into());
        let outcome = engine.apply_feedback(&mut doc, fb, "MGMG-01", Utc::now()).unwrap();
        assert_eq!(doc.status, DocumentStatus::Revision);
        assert_eq!(outcome.notify.unwrap(), ["JPJL-01", "GDGD-01"]);
        assert_eq!(doc.notes.last().unwrap().comment, "revision_cc3: wrong quantity");

        let reply = engine
            .reply_for_review(&mut doc, "JPJL-01", "will fix", vec![], Utc::now())
            .unwrap();
        assert_eq!(reply.notify.unwrap(), ["MGMG-01"]);
    }

    #[test]
    fn test_replacing_entry_attachment_supersedes_old_one() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["GDGD", "MGMG"]);

        let mut fb = feedback(0, CcAction::NoAction);
        fb.attachment = Some("a.pdf".into());
        let first = engine.apply_feedback(&mut doc, fb.clone(), "GDGD-01", Utc::now()).unwrap();
        assert!(first.superseded_attachments.is_empty());

        fb.attachment = Some("b.pdf".into());
        let second = engine.apply_feedback(&mut doc, fb, "GDGD-01", Utc::now()).unwrap();
        assert_eq!(second.superseded_attachments, ["a.pdf"]);
        assert_eq!(doc.cc_list.get(0).unwrap().attachment.as_deref(), Some("b.pdf"));
        assert!(second.notify.is_none());
    }

    #[test]
    fn test_replacing_entry_attachment_keeps_file_shared_with_header() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["GDGD", "MGMG"]);
        doc.attachment = Some("quote.pdf".into());

        let mut fb = feedback(0, CcAction::NoAction);
        fb.attachment = Some("quote.pdf".into());
        engine.apply_feedback(&mut doc, fb.clone(), "GDGD-01", Utc::now()).unwrap();

        fb.attachment = Some("b.pdf".into());
        let outcome = engine.apply_feedback(&mut doc, fb, "GDGD-01", Utc::now()).unwrap();
        assert!(outcome.superseded_attachments.is_empty());
        assert!(doc.references_attachment("quote.pdf"));

        let mut other = feedback(1, CcAction::NoAction);
        other.attachment = Some("b.pdf".into());
        engine.apply_feedback(&mut doc, other.clone(), "MGMG-01", Utc::now()).unwrap();
        other.attachment = Some("c.pdf".into());
        let outcome = engine.apply_feedback(&mut doc, other, "MGMG-01", Utc::now()).unwrap();
        assert!(outcome.superseded_attachments.is_empty());
    }

    #[test]
    fn test_revise_replaces_chain_and_reports_superseded_attachments() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["GDGD", "JPJL", "MGMG"]);
        doc.cc_list.get_mut(0).unwrap().attachment = Some("keep.pdf".into());
        doc.cc_list.get_mut(1).unwrap().attachment = Some("drop.pdf".into());
        for line in 0..3 {
            engine
                .apply_feedback(&mut doc, feedback(line, CcAction::Approve), "x", Utc::now())
                .unwrap();
        }
        assert_eq!(doc.status, DocumentStatus::Completed);

        let mut revised = draft(DocumentKind::Bpb, &["GDGD", "Y", "MGMG"]);
        revised.cc[0].attachment = Some("keep.pdf".into());
        revised.cc[2].action = CcAction::Approve;
        let outcome = engine
            .revise(&mut doc, &revised, Some("quantities fixed"), "JPJL-01", Utc::now())
            .unwrap();

        assert_eq!(codes(&doc), ["GDGD", "Y", "MGMG"]);
        assert!(doc.cc_list.is_contiguous());
        assert_eq!(outcome.superseded_attachments, ["drop.pdf"]);
        assert_eq!(doc.status, DocumentStatus::Unpublished);
        assert!(!doc.is_completed());
        let comments: Vec<_> = doc.notes.notes().iter().map(|n| n.comment.as_str()).collect();
        assert_eq!(comments[comments.len() - 2..], ["quantities fixed", "revision_done"]);
        assert_eq!(outcome.notify.unwrap(), ["GDGD-01"]);
    }

    #[test]
    fn test_revise_never_completes_even_when_all_approved() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["MGMG"]);
        let mut revised = draft(DocumentKind::Bpb, &["MGMG"]);
        revised.cc[0].action = CcAction::Approve;

        let outcome = engine.revise(&mut doc, &revised, None, "JPJL-01", Utc::now()).unwrap();
        assert_eq!(doc.status, DocumentStatus::Unpublished);
        assert!(outcome.notify.is_none());
    }

    #[test]
    fn test_reopen_resets_details_and_tags_role() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["MGMG"]);
        engine
            .apply_feedback(&mut doc, feedback(0, CcAction::Approve), "MGMG-01", Utc::now())
            .unwrap();
        engine
            .set_detail_status(&mut doc, 0, DetailStatus::Done)
            .unwrap();
        assert!(engine.set_detail_status(&mut doc, 9, DetailStatus::Done).is_err());

        engine
            .reopen(&mut doc, ReopenRole::Cc(0), Some("wrong item"), "MGMG-01", Utc::now())
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Unpublished);
        assert!(!doc.is_completed());
        assert_eq!(doc.details[0].sub_status, DetailStatus::Pending);
        assert_eq!(doc.notes.last().unwrap().comment, "reopen_cc1: wrong item");
        assert_eq!(doc.cc_list.get(0).unwrap().action, CcAction::Approve);

        assert!(matches!(
            engine.reopen(&mut doc, ReopenRole::Cc(4), None, "MGMG-01", Utc::now()),
            Err(WorkflowError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_follow_up_rejects_completed_documents() {
        let org = sample_org();
        let policy = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let engine = ApprovalEngine::new(&policy, &org);
        let mut doc = new_doc(&engine, DocumentKind::Bpb, &["GDGD", "MGMG"]);

        assert_eq!(engine.follow_up(&doc).unwrap().notify.unwrap(), ["GDGD-01"]);
        for line in 0..2 {
            engine
                .apply_feedback(&mut doc, feedback(line, CcAction::Approve), "x", Utc::now())
                .unwrap();
        }
        assert!(matches!(
            engine.follow_up(&doc),
            Err(WorkflowError::InvalidTransition(_))
        ));
    }
}
