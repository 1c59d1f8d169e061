//! Document domain model: kinds, policies, statuses, the CC chain and detail lines.

use crate::org::OrgConventions;
use crate::notes::NoteLedger;
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Kind and policy
// ============================================================================

/// The two document types sharing the approval engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Bpb,
    Helpdesk,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Bpb, DocumentKind::Helpdesk];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bpb => "bpb",
            Self::Helpdesk => "helpdesk",
        }
    }

    /// Prefix of document numbers (`BPB-...`, `HD-...`).
    pub const fn number_prefix(self) -> &'static str {
        match self {
            Self::Bpb => "BPB",
            Self::Helpdesk => "HD",
        }
    }

    /// Kind encoded in a document number.
    pub fn from_number(number: &str) -> Option<Self> {
        let prefix = number.split('-').next()?;
        Self::ALL.into_iter().find(|k| k.number_prefix() == prefix)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bpb" => Ok(Self::Bpb),
            "helpdesk" | "hd" => Ok(Self::Helpdesk),
            other => Err(WorkflowError::InvalidInput(format!(
                "unknown document kind {other:?}"
            ))),
        }
    }
}

/// Per-kind parameters of the generic engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentPolicy {
    kind: DocumentKind,
    completed_label: &'static str,
    approve_requires_note: bool,
}

impl DocumentPolicy {
    /// Defaults: BPB completes as `DONE` without an approve note; Helpdesk completes as
    /// `PUBLISHED` and records `approved_cc<n>` notes.
    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Bpb => Self {
                kind,
                completed_label: "DONE",
                approve_requires_note: false,
            },
            DocumentKind::Helpdesk => Self {
                kind,
                completed_label: "PUBLISHED",
                approve_requires_note: true,
            },
        }
    }

    pub fn with_approve_note(mut self, required: bool) -> Self {
        self.approve_requires_note = required;
        self
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn number_prefix(&self) -> &'static str {
        self.kind.number_prefix()
    }

    pub fn approve_requires_note(&self) -> bool {
        self.approve_requires_note
    }

    /// Whether feedback with `action` appends a trailing note.
    pub fn action_requires_note(&self, action: CcAction) -> bool {
        match action {
            CcAction::Revision | CcAction::Reject | CcAction::RequestingReview => true,
            CcAction::Approve => self.approve_requires_note,
            CcAction::NoAction => false,
        }
    }

    pub fn status_label(&self, status: DocumentStatus) -> &'static str {
        match status {
            DocumentStatus::Unpublished => "UNPUBLISHED",
            DocumentStatus::Completed => self.completed_label,
            DocumentStatus::Revision => "REVISION",
            DocumentStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse_status(&self, label: &str) -> WorkflowResult<DocumentStatus> {
        match label {
            "UNPUBLISHED" => Ok(DocumentStatus::Unpublished),
            "REVISION" => Ok(DocumentStatus::Revision),
            "REJECTED" => Ok(DocumentStatus::Rejected),
            l if l == self.completed_label => Ok(DocumentStatus::Completed),
            other => Err(WorkflowError::Translation(format!(
                "unknown {} status {other:?}",
                self.kind
            ))),
        }
    }
}

// ============================================================================
// Status and actions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    Unpublished,
    /// `DONE` for BPB, `PUBLISHED` for Helpdesk.
    Completed,
    Revision,
    Rejected,
}

/// Feedback an approver gives on a CC entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CcAction {
    #[default]
    NoAction,
    Approve,
    Revision,
    Reject,
    RequestingReview,
}

impl CcAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoAction => "NO_ACTION",
            Self::Approve => "APPROVE",
            Self::Revision => "REVISION",
            Self::Reject => "REJECT",
            Self::RequestingReview => "REQUESTING_REVIEW",
        }
    }
}

impl fmt::Display for CcAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CcAction {
    type Err = WorkflowError;

    /// Unknown action text is an invalid transition, not malformed input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::NoAction,
            Self::Approve,
            Self::Revision,
            Self::Reject,
            Self::RequestingReview,
        ]
        .into_iter()
        .find(|a| a.as_str() == s.trim())
        .ok_or_else(|| WorkflowError::InvalidTransition(format!("unknown action {s:?}")))
    }
}

// ============================================================================
// CC chain
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CcEntry {
    pub line_number: usize,
    pub approver_code: String,
    pub action: CcAction,
    pub action_at: Option<DateTime<Utc>>,
    pub attachment: Option<String>,
}

impl CcEntry {
    pub fn pending(approver_code: impl Into<String>) -> Self {
        Self {
            line_number: 0,
            approver_code: approver_code.into(),
            action: CcAction::NoAction,
            action_at: None,
            attachment: None,
        }
    }
}

/// Ordered approver chain. The vector index is the line number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CcList {
    entries: Vec<CcEntry>,
}

impl CcList {
    /// Build a chain, renumbering from 0.
    pub fn from_entries(entries: Vec<CcEntry>) -> Self {
        let mut list = Self { entries };
        list.renumber();
        list
    }

    pub fn entries(&self) -> &[CcEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, line: usize) -> Option<&CcEntry> {
        self.entries.get(line)
    }

    pub fn get_mut(&mut self, line: usize) -> Option<&mut CcEntry> {
        self.entries.get_mut(line)
    }

    pub fn is_last(&self, line: usize) -> bool {
        line + 1 == self.entries.len()
    }

    /// Lowest entry whose action is not `APPROVE`.
    pub fn current(&self) -> Option<&CcEntry> {
        self.entries.iter().find(|e| e.action != CcAction::Approve)
    }

    pub fn contains_party(&self, code: &str, conventions: &OrgConventions) -> bool {
        self.entries
            .iter()
            .any(|e| conventions.same_party(&e.approver_code, code))
    }

    /// Insert `staged` entries before `line` and renumber. Returns the new line of the entry
    /// that was at `line`.
    pub fn insert_before(&mut self, line: usize, staged: Vec<CcEntry>) -> usize {
        let at = line.min(self.entries.len());
        let count = staged.len();
        self.entries.splice(at..at, staged);
        self.renumber();
        at + count
    }

    /// Line numbers equal positions.
    pub fn is_contiguous(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.line_number == i)
    }

    fn renumber(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.line_number = i;
        }
    }
}

// ============================================================================
// Detail lines
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl DetailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for DetailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            other => Err(WorkflowError::InvalidInput(format!(
                "unknown detail status {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailLine {
    pub line_number: usize,
    pub item: String,
    pub quantity: u32,
    pub remark: Option<String>,
    pub sub_status: DetailStatus,
}

// ============================================================================
// Document
// ============================================================================

/// Completion time of a document that has not completed.
pub fn not_completed() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub number: String,
    pub kind: DocumentKind,
    pub origin: String,
    pub recipient: String,
    pub subject: String,
    pub status: DocumentStatus,
    pub issued_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub attachment: Option<String>,
    pub details: Vec<DetailLine>,
    pub cc_list: CcList,
    pub notes: NoteLedger,
}

impl Document {
    pub fn is_completed(&self) -> bool {
        self.completed_at != not_completed()
    }

    /// Whether `username` takes part in the document as origin, recipient or approver.
    pub fn involves(&self, username: &str, conventions: &OrgConventions) -> bool {
        conventions.same_party(&self.origin, username)
            || conventions.same_party(&self.recipient, username)
            || self.cc_list.contains_party(username, conventions)
    }

    /// Whether the header or any CC entry points at attachment `name`.
    pub fn references_attachment(&self, name: &str) -> bool {
        self.attachment.as_deref() == Some(name)
            || self
                .cc_list
                .entries()
                .iter()
                .any(|e| e.attachment.as_deref() == Some(name))
    }
}

// ============================================================================
// Drafts (caller input)
// ============================================================================

/// A CC entry as supplied on create or revise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CcDraft {
    pub approver_code: String,
    #[serde(default)]
    pub action: CcAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

/// A detail line as supplied on create or revise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailDraft {
    pub item: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

/// Header, details and chain for a new or revised document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentDraft {
    pub kind: DocumentKind,
    /// Origin department code; also the numbering scope.
    pub origin: String,
    pub recipient: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(default)]
    pub details: Vec<DetailDraft>,
    pub cc: Vec<CcDraft>,
}

impl DocumentDraft {
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` for blank codes or an empty chain.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.origin.trim().is_empty() || self.origin.contains(['/', '\\', '.']) {
            return Err(WorkflowError::InvalidInput(
                "origin must be a non-empty department code".into(),
            ));
        }
        if self.recipient.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("recipient must not be empty".into()));
        }
        if self.cc.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "the CC chain needs at least one approver".into(),
            ));
        }
        if self.cc.iter().any(|c| c.approver_code.trim().is_empty()) {
            return Err(WorkflowError::InvalidInput(
                "approver codes must not be empty".into(),
            ));
        }
        if self.details.iter().any(|d| d.item.trim().is_empty()) {
            return Err(WorkflowError::InvalidInput(
                "detail items must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn cc_list(&self) -> CcList {
        CcList::from_entries(
            self.cc
                .iter()
                .map(|c| CcEntry {
                    line_number: 0,
                    approver_code: c.approver_code.trim().to_string(),
                    action: c.action,
                    action_at: None,
                    attachment: c.attachment.clone(),
                })
                .collect(),
        )
    }

    pub(crate) fn detail_lines(&self) -> Vec<DetailLine> {
        self.details
            .iter()
            .enumerate()
            .map(|(i, d)| DetailLine {
                line_number: i,
                item: d.item.clone(),
                quantity: d.quantity,
                remark: d.remark.clone(),
                sub_status: DetailStatus::Pending,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(codes: &[&str]) -> CcList {
        CcList::from_entries(codes.iter().map(|c| CcEntry::pending(*c)).collect())
    }

    #[test]
    fn test_kind_from_number_prefix() {
        assert_eq!(DocumentKind::from_number("BPB-JPJL-2026-0001"), Some(DocumentKind::Bpb));
        assert_eq!(DocumentKind::from_number("HD-IT-2026-0012"), Some(DocumentKind::Helpdesk));
        assert_eq!(DocumentKind::from_number("XX-1"), None);
    }

    #[test]
    fn test_policy_labels() {
        let bpb = DocumentPolicy::for_kind(DocumentKind::Bpb);
        let hd = DocumentPolicy::for_kind(DocumentKind::Helpdesk);
        assert_eq!(bpb.status_label(DocumentStatus::Completed), "DONE");
        assert_eq!(hd.status_label(DocumentStatus::Completed), "PUBLISHED");
        assert_eq!(hd.parse_status("PUBLISHED").unwrap(), DocumentStatus::Completed);
        assert!(bpb.parse_status("PUBLISHED").is_err());
        assert!(!bpb.action_requires_note(CcAction::Approve));
        assert!(hd.action_requires_note(CcAction::Approve));
        assert!(bpb.action_requires_note(CcAction::Reject));
    }

    #[test]
    fn test_unknown_action_is_invalid_transition() {
        assert_eq!("APPROVE".parse::<CcAction>().unwrap(), CcAction::Approve);
        assert!(matches!(
            "ESCALATE".parse::<CcAction>(),
            Err(WorkflowError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_current_skips_approved_entries() {
        let mut cc = chain(&["X", "Y", "MGMG"]);
        assert_eq!(cc.current().unwrap().approver_code, "X");
        cc.get_mut(0).unwrap().action = CcAction::Approve;
        assert_eq!(cc.current().unwrap().approver_code, "Y");
        cc.get_mut(1).unwrap().action = CcAction::Revision;
        assert_eq!(cc.current().unwrap().approver_code, "Y");
    }

    #[test]
    fn test_insert_before_renumbers() {
        let mut cc = chain(&["X", "MGMG"]);
        let reviewer = cc.insert_before(1, vec![CcEntry::pending("Y"), CcEntry::pending("Z")]);
        assert_eq!(reviewer, 3);
        assert!(cc.is_contiguous());
        let codes: Vec<_> = cc.entries().iter().map(|e| e.approver_code.as_str()).collect();
        assert_eq!(codes, ["X", "Y", "Z", "MGMG"]);
    }

    #[test]
    fn test_contains_party_matches_head_suffix() {
        let cc = chain(&["JPJL", "MGMG"]);
        let conventions = OrgConventions::default();
        assert!(cc.contains_party("JPJL-01", &conventions));
        assert!(!cc.contains_party("GDGD", &conventions));
    }

    #[test]
    fn test_draft_validation() {
        let draft = DocumentDraft {
            kind: DocumentKind::Bpb,
            origin: "JPJL".into(),
            recipient: "GDGD".into(),
            subject: String::new(),
            attachment: None,
            details: vec![],
            cc: vec![],
        };
        assert!(matches!(draft.validate(), Err(WorkflowError::InvalidInput(_))));
    }
}
