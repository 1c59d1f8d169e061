//! Per-document note ledger.
//!
//! Notes are append-only. Machine-written notes start with a tag such as `revision_cc2` or
//! `reopen_publisher`; a review request is a note tagged `requesting_review_cc<n>` with a
//! non-empty mention list. The only mutation after writing is removing resolved mentions.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::WorkflowError;

const REVIEW_PREFIX: &str = "requesting_review_cc";

/// Who reopened a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReopenRole {
    Publisher,
    Recipient,
    /// Zero-based CC line; rendered one-based as `cc<n>`.
    Cc(usize),
}

impl fmt::Display for ReopenRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publisher => f.write_str("publisher"),
            Self::Recipient => f.write_str("recipient"),
            Self::Cc(line) => write!(f, "cc{}", line + 1),
        }
    }
}

impl FromStr for ReopenRole {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "publisher" => Ok(Self::Publisher),
            "recipient" => Ok(Self::Recipient),
            other => other
                .strip_prefix("cc")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n >= 1)
                .map(|n| Self::Cc(n - 1))
                .ok_or_else(|| {
                    WorkflowError::InvalidInput(format!(
                        "reopen role must be publisher, recipient or cc<n>, got {other:?}"
                    ))
                }),
        }
    }
}

/// Machine tag at the start of a note comment. CC lines are stored zero-based and rendered
/// one-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteTag {
    Revision(usize),
    Rejected(usize),
    RequestingReview(usize),
    Approved(usize),
    RevisionDone,
    Reopen(ReopenRole),
}

impl fmt::Display for NoteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revision(line) => write!(f, "revision_cc{}", line + 1),
            Self::Rejected(line) => write!(f, "rejected_cc{}", line + 1),
            Self::RequestingReview(line) => write!(f, "{REVIEW_PREFIX}{}", line + 1),
            Self::Approved(line) => write!(f, "approved_cc{}", line + 1),
            Self::RevisionDone => f.write_str("revision_done"),
            Self::Reopen(role) => write!(f, "reopen_{role}"),
        }
    }
}

impl NoteTag {
    /// Comment of a tagged note: the tag alone, or `<tag>: <comment>`.
    pub fn comment(&self, text: Option<&str>) -> String {
        match text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => format!("{self}: {text}"),
            None => self.to_string(),
        }
    }

    /// Zero-based CC line encoded in a `requesting_review_cc<n>` comment.
    pub fn review_line(comment: &str) -> Option<usize> {
        let rest = comment.strip_prefix(REVIEW_PREFIX)?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<usize>().ok()?.checked_sub(1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub line_number: u64,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub comment: String,
    pub mentions: Vec<String>,
}

impl Note {
    pub fn is_review_request(&self) -> bool {
        self.comment.starts_with(REVIEW_PREFIX)
    }
}

/// Outcome of resolving mentions on the open review request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewResolution {
    /// Mentions removed by this call.
    pub removed: Vec<String>,
    /// CC line that opened the request.
    pub originating_line: Option<usize>,
    /// True when the request has no mentions left.
    pub emptied: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteLedger {
    notes: Vec<Note>,
}

impl NoteLedger {
    pub fn from_notes(notes: Vec<Note>) -> Self {
        Self { notes }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn last(&self) -> Option<&Note> {
        self.notes.last()
    }

    /// Append a note; duplicate mentions are dropped keeping first occurrence order.
    pub fn append(
        &mut self,
        timestamp: DateTime<Utc>,
        author: &str,
        comment: String,
        mentions: Vec<String>,
    ) -> u64 {
        let line_number = self
            .notes
            .last()
            .map(|n| n.line_number + 1)
            .unwrap_or(0);

        let mut unique: Vec<String> = Vec::with_capacity(mentions.len());
        for mention in mentions {
            let mention = mention.trim().to_string();
            if !mention.is_empty() && !unique.contains(&mention) {
                unique.push(mention);
            }
        }

        self.notes.push(Note {
            line_number,
            timestamp,
            author: author.to_string(),
            comment,
            mentions: unique,
        });
        line_number
    }

    fn open_review_index(&self) -> Option<usize> {
        self.notes
            .iter()
            .rposition(|n| n.is_review_request() && !n.mentions.is_empty())
    }

    /// The last review request that still has mentions.
    pub fn open_review_request(&self) -> Option<&Note> {
        self.open_review_index().map(|i| &self.notes[i])
    }

    /// Remove every mention of the open review request matching `resolved`.
    ///
    /// Returns `None` when there is no open request.
    pub fn resolve_mentions<F>(&mut self, resolved: F) -> Option<ReviewResolution>
    where
        F: Fn(&str) -> bool,
    {
        let index = self.open_review_index()?;
        let note = &mut self.notes[index];

        let (removed, kept): (Vec<String>, Vec<String>) =
            note.mentions.drain(..).partition(|m| resolved(m.as_str()));
        note.mentions = kept;

        Some(ReviewResolution {
            removed,
            originating_line: NoteTag::review_line(&note.comment),
            emptied: note.mentions.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_tags_render_one_based() {
        assert_eq!(NoteTag::Revision(0).to_string(), "revision_cc1");
        assert_eq!(NoteTag::RequestingReview(2).to_string(), "requesting_review_cc3");
        assert_eq!(NoteTag::Reopen(ReopenRole::Cc(1)).to_string(), "reopen_cc2");
        assert_eq!(
            NoteTag::Approved(0).comment(Some("looks fine")),
            "approved_cc1: looks fine"
        );
        assert_eq!(NoteTag::RevisionDone.comment(Some("  ")), "revision_done");
        assert_eq!(NoteTag::review_line("requesting_review_cc3: please"), Some(2));
        assert_eq!(NoteTag::review_line("revision_cc3"), None);
    }

    #[test]
    fn test_reopen_role_parse() {
        assert_eq!("publisher".parse::<ReopenRole>().unwrap(), ReopenRole::Publisher);
        assert_eq!("cc3".parse::<ReopenRole>().unwrap(), ReopenRole::Cc(2));
        assert!("cc0".parse::<ReopenRole>().is_err());
        assert!("boss".parse::<ReopenRole>().is_err());
    }

    #[test]
    fn test_append_is_monotonic_and_dedupes_mentions() {
        let mut ledger = NoteLedger::default();
        assert_eq!(ledger.append(now(), "U", "hello".into(), vec![]), 0);
        let line = ledger.append(
            now(),
            "MGMG-01",
            "requesting_review_cc2".into(),
            vec!["A".into(), "B".into(), "A".into()],
        );
        assert_eq!(line, 1);
        assert_eq!(ledger.last().unwrap().mentions, ["A", "B"]);
    }

    #[test]
    fn test_open_review_request_is_last_with_mentions() {
        let mut ledger = NoteLedger::default();
        ledger.append(now(), "MGMG-01", "requesting_review_cc1".into(), vec!["A".into()]);
        ledger.append(now(), "MGMG-01", "requesting_review_cc1".into(), vec![]);
        assert_eq!(ledger.open_review_request().unwrap().line_number, 0);

        let resolution = ledger.resolve_mentions(|m| m == "A").unwrap();
        assert_eq!(resolution.removed, ["A"]);
        assert_eq!(resolution.originating_line, Some(0));
        assert!(resolution.emptied);
        assert!(ledger.open_review_request().is_none());
        assert!(ledger.resolve_mentions(|_| true).is_none());
    }
}
