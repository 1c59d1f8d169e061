//! YAML wire records for document repositories.
//!
//! Each document directory holds one file per concern:
//!
//! - `header.yaml`: number, kind, parties, status label and timestamps
//! - `cc.yaml`: the approval chain
//! - `notes.yaml`: the note ledger
//! - `details.yaml`: detail lines
//! - `notifications.yaml`: unread markers
//!
//! Wire structs are strict (`deny_unknown_fields`) and decoded through `serde_path_to_error` so
//! a malformed file reports the failing field path.

use crate::config::CoreConfig;
use crate::document::{
    CcAction, CcEntry, CcList, DetailLine, DetailStatus, Document, DocumentKind, DocumentPolicy,
};
use crate::fanout::Notification;
use crate::notes::{Note, NoteLedger};
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

// ============================================================================
// Generic helpers
// ============================================================================

/// Parse YAML into `T`, reporting schema mismatches with their field path.
pub(crate) fn parse_yaml<T: DeserializeOwned>(yaml_text: &str, what: &str) -> WorkflowResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize::<_, T>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>"
        } else {
            path.as_str()
        };
        WorkflowError::Translation(format!("{what} schema mismatch at {path}: {source}"))
    })
}

pub(crate) fn render_yaml<T: Serialize>(value: &T) -> WorkflowResult<String> {
    serde_yaml::to_string(value).map_err(WorkflowError::YamlSerialization)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderWire {
    number: String,
    kind: DocumentKind,
    origin: String,
    recipient: String,
    #[serde(default)]
    subject: String,
    status: String,
    issued_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CcEntryWire {
    line_number: usize,
    approver_code: String,
    action: CcAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CcListWire {
    #[serde(default)]
    entries: Vec<CcEntryWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoteWire {
    line_number: u64,
    timestamp: DateTime<Utc>,
    author: String,
    comment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    mentions: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotesWire {
    #[serde(default)]
    notes: Vec<NoteWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailWire {
    line_number: usize,
    item: String,
    quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remark: Option<String>,
    sub_status: DetailStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailsWire {
    #[serde(default)]
    details: Vec<DetailWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotificationWire {
    recipient: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotificationsWire {
    #[serde(default)]
    notifications: Vec<NotificationWire>,
}

// ============================================================================
// Document files
// ============================================================================

/// Rendered content of the per-document files that carry the document itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentFiles {
    pub header: String,
    pub cc: String,
    pub notes: String,
    pub details: String,
}

pub(crate) fn render_document(
    doc: &Document,
    policy: &DocumentPolicy,
) -> WorkflowResult<DocumentFiles> {
    let header = HeaderWire {
        number: doc.number.clone(),
        kind: doc.kind,
        origin: doc.origin.clone(),
        recipient: doc.recipient.clone(),
        subject: doc.subject.clone(),
        status: policy.status_label(doc.status).to_string(),
        issued_at: doc.issued_at,
        completed_at: doc.completed_at,
        attachment: doc.attachment.clone(),
    };
    let cc = CcListWire {
        entries: doc
            .cc_list
            .entries()
            .iter()
            .map(|e| CcEntryWire {
                line_number: e.line_number,
                approver_code: e.approver_code.clone(),
                action: e.action,
                action_at: e.action_at,
                attachment: e.attachment.clone(),
            })
            .collect(),
    };
    let notes = NotesWire {
        notes: doc
            .notes
            .notes()
            .iter()
            .map(|n| NoteWire {
                line_number: n.line_number,
                timestamp: n.timestamp,
                author: n.author.clone(),
                comment: n.comment.clone(),
                mentions: n.mentions.clone(),
            })
            .collect(),
    };
    let details = DetailsWire {
        details: doc
            .details
            .iter()
            .map(|d| DetailWire {
                line_number: d.line_number,
                item: d.item.clone(),
                quantity: d.quantity,
                remark: d.remark.clone(),
                sub_status: d.sub_status,
            })
            .collect(),
    };

    Ok(DocumentFiles {
        header: render_yaml(&header)?,
        cc: render_yaml(&cc)?,
        notes: render_yaml(&notes)?,
        details: render_yaml(&details)?,
    })
}

/// Rebuild a document from its files. The status label is read with the kind's policy.
pub(crate) fn parse_document(files: &DocumentFiles, cfg: &CoreConfig) -> WorkflowResult<Document> {
    let header: HeaderWire = parse_yaml(&files.header, "document header")?;
    let cc: CcListWire = parse_yaml(&files.cc, "CC list")?;
    let notes: NotesWire = parse_yaml(&files.notes, "notes")?;
    let details: DetailsWire = parse_yaml(&files.details, "details")?;

    let status = cfg.policy(header.kind).parse_status(&header.status)?;

    let cc_list = CcList::from_entries(
        cc.entries
            .into_iter()
            .map(|e| CcEntry {
                line_number: e.line_number,
                approver_code: e.approver_code,
                action: e.action,
                action_at: e.action_at,
                attachment: e.attachment,
            })
            .collect(),
    );

    Ok(Document {
        number: header.number,
        kind: header.kind,
        origin: header.origin,
        recipient: header.recipient,
        subject: header.subject,
        status,
        issued_at: header.issued_at,
        completed_at: header.completed_at,
        attachment: header.attachment,
        details: details
            .details
            .into_iter()
            .enumerate()
            .map(|(i, d)| DetailLine {
                line_number: i,
                item: d.item,
                quantity: d.quantity,
                remark: d.remark,
                sub_status: d.sub_status,
            })
            .collect(),
        cc_list,
        notes: NoteLedger::from_notes(
            notes
                .notes
                .into_iter()
                .map(|n| Note {
                    line_number: n.line_number,
                    timestamp: n.timestamp,
                    author: n.author,
                    comment: n.comment,
                    mentions: n.mentions,
                })
                .collect(),
        ),
    })
}

// ============================================================================
// Notifications
// ============================================================================

pub(crate) fn render_notifications(notifications: &[Notification]) -> WorkflowResult<String> {
    render_yaml(&NotificationsWire {
        notifications: notifications
            .iter()
            .map(|n| NotificationWire {
                recipient: n.recipient.clone(),
                created_at: n.created_at,
            })
            .collect(),
    })
}

pub(crate) fn parse_notifications(yaml_text: &str) -> WorkflowResult<Vec<Notification>> {
    let wire: NotificationsWire = parse_yaml(yaml_text, "notifications")?;
    Ok(wire
        .notifications
        .into_iter()
        .map(|n| Notification {
            recipient: n.recipient,
            created_at: n.created_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{not_completed, DocumentStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample(kind: DocumentKind) -> Document {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap();
        let mut notes = NoteLedger::default();
        notes.append(now, "MGMG-01", "requesting_review_cc2: why".into(), vec!["JPJL".into()]);
        let mut cc = CcList::from_entries(vec![CcEntry::pending("JPJL"), CcEntry::pending("MGMG")]);
        cc.get_mut(1).unwrap().action = CcAction::RequestingReview;
        cc.get_mut(1).unwrap().action_at = Some(now);

        Document {
            number: "BPB-JPJL-2026-0001".into(),
            kind,
            origin: "JPJL".into(),
            recipient: "GDGD".into(),
            subject: "Handover".into(),
            status: DocumentStatus::Completed,
            issued_at: now,
            completed_at: not_completed(),
            attachment: Some("form.pdf".into()),
            details: vec![DetailLine {
                line_number: 0,
                item: "Chair".into(),
                quantity: 4,
                remark: None,
                sub_status: DetailStatus::InProgress,
            }],
            cc_list: cc,
            notes,
        }
    }

    #[test]
    fn test_document_files_read_back_identically() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::with_defaults(temp.path().to_path_buf()).unwrap();
        let doc = sample(DocumentKind::Helpdesk);

        let files = render_document(&doc, cfg.policy(doc.kind)).unwrap();
        assert!(files.header.contains("status: PUBLISHED"));
        assert!(files.cc.contains("REQUESTING_REVIEW"));

        let parsed = parse_document(&files, &cfg).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_unknown_field_names_the_file() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::with_defaults(temp.path().to_path_buf()).unwrap();
        let mut files =
            render_document(&sample(DocumentKind::Bpb), cfg.policy(DocumentKind::Bpb)).unwrap();
        files.cc.push_str("extra: 1\n");

        match parse_document(&files, &cfg) {
            Err(WorkflowError::Translation(msg)) => {
                assert!(msg.starts_with("CC list schema mismatch"), "{msg}")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_status_label_must_match_kind() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::with_defaults(temp.path().to_path_buf()).unwrap();
        let doc = sample(DocumentKind::Bpb);
        let mut files = render_document(&doc, cfg.policy(DocumentKind::Bpb)).unwrap();
        files.header = files.header.replace("status: DONE", "status: PUBLISHED");
        assert!(matches!(
            parse_document(&files, &cfg),
            Err(WorkflowError::Translation(_))
        ));
    }

    #[test]
    fn test_notifications_file() {
        let now = Utc::now();
        let text = render_notifications(&[Notification {
            recipient: "JPJL-01".into(),
            created_at: now,
        }])
        .unwrap();
        let parsed = parse_notifications(&text).unwrap();
        assert_eq!(parsed[0].recipient, "JPJL-01");
        assert!(parse_notifications("notifications: 3\n").is_err());
    }
}
