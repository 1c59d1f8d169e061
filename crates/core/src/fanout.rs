//! Notification fan-out.
//!
//! A pure function from the CC chain and the event just applied to the set of usernames that
//! must hold an unread marker for the document. `None` leaves the stored set untouched; `Some`
//! replaces it wholesale.

use crate::document::{CcAction, CcList};
use crate::org::OrgConventions;
use chrono::{DateTime, Utc};

/// What just happened to the document.
#[derive(Clone, Copy, Debug)]
pub enum FanoutEvent<'a> {
    Feedback {
        line: usize,
        action: CcAction,
        /// Final mentions of the trailing note, if one was written.
        mentions: &'a [String],
    },
    Created,
    Revised,
    FollowUp,
    /// Reply to a review request. `approver` opened it, or last asked for revision.
    ReplyForReview { approver: Option<&'a str> },
    /// Anything else (reopen, detail status).
    Untouched,
}

/// An unread marker for one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub created_at: DateTime<Utc>,
}

/// Recipients after `event`, or `None` to leave the current set as is.
pub fn recipients(
    cc: &CcList,
    event: &FanoutEvent<'_>,
    conventions: &OrgConventions,
) -> Option<Vec<String>> {
    match *event {
        FanoutEvent::Feedback {
            line,
            action,
            mentions,
        } => {
            let actor = cc.get(line)?;
            match action {
                CcAction::Revision | CcAction::Reject
                    if conventions.is_top_authority(&actor.approver_code) =>
                {
                    Some(deliver(
                        conventions,
                        cc.entries()[..line].iter().map(|e| e.approver_code.as_str()),
                    ))
                }
                CcAction::RequestingReview if !mentions.is_empty() => {
                    Some(deliver(conventions, mentions.iter().map(String::as_str)))
                }
                _ => None,
            }
        }
        FanoutEvent::Created | FanoutEvent::Revised | FanoutEvent::FollowUp => {
            let current = cc.current()?;
            Some(deliver(conventions, std::iter::once(current.approver_code.as_str())))
        }
        FanoutEvent::ReplyForReview { approver } => {
            approver.map(|code| deliver(conventions, std::iter::once(code)))
        }
        FanoutEvent::Untouched => None,
    }
}

fn deliver<'s>(conventions: &OrgConventions, codes: impl Iterator<Item = &'s str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in codes {
        let recipient = conventions.recipient_for(code);
        if !out.contains(&recipient) {
            out.push(recipient);
        }
    }
    out
}

/// Stamp a recipient list as fresh unread markers.
pub fn markers(recipients: Vec<String>, now: DateTime<Utc>) -> Vec<Notification> {
    recipients
        .into_iter()
        .map(|recipient| Notification {
            recipient,
            created_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CcEntry;

    fn chain(codes: &[(&str, CcAction)]) -> CcList {
        CcList::from_entries(
            codes
                .iter()
                .map(|(c, a)| {
                    let mut e = CcEntry::pending(*c);
                    e.action = *a;
                    e
                })
                .collect(),
        )
    }

    #[test]
    fn test_top_authority_revision_notifies_everyone_before_it() {
        let cc = chain(&[
            ("JPJL", CcAction::Approve),
            ("GDGD", CcAction::Approve),
            ("MGMG", CcAction::Revision),
        ]);
        let got = recipients(
            &cc,
            &FanoutEvent::Feedback {
                line: 2,
                action: CcAction::Revision,
                mentions: &[],
            },
            &OrgConventions::default(),
        );
        assert_eq!(got.unwrap(), ["JPJL-01", "GDGD-01"]);
    }

    #[test]
    fn test_non_top_revision_leaves_set_untouched() {
        let cc = chain(&[("JPJL", CcAction::Revision), ("MGMG", CcAction::NoAction)]);
        let got = recipients(
            &cc,
            &FanoutEvent::Feedback {
                line: 0,
                action: CcAction::Revision,
                mentions: &[],
            },
            &OrgConventions::default(),
        );
        assert!(got.is_none());
    }

    #[test]
    fn test_review_request_notifies_mentions() {
        let cc = chain(&[("MGMG", CcAction::RequestingReview)]);
        let mentions = vec!["JPJL".to_string(), "U".to_string()];
        let got = recipients(
            &cc,
            &FanoutEvent::Feedback {
                line: 0,
                action: CcAction::RequestingReview,
                mentions: &mentions,
            },
            &OrgConventions::default(),
        );
        assert_eq!(got.unwrap(), ["JPJL-01", "U"]);
    }

    #[test]
    fn test_follow_up_targets_current_approver() {
        let cc = chain(&[("JPJL", CcAction::Approve), ("GDGD", CcAction::NoAction)]);
        let got = recipients(&cc, &FanoutEvent::FollowUp, &OrgConventions::default());
        assert_eq!(got.unwrap(), ["GDGD-01"]);
        assert!(recipients(&cc, &FanoutEvent::Untouched, &OrgConventions::default()).is_none());
    }
}
