//! Review-request mention expansion.
//!
//! When the top authority asks for review, every mention is pulled into the CC chain together
//! with the heads between it and the top authority. Heads that were not mentioned explicitly are
//! added to the mention list and marked in the comment.

use crate::constants::ADDED_BY_SYSTEM_MARKER;
use crate::document::CcList;
use crate::org::OrgHierarchy;

/// Result of expanding a review request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MentionExpansion {
    /// Approver codes to insert before the reviewing entry, in staging order.
    pub staged: Vec<String>,
    /// Mentions with escalation codes spliced in after their originating mention.
    pub mentions: Vec<String>,
    /// Comment with ` @<code>! (added by system)` markers inserted.
    pub comment: String,
}

pub fn expand_review_mentions(
    cc: &CcList,
    org: &OrgHierarchy,
    mentions: &[String],
    comment: &str,
) -> MentionExpansion {
    let conventions = org.conventions();
    let mut staged: Vec<String> = Vec::new();
    let mut mention_set: Vec<String> = mentions.to_vec();
    let mut expanded: Vec<String> = Vec::with_capacity(mentions.len());
    let mut insertions: Vec<(usize, String)> = Vec::new();

    let known = |code: &str, staged: &[String]| {
        cc.contains_party(code, conventions)
            || staged.iter().any(|s| conventions.same_party(s, code))
    };

    for mention in mentions {
        expanded.push(mention.clone());

        let approver = org.approver_code_for(mention);
        if !known(&approver, &staged) {
            staged.push(approver);
        }

        let mut additional: Vec<String> = Vec::new();
        for code in org.chain_of_command(mention) {
            if !mention_set.iter().any(|m| conventions.same_party(m, &code)) {
                mention_set.push(code.clone());
                additional.push(code.clone());
            }
            if !known(&code, &staged) {
                staged.push(code);
            }
        }

        if additional.is_empty() {
            continue;
        }

        let text: String = additional
            .iter()
            .map(|code| format!(" @{code}{ADDED_BY_SYSTEM_MARKER}"))
            .collect();
        let position = mention_end(comment, mention).unwrap_or(comment.len());
        insertions.push((position, text));
        expanded.extend(additional);
    }

    MentionExpansion {
        staged,
        mentions: expanded,
        comment: apply_insertions(comment, insertions),
    }
}

/// Byte offset just past the first `@<mention>` that is not followed by more of a code.
fn mention_end(comment: &str, mention: &str) -> Option<usize> {
    let marker = format!("@{mention}");
    comment.match_indices(&marker).find_map(|(start, _)| {
        let end = start + marker.len();
        let continues = comment[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_');
        (!continues).then_some(end)
    })
}

/// Apply insertions given as offsets into the original text.
fn apply_insertions(original: &str, mut insertions: Vec<(usize, String)>) -> String {
    insertions.sort_by_key(|(position, _)| *position);
    let extra: usize = insertions.iter().map(|(_, text)| text.len()).sum();

    let mut out = String::with_capacity(original.len() + extra);
    let mut cursor = 0;
    for (position, text) in insertions {
        out.push_str(&original[cursor..position]);
        out.push_str(&text);
        cursor = position;
    }
    out.push_str(&original[cursor..]);
    out
}
