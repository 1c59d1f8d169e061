//! Commit authorship for workflow changes.
//!
//! Every change to a document repository is committed under the identity of the org user who
//! triggered it. Usernames are single-line codes (`JPJL-01`, `U`) so the e-mail address is built
//! from the username and the configured commit domain.

use crate::{WorkflowError, WorkflowResult};
use approval_types::NonEmptyText;

/// Represents the author of a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    /// The acting username.
    pub name: NonEmptyText,

    /// Synthetic e-mail address (`<username>@<domain>`).
    pub email: String,
}

impl Author {
    /// Build the commit author for `actor`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the username is empty, spans lines, or contains
    /// whitespace or `@`.
    pub fn for_actor(actor: &str, email_domain: &str) -> WorkflowResult<Self> {
        let name = NonEmptyText::single_line(actor.trim())
            .map_err(|e| WorkflowError::InvalidInput(format!("actor username: {e}")))?;
        if name.as_str().chars().any(char::is_whitespace) || name.as_str().contains('@') {
            return Err(WorkflowError::InvalidInput(
                "actor username must not contain whitespace or '@'".into(),
            ));
        }

        let local_part = name.as_str().to_ascii_lowercase();
        Ok(Self {
            email: format!("{local_part}@{email_domain}"),
            name,
        })
    }

    /// Validate that this author can be written into a commit signature.
    pub fn validate_commit_author(&self) -> WorkflowResult<()> {
        if self.email.contains(['\n', '\r', ' ']) || !self.email.contains('@') {
            return Err(WorkflowError::InvalidInput(format!(
                "invalid commit e-mail {:?}",
                self.email
            )));
        }
        Ok(())
    }
}
