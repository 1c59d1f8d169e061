//! Document number allocation.
//!
//! Numbers look like `BPB-JPJL-2026-0007`: the kind prefix, the scope (origin department), the
//! issue year and a zero-padded per-scope sequence. A number is taken by creating its document
//! directory, so two writers racing for the same sequence cannot both succeed.

use crate::constants::{MAX_SEQUENCE_ATTEMPTS, SEQUENCE_WIDTH};
use crate::document::DocumentKind;
use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Datelike, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// `"<TYPE>-<scope>-<year>-"`.
pub fn number_prefix(kind: DocumentKind, scope: &str, year: i32) -> String {
    format!("{}-{scope}-{year}-", kind.number_prefix())
}

/// Highest sequence already used under `prefix` in `kind_dir`, or 0.
pub fn max_sequence(kind_dir: &Path, prefix: &str) -> WorkflowResult<u32> {
    let entries = match std::fs::read_dir(kind_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(WorkflowError::SequenceReservation(e)),
    };

    let mut max = 0;
    for entry in entries {
        let entry = entry.map_err(WorkflowError::SequenceReservation)?;
        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(prefix)) else {
            continue;
        };
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(seq) = rest.parse::<u32>() {
            max = max.max(seq);
        }
    }
    Ok(max)
}

/// Next number for `scope`, without reserving it.
pub fn generate_number(
    kind_dir: &Path,
    kind: DocumentKind,
    scope: &str,
    now: DateTime<Utc>,
) -> WorkflowResult<String> {
    validate_scope(scope)?;
    let prefix = number_prefix(kind, scope, now.year());
    let next = max_sequence(kind_dir, &prefix)?
        .checked_add(1)
        .ok_or_else(|| WorkflowError::InvalidInput(format!("sequence {prefix} is exhausted")))?;
    Ok(format!("{prefix}{next:0width$}", width = SEQUENCE_WIDTH))
}

/// Allocate the next number for `scope` and create its (empty) document directory.
///
/// # Errors
///
/// Returns `WorkflowError::SequenceReservation` if the directory cannot be created or every
/// attempt lost a race.
pub fn reserve_number(
    kind_dir: &Path,
    kind: DocumentKind,
    scope: &str,
    now: DateTime<Utc>,
) -> WorkflowResult<(String, PathBuf)> {
    std::fs::create_dir_all(kind_dir).map_err(WorkflowError::StorageDirCreation)?;

    for _attempt in 0..MAX_SEQUENCE_ATTEMPTS {
        let number = generate_number(kind_dir, kind, scope, now)?;
        let candidate = kind_dir.join(&number);
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok((number, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(%number, "document number taken concurrently, retrying");
                continue;
            }
            Err(e) => return Err(WorkflowError::SequenceReservation(e)),
        }
    }

    Err(WorkflowError::SequenceReservation(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("failed to reserve a {kind} number for {scope} after {MAX_SEQUENCE_ATTEMPTS} attempts"),
    )))
}

fn validate_scope(scope: &str) -> WorkflowResult<()> {
    if scope.is_empty()
        || scope
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | '.' | '\0'))
    {
        return Err(WorkflowError::InvalidInput(format!(
            "invalid numbering scope {scope:?}"
        )));
    }
    Ok(())
}
