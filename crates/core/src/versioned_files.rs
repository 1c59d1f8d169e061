//! Git-versioned document directories.
//!
//! Each document lives in its own directory with a local Git repository (`git2`/libgit2).
//! Every workflow transaction writes the affected YAML files and commits them together, so the
//! repository history is the audit trail of the approval process.
//!
//! ## Guarantees
//!
//! - **Atomic multi-file writes**: all files of one transaction land in a single commit. On
//!   failure, previously existing files are restored, new files are removed and any directories
//!   created on the way are removed again.
//! - **Atomic creation**: [`VersionedFileService::init_and_commit`] either leaves a fully
//!   initialised repository with its first commit or removes the document directory.
//! - **Structured messages**: commits use [`WorkflowCommitMessage`], rendered as
//!   `<kind>:<action>: <summary>` followed by sorted trailers.
//!
//! All repositories use `refs/heads/main`.

use crate::author::Author;
use crate::document::DocumentKind;
use crate::{WorkflowError, WorkflowResult};
use approval_types::NonEmptyText;
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::{LazyLock, Mutex};

const MAIN_REF: &str = "refs/heads/main";

/// The operation recorded by a commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WorkflowCommitAction {
    Create,
    Feedback,
    Reply,
    Revise,
    Reopen,
    FollowUp,
    DetailStatus,
    MarkRead,
}

impl WorkflowCommitAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Feedback => "feedback",
            Self::Reply => "reply",
            Self::Revise => "revise",
            Self::Reopen => "reopen",
            Self::FollowUp => "follow-up",
            Self::DetailStatus => "detail-status",
            Self::MarkRead => "mark-read",
        }
    }
}

impl fmt::Display for WorkflowCommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `Key: Value` trailer.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommitTrailer {
    key: String,
    value: String,
}

impl CommitTrailer {
    /// Create a trailer.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if the key or value is empty or multi-line, or if
    /// the key contains `:`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> WorkflowResult<Self> {
        let key = key.into().trim().to_string();
        let value = value.into().trim().to_string();

        if key.is_empty()
            || key.contains(['\n', '\r', ':'])
            || value.is_empty()
            || value.contains(['\n', '\r'])
        {
            return Err(WorkflowError::InvalidInput(
                "commit trailer key/value must be non-empty and single-line (key cannot contain ':')"
                    .into(),
            ));
        }

        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A structured commit message for a document repository.
///
/// Rendering rules:
///
/// - Subject line: `<kind>:<action>: <summary>`
/// - `Actor: <username>` always follows a blank line
/// - Remaining trailers are sorted by key then value
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkflowCommitMessage {
    kind: DocumentKind,
    action: WorkflowCommitAction,
    summary: NonEmptyText,
    trailers: Vec<CommitTrailer>,
}

impl WorkflowCommitMessage {
    /// Create a commit message.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if `summary` is empty or contains a newline.
    pub fn new(
        kind: DocumentKind,
        action: WorkflowCommitAction,
        summary: impl AsRef<str>,
    ) -> WorkflowResult<Self> {
        let summary = NonEmptyText::single_line(summary.as_ref().trim())
            .map_err(|e| WorkflowError::InvalidInput(format!("commit summary: {e}")))?;

        Ok(Self {
            kind,
            action,
            summary,
            trailers: Vec::new(),
        })
    }

    /// Add a trailer. `Actor` is reserved and rendered from the commit author.
    pub fn with_trailer(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> WorkflowResult<Self> {
        let trailer = CommitTrailer::new(key, value)?;
        if trailer.key() == "Actor" {
            return Err(WorkflowError::InvalidInput(
                "the Actor trailer is reserved".into(),
            ));
        }
        self.trailers.push(trailer);
        Ok(self)
    }

    /// Render the full message including the `Actor` trailer.
    pub fn render_with_author(&self, author: &Author) -> WorkflowResult<String> {
        author.validate_commit_author()?;

        let mut rendered = format!(
            "{}:{}: {}",
            self.kind.as_str(),
            self.action,
            self.summary.as_str()
        );

        let mut other = self.trailers.clone();
        other.sort_by(|a, b| (a.key(), a.value()).cmp(&(b.key(), b.value())));

        rendered.push_str("\n\nActor: ");
        rendered.push_str(author.name.as_str());

        for trailer in other {
            rendered.push('\n');
            rendered.push_str(trailer.key());
            rendered.push_str(": ");
            rendered.push_str(trailer.value());
        }

        Ok(rendered)
    }
}

/// A file to be written and committed.
#[derive(Debug, Clone)]
pub struct FileToWrite<'a> {
    /// Path relative to the repository directory.
    pub relative_path: &'a Path,
    /// New content.
    pub content: &'a str,
    /// Previous content used for rollback. `None` for a new file.
    pub old_content: Option<&'a str>,
}

/// Git operations on a repository rooted at `workdir`.
pub struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    /// Initialise a new repository at `workdir`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::GitInit`] if libgit2 cannot create the repository or the
    /// result is bare.
    pub fn init(workdir: &Path) -> WorkflowResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(WorkflowError::GitInit)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                WorkflowError::GitInit(git2::Error::from_str(
                    "repository has no working directory",
                ))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open the repository at exactly `workdir`, without searching parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::GitOpen`] if there is no repository at `workdir`.
    pub fn open(workdir: &Path) -> WorkflowResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(WorkflowError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                WorkflowError::GitOpen(git2::Error::from_str(
                    "repository has no working directory",
                ))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Number of commits reachable from `HEAD`.
    pub fn commit_count(&self) -> WorkflowResult<usize> {
        let mut walk = self.repo.revwalk().map_err(WorkflowError::GitHead)?;
        match walk.push_head() {
            Ok(()) => Ok(walk.count()),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(0),
            Err(e) => Err(WorkflowError::GitHead(e)),
        }
    }

    /// Message of the commit at `HEAD`, if any.
    pub fn head_message(&self) -> WorkflowResult<Option<String>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(WorkflowError::GitPeel)?;
                Ok(commit.message().map(str::to_string))
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(WorkflowError::GitHead(e)),
        }
    }

    fn ensure_main_head(&self) -> WorkflowResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(WorkflowError::GitSetHead)
    }

    /// Commit only the given workdir-relative paths. Paths containing `..` are rejected.
    pub fn commit_paths(
        &self,
        author: &Author,
        message: &WorkflowCommitMessage,
        relative_paths: &[PathBuf],
    ) -> WorkflowResult<git2::Oid> {
        let rendered = message.render_with_author(author)?;
        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(WorkflowError::GitIndex)?;

        for path in relative_paths {
            let rel = if path.is_absolute() {
                path.strip_prefix(&self.workdir)
                    .map_err(|_| {
                        WorkflowError::InvalidInput(
                            "path is outside the repository working directory".into(),
                        )
                    })?
                    .to_path_buf()
            } else {
                path.to_path_buf()
            };

            if rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(WorkflowError::InvalidInput(
                    "path must not contain parent directory references (..)".into(),
                ));
            }

            index.add_path(&rel).map_err(WorkflowError::GitAdd)?;
        }
        index.write().map_err(WorkflowError::GitIndex)?;

        let tree_id = index.write_tree().map_err(WorkflowError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(WorkflowError::GitFindTree)?;
        let sig = git2::Signature::now(author.name.as_str(), &author.email)
            .map_err(WorkflowError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &rendered, &tree, &parent_refs)
            .map_err(WorkflowError::GitCommit)
    }

    /// Write `files` into the repository at `repo_path` and commit them together.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error ([`WorkflowError::FileWrite`] or a Git variant).
    /// Before returning, every written file is restored from `old_content` (or removed when
    /// new) and directories created by this call are removed.
    pub fn write_and_commit_files(
        repo_path: &Path,
        author: &Author,
        msg: &WorkflowCommitMessage,
        files: &[FileToWrite],
    ) -> WorkflowResult<()> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: WorkflowResult<()> = (|| {
            let mut dirs_needed = std::collections::HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                let mut current = full_path.parent();
                while let Some(dir) = current {
                    if dir == repo.workdir || dir.exists() {
                        break;
                    }
                    dirs_needed.insert(dir.to_path_buf());
                    current = dir.parent();
                }
            }

            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(WorkflowError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                std::fs::write(&full_path, file.content).map_err(WorkflowError::FileWrite)?;
                written_files.push((full_path, file.old_content.map(str::to_string)));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(author, msg, &paths)?;
            Ok(())
        })();

        if let Err(write_error) = result {
            for (full_path, old_content) in written_files.iter().rev() {
                match old_content {
                    Some(contents) => {
                        let _ = std::fs::write(full_path, contents);
                    }
                    None => {
                        let _ = std::fs::remove_file(full_path);
                    }
                }
            }
            for dir in created_dirs.iter().rev() {
                let _ = std::fs::remove_dir(dir);
            }
            return Err(write_error);
        }

        Ok(())
    }

    /// Initialise a repository in the (already reserved) `document_dir`, write the initial
    /// files and commit them. On failure the whole directory is removed.
    ///
    /// # Errors
    ///
    /// Returns the initialisation or commit error. If removing the directory also fails,
    /// returns [`WorkflowError::CleanupAfterCreateFailed`] carrying both errors.
    pub fn init_and_commit(
        document_dir: &Path,
        author: &Author,
        message: &WorkflowCommitMessage,
        files: &[FileToWrite],
    ) -> WorkflowResult<()> {
        let result: WorkflowResult<()> = (|| {
            let _repo = Self::init(document_dir)?;
            Self::write_and_commit_files(document_dir, author, message, files)
        })();

        match result {
            Ok(()) => Ok(()),
            Err(create_error) => {
                if let Err(cleanup_error) = cleanup_document_dir(document_dir) {
                    return Err(WorkflowError::CleanupAfterCreateFailed {
                        path: document_dir.to_path_buf(),
                        create_error: Box::new(create_error),
                        cleanup_error,
                    });
                }
                Err(create_error)
            }
        }
    }

    fn resolve_head_parents(&self) -> WorkflowResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(WorkflowError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(WorkflowError::GitHead(e)),
        }
    }
}

#[cfg(test)]
static FORCE_CLEANUP_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn cleanup_document_dir(document_dir: &Path) -> std::io::Result<()> {
    #[cfg(test)]
    {
        let current_id = std::thread::current().id();
        let mut guard = FORCE_CLEANUP_ERROR_FOR_THREADS
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if guard.remove(&current_id) {
            return Err(std::io::Error::other("forced cleanup failure (test hook)"));
        }
    }

    std::fs::remove_dir_all(document_dir)
}
