//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{
    ATTACHMENTS_DIR_NAME, DEFAULT_COMMIT_EMAIL_DOMAIN, DEFAULT_DATA_DIR, DEFAULT_HEAD_SUFFIX,
    DEFAULT_TOP_AUTHORITY, DOCUMENTS_DIR_NAME, ORG_DIR_NAME,
};
use crate::document::{DocumentKind, DocumentPolicy};
use crate::org::OrgConventions;
use crate::{WorkflowError, WorkflowResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    conventions: OrgConventions,
    bpb_policy: DocumentPolicy,
    helpdesk_policy: DocumentPolicy,
    commit_email_domain: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig` with the default document-type policies.
    pub fn new(
        data_dir: PathBuf,
        conventions: OrgConventions,
        commit_email_domain: String,
    ) -> WorkflowResult<Self> {
        let commit_email_domain = commit_email_domain.trim().to_string();
        if commit_email_domain.is_empty() || commit_email_domain.contains(['@', '\n', '\r']) {
            return Err(WorkflowError::InvalidInput(
                "commit_email_domain must be a bare, single-line domain".into(),
            ));
        }

        Ok(Self {
            data_dir,
            conventions,
            bpb_policy: DocumentPolicy::for_kind(DocumentKind::Bpb),
            helpdesk_policy: DocumentPolicy::for_kind(DocumentKind::Helpdesk),
            commit_email_domain,
        })
    }

    /// Configuration with default conventions rooted at `data_dir`.
    pub fn with_defaults(data_dir: PathBuf) -> WorkflowResult<Self> {
        Self::new(
            data_dir,
            OrgConventions::default(),
            DEFAULT_COMMIT_EMAIL_DOMAIN.into(),
        )
    }

    /// Overrides whether `APPROVE` produces a trailing note for one document kind.
    pub fn with_approve_note(mut self, kind: DocumentKind, required: bool) -> Self {
        match kind {
            DocumentKind::Bpb => self.bpb_policy = self.bpb_policy.with_approve_note(required),
            DocumentKind::Helpdesk => {
                self.helpdesk_policy = self.helpdesk_policy.with_approve_note(required)
            }
        }
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join(DOCUMENTS_DIR_NAME)
    }

    pub fn kind_dir(&self, kind: DocumentKind) -> PathBuf {
        self.documents_dir().join(kind.as_str())
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join(ATTACHMENTS_DIR_NAME)
    }

    pub fn org_dir(&self) -> PathBuf {
        self.data_dir.join(ORG_DIR_NAME)
    }

    pub fn conventions(&self) -> &OrgConventions {
        &self.conventions
    }

    pub fn policy(&self, kind: DocumentKind) -> &DocumentPolicy {
        match kind {
            DocumentKind::Bpb => &self.bpb_policy,
            DocumentKind::Helpdesk => &self.helpdesk_policy,
        }
    }

    pub fn commit_email_domain(&self) -> &str {
        &self.commit_email_domain
    }

    /// Create the on-disk layout (documents per kind, attachments, org) if missing.
    pub fn ensure_layout(&self) -> WorkflowResult<()> {
        for kind in DocumentKind::ALL {
            std::fs::create_dir_all(self.kind_dir(kind))
                .map_err(WorkflowError::StorageDirCreation)?;
        }
        std::fs::create_dir_all(self.attachments_dir())
            .map_err(WorkflowError::StorageDirCreation)?;
        std::fs::create_dir_all(self.org_dir()).map_err(WorkflowError::StorageDirCreation)?;
        Ok(())
    }
}

/// Parse org conventions from optional environment values.
///
/// Empty or missing values fall back to `MGMG` and `-01`.
pub fn conventions_from_env_values(
    top_authority: Option<String>,
    head_suffix: Option<String>,
) -> WorkflowResult<OrgConventions> {
    let top_authority = non_blank(top_authority).unwrap_or_else(|| DEFAULT_TOP_AUTHORITY.into());
    let head_suffix = non_blank(head_suffix).unwrap_or_else(|| DEFAULT_HEAD_SUFFIX.into());
    OrgConventions::new(&top_authority, &head_suffix)
}

/// Parse an optional boolean flag such as `BPB_APPROVE_REQUIRES_NOTE`.
///
/// Returns `None` when the value is missing or blank so the policy default applies.
pub fn flag_from_env_value(value: Option<String>) -> WorkflowResult<Option<bool>> {
    match non_blank(value) {
        None => Ok(None),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(WorkflowError::InvalidInput(format!(
                "expected a boolean flag, got {v:?}"
            ))),
        },
    }
}

/// Raw values of the environment variables that configure the core.
#[derive(Clone, Debug, Default)]
pub struct EnvValues {
    pub data_dir: Option<String>,
    pub top_authority: Option<String>,
    pub head_suffix: Option<String>,
    pub commit_email_domain: Option<String>,
    pub bpb_approve_note: Option<String>,
    pub helpdesk_approve_note: Option<String>,
}

impl EnvValues {
    /// Snapshot the process environment. Call once at startup.
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            data_dir: var("APPROVAL_DATA_DIR"),
            top_authority: var("APPROVAL_TOP_AUTHORITY"),
            head_suffix: var("APPROVAL_HEAD_SUFFIX"),
            commit_email_domain: var("APPROVAL_COMMIT_EMAIL_DOMAIN"),
            bpb_approve_note: var("BPB_APPROVE_REQUIRES_NOTE"),
            helpdesk_approve_note: var("HELPDESK_APPROVE_REQUIRES_NOTE"),
        }
    }
}

/// Build a [`CoreConfig`] from raw environment values, applying defaults for blanks.
pub fn config_from_env_values(values: EnvValues) -> WorkflowResult<CoreConfig> {
    let data_dir = non_blank(values.data_dir).unwrap_or_else(|| DEFAULT_DATA_DIR.into());
    let conventions = conventions_from_env_values(values.top_authority, values.head_suffix)?;
    let domain = non_blank(values.commit_email_domain)
        .unwrap_or_else(|| DEFAULT_COMMIT_EMAIL_DOMAIN.into());

    let mut cfg = CoreConfig::new(PathBuf::from(data_dir), conventions, domain)?;
    if let Some(required) = flag_from_env_value(values.bpb_approve_note)? {
        cfg = cfg.with_approve_note(DocumentKind::Bpb, required);
    }
    if let Some(required) = flag_from_env_value(values.helpdesk_approve_note)? {
        cfg = cfg.with_approve_note(DocumentKind::Helpdesk, required);
    }
    Ok(cfg)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
