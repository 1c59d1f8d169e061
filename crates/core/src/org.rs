//! Organisation hierarchy.
//!
//! The org tree is a flat table of users, each pointing at its superior. A user with a non-empty
//! `level` is the head of a department and is named `<DEPT><suffix>` (e.g. `JPJL-01`). The root
//! of the tree is the top authority (`MGMG` by default).
//!
//! The engine only reads this data. [`OrgDirectory`] loads and seeds it from YAML files under
//! the data directory.

use crate::constants::{
    DEFAULT_HEAD_SUFFIX, DEFAULT_TOP_AUTHORITY, DEPARTMENTS_FILENAME, DEPARTMENT_CODE_LEN,
    USERS_FILENAME,
};
use crate::records;
use crate::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

// ============================================================================
// Conventions
// ============================================================================

/// Naming conventions of the org tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrgConventions {
    top_authority: String,
    head_suffix: String,
}

impl Default for OrgConventions {
    fn default() -> Self {
        Self {
            top_authority: DEFAULT_TOP_AUTHORITY.to_string(),
            head_suffix: DEFAULT_HEAD_SUFFIX.to_string(),
        }
    }
}

impl OrgConventions {
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidInput` if either value is blank or contains whitespace.
    pub fn new(top_authority: &str, head_suffix: &str) -> WorkflowResult<Self> {
        for (name, value) in [("top authority", top_authority), ("head suffix", head_suffix)] {
            if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                return Err(WorkflowError::InvalidInput(format!(
                    "{name} must be a non-empty code without whitespace"
                )));
            }
        }
        Ok(Self {
            top_authority: top_authority.to_string(),
            head_suffix: head_suffix.to_string(),
        })
    }

    pub fn top_authority(&self) -> &str {
        &self.top_authority
    }

    pub fn head_suffix(&self) -> &str {
        &self.head_suffix
    }

    /// True for the top authority code or its head username.
    pub fn is_top_authority(&self, code: &str) -> bool {
        code == self.top_authority || code == self.head_username(&self.top_authority)
    }

    /// A bare 4-character department code such as `JPJL`.
    pub fn is_department_code(&self, code: &str) -> bool {
        code.chars().count() == DEPARTMENT_CODE_LEN && !code.contains('-')
    }

    pub fn head_username(&self, department: &str) -> String {
        format!("{department}{}", self.head_suffix)
    }

    /// Department code of a head username (`JPJL-01` -> `JPJL`).
    pub fn department_of_head<'a>(&self, username: &'a str) -> Option<&'a str> {
        username
            .strip_suffix(self.head_suffix.as_str())
            .filter(|dept| !dept.is_empty())
    }

    /// Username a notification for `code` is delivered to.
    pub fn recipient_for(&self, code: &str) -> String {
        if self.is_department_code(code) {
            self.head_username(code)
        } else {
            code.to_string()
        }
    }

    /// A department code and its head's username denote the same party.
    pub fn same_party(&self, a: &str, b: &str) -> bool {
        a == b
            || self.head_username(a) == b
            || self.head_username(b) == a
    }
}

// ============================================================================
// Master data
// ============================================================================

/// A user in the org tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgUser {
    pub username: String,
    /// Non-empty for department heads.
    #[serde(default)]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superior_username: Option<String>,
    #[serde(default = "active_default")]
    pub is_active: bool,
}

impl OrgUser {
    pub fn is_head(&self) -> bool {
        !self.level.trim().is_empty()
    }
}

/// A department.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Department {
    pub code: String,
    #[serde(default = "active_default")]
    pub is_active: bool,
}

fn active_default() -> bool {
    true
}

// ============================================================================
// Hierarchy queries
// ============================================================================

/// Read-only view of the org tree used by the engine.
#[derive(Clone, Debug)]
pub struct OrgHierarchy {
    users: Vec<OrgUser>,
    by_username: HashMap<String, usize>,
    conventions: OrgConventions,
}

impl OrgHierarchy {
    pub fn new(users: Vec<OrgUser>, conventions: OrgConventions) -> Self {
        let by_username = users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.username.clone(), i))
            .collect();
        Self {
            users,
            by_username,
            conventions,
        }
    }

    pub fn conventions(&self) -> &OrgConventions {
        &self.conventions
    }

    pub fn user(&self, username: &str) -> Option<&OrgUser> {
        self.by_username.get(username).map(|&i| &self.users[i])
    }

    /// The account a code refers to: a username, or the head of a department code.
    pub fn resolve_account(&self, code: &str) -> Option<&OrgUser> {
        self.user(code)
            .or_else(|| self.user(&self.conventions.head_username(code)))
    }

    pub fn superior(&self, username: &str) -> Option<&OrgUser> {
        self.user(username)?
            .superior_username
            .as_deref()
            .and_then(|s| self.user(s))
    }

    pub fn subordinates<'a>(&'a self, username: &'a str) -> impl Iterator<Item = &'a OrgUser> + 'a {
        self.users
            .iter()
            .filter(move |u| u.superior_username.as_deref() == Some(username))
    }

    /// Department code of a head, or `None` for staff.
    pub fn department_code_of(&self, user: &OrgUser) -> Option<String> {
        if !user.is_head() {
            return None;
        }
        Some(
            self.conventions
                .department_of_head(&user.username)
                .unwrap_or(&user.username)
                .to_string(),
        )
    }

    /// Approver code a mention occupies in a CC chain.
    ///
    /// Staff resolve to the department code of their nearest head ancestor. Department and head
    /// codes, the top authority and unknown codes stand for themselves.
    pub fn approver_code_for(&self, mention: &str) -> String {
        let Some(account) = self.resolve_account(mention) else {
            return mention.to_string();
        };
        if account.is_head() || self.conventions.is_top_authority(&account.username) {
            return mention.to_string();
        }

        let mut visited = HashSet::from([account.username.as_str()]);
        let mut current = self.superior(&account.username);
        while let Some(user) = current {
            if !visited.insert(user.username.as_str())
                || self.conventions.is_top_authority(&user.username)
            {
                break;
            }
            if let Some(code) = self.department_code_of(user) {
                return code;
            }
            current = self.superior(&user.username);
        }
        mention.to_string()
    }

    /// Department codes of the heads above `mention`, nearest first, stopping before the top
    /// authority.
    pub fn chain_of_command(&self, mention: &str) -> Vec<String> {
        let Some(account) = self.resolve_account(mention) else {
            return Vec::new();
        };

        let mut codes = Vec::new();
        let mut visited = HashSet::from([account.username.as_str()]);
        let mut current = self.superior(&account.username);
        while let Some(user) = current {
            if !visited.insert(user.username.as_str())
                || self.conventions.is_top_authority(&user.username)
            {
                break;
            }
            if let Some(code) = self.department_code_of(user) {
                codes.push(code);
            }
            current = self.superior(&user.username);
        }
        codes
    }

    /// Codes a reply from `username` answers for.
    ///
    /// A head covers its own department and username plus, transitively, every subordinate
    /// (heads by department code and username, staff by username). Anyone else covers only
    /// themselves.
    pub fn covered_by(&self, username: &str) -> HashSet<String> {
        let mut covered = HashSet::from([username.to_string()]);
        let Some(replier) = self.user(username).filter(|u| u.is_head()) else {
            return covered;
        };
        if let Some(code) = self.department_code_of(replier) {
            covered.insert(code);
        }

        let mut seen = HashSet::from([replier.username.as_str()]);
        let mut queue = VecDeque::from([replier.username.as_str()]);
        while let Some(superior) = queue.pop_front() {
            for sub in self.subordinates(superior) {
                if !seen.insert(sub.username.as_str()) {
                    continue;
                }
                if let Some(code) = self.department_code_of(sub) {
                    covered.insert(code);
                }
                covered.insert(sub.username.clone());
                queue.push_back(sub.username.as_str());
            }
        }
        covered
    }

    /// A mention is resolved when it, or its head username, is covered.
    pub fn is_resolved(&self, mention: &str, covered: &HashSet<String>) -> bool {
        covered.contains(mention) || covered.contains(&self.conventions.head_username(mention))
    }

    /// Active user lookup used to authorise actors.
    pub fn active_user(&self, username: &str) -> WorkflowResult<&OrgUser> {
        match self.user(username) {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(WorkflowError::AuthorizationFailed(format!(
                "user {username} is inactive"
            ))),
            None => Err(WorkflowError::AuthorizationFailed(format!(
                "unknown user {username}"
            ))),
        }
    }
}

// ============================================================================
// YAML-backed directory
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct UsersFile {
    #[serde(default)]
    users: Vec<OrgUser>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DepartmentsFile {
    #[serde(default)]
    departments: Vec<Department>,
}

/// Org master data stored as `users.yaml` and `departments.yaml` under one directory.
#[derive(Clone, Debug)]
pub struct OrgDirectory {
    org_dir: PathBuf,
}

impl OrgDirectory {
    pub fn new(org_dir: impl Into<PathBuf>) -> Self {
        Self {
            org_dir: org_dir.into(),
        }
    }

    pub fn org_dir(&self) -> &Path {
        &self.org_dir
    }

    /// All users; an absent file is an empty org.
    pub fn list_users(&self) -> WorkflowResult<Vec<OrgUser>> {
        Ok(self
            .read_file::<UsersFile>(USERS_FILENAME, "org users")?
            .unwrap_or_default()
            .users)
    }

    pub fn list_departments(&self) -> WorkflowResult<Vec<Department>> {
        Ok(self
            .read_file::<DepartmentsFile>(DEPARTMENTS_FILENAME, "org departments")?
            .unwrap_or_default()
            .departments)
    }

    pub fn hierarchy(&self, conventions: &OrgConventions) -> WorkflowResult<OrgHierarchy> {
        Ok(OrgHierarchy::new(self.list_users()?, conventions.clone()))
    }

    /// Add a user.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::RecordExists` if the username is taken.
    pub fn register_user(&self, user: OrgUser) -> WorkflowResult<()> {
        if user.username.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("username must not be empty".into()));
        }
        let mut users = self.list_users()?;
        if users.iter().any(|u| u.username == user.username) {
            return Err(WorkflowError::RecordExists(format!(
                "user {}",
                user.username
            )));
        }
        tracing::debug!(username = %user.username, "registering org user");
        users.push(user);
        self.write_file(USERS_FILENAME, &UsersFile { users })
    }

    /// Add a department.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::RecordExists` if the code is taken.
    pub fn register_department(&self, department: Department) -> WorkflowResult<()> {
        if department.code.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "department code must not be empty".into(),
            ));
        }
        let mut departments = self.list_departments()?;
        if departments.iter().any(|d| d.code == department.code) {
            return Err(WorkflowError::RecordExists(format!(
                "department {}",
                department.code
            )));
        }
        departments.push(department);
        self.write_file(DEPARTMENTS_FILENAME, &DepartmentsFile { departments })
    }

    /// Replace the whole org from a seed document with `users` and `departments` keys.
    pub fn import(&self, yaml_text: &str) -> WorkflowResult<(usize, usize)> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Seed {
            #[serde(default)]
            users: Vec<OrgUser>,
            #[serde(default)]
            departments: Vec<Department>,
        }

        let seed: Seed = records::parse_yaml(yaml_text, "org seed")?;
        let mut seen = HashSet::new();
        if let Some(dup) = seed.users.iter().find(|u| !seen.insert(&u.username)) {
            return Err(WorkflowError::RecordExists(format!("user {}", dup.username)));
        }

        let counts = (seed.users.len(), seed.departments.len());
        self.write_file(USERS_FILENAME, &UsersFile { users: seed.users })?;
        self.write_file(
            DEPARTMENTS_FILENAME,
            &DepartmentsFile {
                departments: seed.departments,
            },
        )?;
        tracing::info!(users = counts.0, departments = counts.1, "org imported");
        Ok(counts)
    }

    fn read_file<T: serde::de::DeserializeOwned>(
        &self,
        filename: &str,
        what: &str,
    ) -> WorkflowResult<Option<T>> {
        let path = self.org_dir.join(filename);
        match std::fs::read_to_string(&path) {
            Ok(text) => records::parse_yaml(&text, what).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorkflowError::FileRead(e)),
        }
    }

    fn write_file<T: Serialize>(&self, filename: &str, value: &T) -> WorkflowResult<()> {
        std::fs::create_dir_all(&self.org_dir).map_err(WorkflowError::StorageDirCreation)?;
        let text = serde_yaml::to_string(value).map_err(WorkflowError::YamlSerialization)?;
        std::fs::write(self.org_dir.join(filename), text).map_err(WorkflowError::FileWrite)
    }
}
