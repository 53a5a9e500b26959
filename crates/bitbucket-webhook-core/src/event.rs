//! Canonical, provider-agnostic event record.
//!
//! [`CanonicalEvent`] is what the rest of the system consumes. It carries the
//! same shape for push and pull-request deliveries; fields that have no meaning
//! for a given event family are left at their zero value and are omitted when
//! the record is serialized.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Event Kind
// ============================================================================

/// Canonical classification of a normalized delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Commits pushed to (or a branch created/deleted in) a repository
    Push,
    /// Pull request opened
    PrOpened,
    /// Pull request updated
    PrEdited,
    /// Pull request merged
    PrMerged,
    /// Pull request declined
    PrRejected,
}

impl EventKind {
    /// Canonical string form, identical to the serialized value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "Push",
            Self::PrOpened => "PrOpened",
            Self::PrEdited => "PrEdited",
            Self::PrMerged => "PrMerged",
            Self::PrRejected => "PrRejected",
        }
    }

    /// Whether this kind belongs to the pull-request family
    pub fn is_pull_request(&self) -> bool {
        !matches!(self, Self::Push)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Branch Status
// ============================================================================

/// Lifecycle of a branch reference within a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Created,
    Updated,
    Deleted,
}

impl BranchStatus {
    /// Classify a branch change from whether the reference existed before and
    /// after the push.
    ///
    /// | existed before | exists after | status    |
    /// |----------------|--------------|-----------|
    /// | yes            | no           | `Deleted` |
    /// | no             | yes          | `Created` |
    /// | otherwise      |              | `Updated` |
    pub fn classify(existed_before: bool, exists_after: bool) -> Self {
        match (existed_before, exists_after) {
            (true, false) => Self::Deleted,
            (false, true) => Self::Created,
            _ => Self::Updated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Record Components
// ============================================================================

/// Repository coordinates split from a `<owner>/<name>` identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryDetails {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner: String,
}

impl RepositoryDetails {
    /// Create new repository details
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Check if neither owner nor name is set
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty() && self.name.is_empty()
    }

    /// Get `owner/name`, or an empty string when unset
    pub fn full_name(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("{}/{}", self.owner, self.name)
        }
    }
}

impl fmt::Display for RepositoryDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Commit reference as exposed to consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl CommitInfo {
    /// Commit reference carrying only a hash
    pub fn with_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty() && self.message.is_empty() && self.url.is_empty()
    }
}

/// User identity attached to an event.
///
/// Display name and avatar are part of the shared record shape but are never
/// populated from Bitbucket Cloud payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub login: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
}

impl UserInfo {
    /// User identity carrying only a login
    pub fn with_login(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.login.is_empty()
            && self.display_name.is_empty()
            && self.email.is_empty()
            && self.avatar_url.is_empty()
    }
}

// ============================================================================
// Canonical Event
// ============================================================================

/// Normalized event record produced from a single delivery.
///
/// For push events `pull_request_id` is `0` and the source-side fields are
/// empty. For pull-request events the commit, identity and compare fields are
/// empty and `branch_status` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    #[serde(
        rename = "target_repository_details",
        default,
        skip_serializing_if = "RepositoryDetails::is_empty"
    )]
    pub target_repository: RepositoryDetails,

    #[serde(rename = "branch", default, skip_serializing_if = "String::is_empty")]
    pub target_branch: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub pull_request_id: u64,

    #[serde(
        rename = "source_repository_details",
        default,
        skip_serializing_if = "RepositoryDetails::is_empty"
    )]
    pub source_repository: RepositoryDetails,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_branch: String,

    /// Unix seconds, UTC
    #[serde(default)]
    pub timestamp: i64,

    pub event: EventKind,

    #[serde(default, skip_serializing_if = "CommitInfo::is_empty")]
    pub commit: CommitInfo,

    #[serde(default, skip_serializing_if = "CommitInfo::is_empty")]
    pub before_commit: CommitInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_status: Option<BranchStatus>,

    #[serde(default, skip_serializing_if = "UserInfo::is_empty")]
    pub triggered_by: UserInfo,

    #[serde(default, skip_serializing_if = "UserInfo::is_empty")]
    pub committer: UserInfo,

    #[serde(default, skip_serializing_if = "UserInfo::is_empty")]
    pub author: UserInfo,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compare_url: String,
}

impl CanonicalEvent {
    /// Create an event of the given kind with every other field at its zero value
    pub fn new(event: EventKind) -> Self {
        Self {
            target_repository: RepositoryDetails::default(),
            target_branch: String::new(),
            pull_request_id: 0,
            source_repository: RepositoryDetails::default(),
            source_branch: String::new(),
            timestamp: 0,
            event,
            commit: CommitInfo::default(),
            before_commit: CommitInfo::default(),
            branch_status: None,
            triggered_by: UserInfo::default(),
            committer: UserInfo::default(),
            author: UserInfo::default(),
            compare_url: String::new(),
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.event.is_pull_request()
    }

    /// Get `owner/name` of the target repository
    pub fn repository_slug(&self) -> String {
        self.target_repository.full_name()
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
