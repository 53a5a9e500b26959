//! Bitbucket Cloud webhook wire schema.
//!
//! These types mirror the subset of the Bitbucket Cloud event payloads that
//! normalization reads. Every field is optional: an absent key and an explicit
//! JSON `null` both decode to the field's zero value. Bitbucket relies on this,
//! sending `"new": null` when a branch is deleted and `"old": null` when one is
//! created.
//!
//! See <https://support.atlassian.com/bitbucket-cloud/docs/event-payloads/>.

use crate::webhook::WebhookError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

// ============================================================================
// Top-level Payload
// ============================================================================

/// Decoded webhook body shared by push and pull-request events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BitbucketWebhookPayload {
    #[serde(deserialize_with = "null_as_default")]
    pub push: Push,

    #[serde(rename = "pullrequest", deserialize_with = "null_as_default")]
    pub pull_request: PullRequest,

    #[serde(deserialize_with = "null_as_default")]
    pub repository: RepositoryRef,

    #[serde(deserialize_with = "null_as_default")]
    pub actor: Account,
}

/// `push` object of a `repo:push` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Push {
    /// Reference changes in delivery order
    #[serde(deserialize_with = "null_as_default")]
    pub changes: Vec<Change>,
}

/// A single reference change within a push
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Change {
    /// State after the push; empty when the branch was deleted
    #[serde(deserialize_with = "null_as_default")]
    pub new: BranchRef,

    /// State before the push; empty when the branch was created
    #[serde(deserialize_with = "null_as_default")]
    pub old: BranchRef,
}

impl Change {
    /// Name of the affected branch, falling back to the old side for deletions
    pub fn branch_name(&self) -> &str {
        if self.new.name.is_empty() {
            &self.old.name
        } else {
            &self.new.name
        }
    }
}

/// Branch reference on one side of a change
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BranchRef {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,

    /// Commit the reference points to
    pub target: Option<Commit>,
}

/// Commit object embedded in a branch reference
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Commit {
    #[serde(deserialize_with = "null_as_default")]
    pub hash: String,

    #[serde(deserialize_with = "null_as_default")]
    pub message: String,

    pub date: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "null_as_default")]
    pub author: CommitAuthor,

    #[serde(deserialize_with = "null_as_default")]
    pub links: CommitLinks,

    /// Parent commits, first parent first
    #[serde(deserialize_with = "null_as_default")]
    pub parents: Vec<CommitRef>,
}

impl Commit {
    /// Commit date as Unix seconds, `0` when the payload carries none
    pub fn timestamp(&self) -> i64 {
        epoch_seconds(self.date)
    }
}

/// Commit author as recorded in git, plus the Bitbucket account when mapped
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommitAuthor {
    /// Free-form `Name <email>` string from the commit
    #[serde(deserialize_with = "null_as_default")]
    pub raw: String,

    pub user: Option<Account>,
}

impl CommitAuthor {
    /// Resolved Bitbucket handle, if the git author maps to an account
    pub fn nickname(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|user| user.nickname.as_str())
            .filter(|nickname| !nickname.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommitLinks {
    #[serde(deserialize_with = "null_as_default")]
    pub html: Link,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Link {
    #[serde(deserialize_with = "null_as_default")]
    pub href: String,
    /// Older payloads carry the URL under `ref`
    #[serde(rename = "ref", deserialize_with = "null_as_default")]
    pub legacy_ref: String,
}

impl Link {
    /// The link target, preferring `href` when both keys are present
    pub fn url(&self) -> &str {
        if self.href.is_empty() {
            &self.legacy_ref
        } else {
            &self.href
        }
    }
}

/// Hash-only commit reference used for parents
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommitRef {
    #[serde(deserialize_with = "null_as_default")]
    pub hash: String,
}

// ============================================================================
// Pull Requests
// ============================================================================

/// `pullrequest` object of a `pullrequest:*` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,

    #[serde(deserialize_with = "null_as_default")]
    pub source: PullRequestEndpoint,

    #[serde(deserialize_with = "null_as_default")]
    pub destination: PullRequestEndpoint,

    pub updated_on: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Last update as Unix seconds, `0` when the payload carries none
    pub fn timestamp(&self) -> i64 {
        epoch_seconds(self.updated_on)
    }
}

/// Source or destination side of a pull request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PullRequestEndpoint {
    #[serde(deserialize_with = "null_as_default")]
    pub repository: RepositoryRef,

    #[serde(deserialize_with = "null_as_default")]
    pub branch: BranchName,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BranchName {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

// ============================================================================
// Shared
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RepositoryRef {
    /// Workspace and repository slugs joined with a `/`
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
}

/// Bitbucket account reference
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Account {
    #[serde(deserialize_with = "null_as_default")]
    pub nickname: String,
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a raw webhook body into the Bitbucket wire schema.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] if:
/// - the body is not valid JSON
/// - the top-level value is not a JSON object
/// - a known field has the wrong type (e.g. a non-numeric pull request id or
///   a timestamp that is not RFC 3339)
pub fn decode_payload(payload: &[u8]) -> Result<BitbucketWebhookPayload, WebhookError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::malformed(format!("payload is not valid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(WebhookError::malformed(
            "payload must be a JSON object at the top level",
        ));
    }

    serde_json::from_value(value).map_err(|e| {
        WebhookError::malformed(format!(
            "payload does not match the Bitbucket Cloud schema: {}",
            e
        ))
    })
}

fn epoch_seconds(date: Option<DateTime<Utc>>) -> i64 {
    date.map_or(0, |date| date.timestamp())
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(de).map(Option::unwrap_or_default)
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
