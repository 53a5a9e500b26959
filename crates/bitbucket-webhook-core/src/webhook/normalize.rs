//! Normalizers from the Bitbucket wire schema to [`CanonicalEvent`].

use crate::{
    event::{CanonicalEvent, CommitInfo, EventKind, UserInfo},
    webhook::{
        fields::{
            branch_status, compare_url, extract_email, parent_of, parse_repo_full_name,
            resolve_login,
        },
        payload::{BitbucketWebhookPayload, Commit, PullRequest},
        WebhookError,
    },
};
use tracing::warn;

/// Normalize a `repo:push` delivery.
///
/// Only the first change is reported; Bitbucket batches several reference
/// updates into one delivery when they are pushed together.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] if the push carries no changes
/// or the repository full name is not `<workspace>/<repo_slug>`.
pub fn normalize_push(payload: &BitbucketWebhookPayload) -> Result<CanonicalEvent, WebhookError> {
    let changes = &payload.push.changes;
    let first_change = changes
        .first()
        .ok_or_else(|| WebhookError::malformed("push event contains no changes"))?;

    if changes.len() > 1 {
        warn!(
            change_count = changes.len(),
            branch = %first_change.branch_name(),
            "Push delivery carries multiple changes; only the first is reported"
        );
    }

    let target_repository = parse_repo_full_name(&payload.repository.full_name)?;

    // A deleted branch has no head commit
    let no_commit = Commit::default();
    let head = first_change.new.target.as_ref().unwrap_or(&no_commit);
    let prior_hash = parent_of(head);

    let actor = payload.actor.nickname.as_str();
    let login = resolve_login(head.author.nickname(), actor);

    Ok(CanonicalEvent {
        compare_url: compare_url(&target_repository, &head.hash, prior_hash),
        target_repository,
        target_branch: first_change.branch_name().to_string(),
        timestamp: head.timestamp(),
        commit: CommitInfo {
            hash: head.hash.clone(),
            message: head.message.clone(),
            url: head.links.html.url().to_string(),
        },
        before_commit: CommitInfo::with_hash(prior_hash),
        branch_status: Some(branch_status(
            &first_change.old.name,
            &first_change.new.name,
        )),
        triggered_by: UserInfo::with_login(actor),
        committer: UserInfo::with_login(login),
        author: UserInfo {
            login: login.to_string(),
            email: extract_email(&head.author.raw),
            ..UserInfo::default()
        },
        ..CanonicalEvent::new(EventKind::Push)
    })
}

/// Normalize a `pullrequest:*` delivery into an event of the given kind.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] if either repository full name
/// is not `<workspace>/<repo_slug>`.
pub fn normalize_pull_request(
    pull_request: &PullRequest,
    kind: EventKind,
) -> Result<CanonicalEvent, WebhookError> {
    Ok(CanonicalEvent {
        pull_request_id: pull_request.id,
        target_repository: parse_repo_full_name(&pull_request.destination.repository.full_name)?,
        target_branch: pull_request.destination.branch.name.clone(),
        source_repository: parse_repo_full_name(&pull_request.source.repository.full_name)?,
        source_branch: pull_request.source.branch.name.clone(),
        timestamp: pull_request.timestamp(),
        ..CanonicalEvent::new(kind)
    })
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
