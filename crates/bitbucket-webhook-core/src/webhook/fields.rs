//! Derived canonical fields.
//!
//! Small pure functions that compute values the Bitbucket payload does not
//! carry directly. None of them depend on request or decoding state.

use crate::{
    event::{BranchStatus, RepositoryDetails},
    webhook::{payload::Commit, WebhookError},
};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Split a `<workspace>/<repo_slug>` identifier into owner and name.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] unless the identifier contains
/// exactly one `/` with non-empty text on both sides.
pub fn parse_repo_full_name(full_name: &str) -> Result<RepositoryDetails, WebhookError> {
    let mut parts = full_name.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Ok(RepositoryDetails::new(owner, name))
        }
        _ => Err(WebhookError::malformed(format!(
            "repository full name '{}' must have the form '<workspace>/<repo_slug>'",
            full_name
        ))),
    }
}

/// Pick the commit author's Bitbucket handle, falling back to the actor.
pub fn resolve_login<'a>(author_nickname: Option<&'a str>, actor_nickname: &'a str) -> &'a str {
    author_nickname
        .filter(|nickname| !nickname.is_empty())
        .unwrap_or(actor_nickname)
}

/// Extract the address from a `Name <email>` author string.
///
/// Accepts the single-mailbox forms a mail header would: `Name <addr>`,
/// `"Quoted Name" <addr>`, `<addr>` and a bare `addr`, each optionally
/// followed by a `(comment)`. Addresses may contain non-ASCII characters.
/// Anything else is returned unchanged.
pub fn extract_email(raw: &str) -> String {
    let pattern = match mailbox_pattern() {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(error = %e, "Mailbox pattern failed to compile; keeping raw author string");
            return raw.to_string();
        }
    };

    pattern
        .captures(raw)
        .and_then(|captures| captures.name("angle").or_else(|| captures.name("bare")))
        .map_or_else(|| raw.to_string(), |address| address.as_str().to_string())
}

/// Classify a branch change from the names on each side of it.
pub fn branch_status(old_name: &str, new_name: &str) -> BranchStatus {
    BranchStatus::classify(!old_name.is_empty(), !new_name.is_empty())
}

/// Build the Bitbucket branch comparison link between two commits.
///
/// Empty unless both hashes are known.
pub fn compare_url(repository: &RepositoryDetails, head_hash: &str, prior_hash: &str) -> String {
    if head_hash.is_empty() || prior_hash.is_empty() {
        return String::new();
    }

    format!(
        "https://bitbucket.org/{}/{}/branches/compare/{}..{}#diff",
        repository.owner, repository.name, head_hash, prior_hash
    )
}

/// Hash of the commit's first parent, or empty for a root commit.
pub fn parent_of(commit: &Commit) -> &str {
    commit
        .parents
        .first()
        .map_or("", |parent| parent.hash.as_str())
}

fn mailbox_pattern() -> Result<&'static Regex, &'static regex::Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

    PATTERN
        .get_or_init(|| {
            // Any printable or multibyte character except the address specials
            let atom = r#"[^\s()<>\[\]:;@\\,".\x00-\x1f\x7f]+"#;
            let dot_atom = format!(r"{atom}(?:\.{atom})*");
            let quoted = r#""(?:[^"\\\r\n]|\\.)*""#;
            let domain_literal = r"\[[^\[\]\\\s]*\]";
            let addr_spec = format!(r"(?:{dot_atom}|{quoted})@(?:{dot_atom}|{domain_literal})");
            let display_name = format!(r#"(?:{quoted}|[^<>"]*)"#);
            let comment = r"\([^()]*\)";

            let pattern = format!(
                r"^\s*(?:{display_name}\s*<\s*(?P<angle>{addr_spec})\s*>|(?P<bare>{addr_spec}))\s*(?:{comment}\s*)?$"
            );
            Regex::new(&pattern)
        })
        .as_ref()
}

#[cfg(test)]
#[path = "fields_tests.rs"]
mod tests;
