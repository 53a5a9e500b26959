//! # Bitbucket Webhook Core
//!
//! Validation and normalization pipeline for Bitbucket Cloud webhook deliveries.
//!
//! A delivery is authenticated against a shared token carried in the request's
//! query string, its JSON body is decoded into the Bitbucket wire schema, and the
//! `X-Event-Key` header selects a normalizer that produces a provider-agnostic
//! [`CanonicalEvent`].
//!
//! ## Architecture
//!
//! - [`event`] holds the canonical output record
//! - [`webhook`] holds the request type, the [`WebhookParser`] trait and the
//!   Bitbucket Cloud implementation
//! - [`webhook::payload`] mirrors the provider's wire schema
//! - [`webhook::fields`] derives values that are not present in the payload
//!   (branch status, compare link, author email)
//!
//! ## Usage
//!
//! ```rust
//! use bitbucket_webhook_core::{
//!     BitbucketCloudWebhook, EventKind, WebhookParser, WebhookRequest, WebhookSecret,
//! };
//! use std::collections::HashMap;
//!
//! let body = br#"{
//!     "pullrequest": {
//!         "id": 42,
//!         "source": { "repository": { "full_name": "org/repo-fork" }, "branch": { "name": "feature" } },
//!         "destination": { "repository": { "full_name": "org/repo" }, "branch": { "name": "main" } },
//!         "updated_on": "2024-03-01T10:00:00+00:00"
//!     }
//! }"#;
//!
//! let headers = HashMap::from([("X-Event-Key".to_string(), "pullrequest:created".to_string())]);
//! let request = WebhookRequest::new(headers, Vec::new(), &body[..]);
//!
//! let event = BitbucketCloudWebhook::new()
//!     .parse(request, &WebhookSecret::empty())
//!     .unwrap()
//!     .expect("pull request events are recognized");
//!
//! assert_eq!(event.event, EventKind::PrOpened);
//! assert_eq!(event.pull_request_id, 42);
//! assert_eq!(event.target_branch, "main");
//! ```

use serde::{Deserialize, Serialize};

/// Standard result type for webhook operations
pub type WebhookResult<T> = Result<T, WebhookError>;

/// High-level error categorization for caller retry and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures where a redelivery may succeed
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Security-related failures requiring immediate attention
    Security,
}

// ============================================================================
// Module declarations
// ============================================================================

/// Canonical event record produced by normalization
pub mod event;

/// Webhook authentication, decoding and dispatch
pub mod webhook;

// Re-export key types for convenience
pub use event::{BranchStatus, CanonicalEvent, CommitInfo, EventKind, RepositoryDetails, UserInfo};
pub use webhook::{
    BitbucketCloudWebhook, EventKey, WebhookError, WebhookParser, WebhookRequest, WebhookSecret,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
