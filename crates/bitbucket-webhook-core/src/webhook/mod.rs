//! # Webhook Processing Module
//!
//! Authenticates, decodes and dispatches Bitbucket Cloud webhook deliveries.
//!
//! Processing is a three-step pipeline:
//!
//! 1. [`validate_payload`] checks the shared token from the request query
//!    string and reads the body
//! 2. [`payload::decode_payload`] turns the body into the wire schema
//! 3. [`EventKey`] selects the push or pull-request normalizer
//!
//! Event kinds outside the supported set are not errors; they produce no
//! event at all.

use crate::{
    event::{CanonicalEvent, EventKind},
    WebhookResult,
};
use bytes::Bytes;
use std::{collections::HashMap, convert::Infallible, fmt, io::Read, str::FromStr};
use tracing::{debug, info, instrument, warn};
use url::Url;
use zeroize::Zeroizing;

pub mod fields;
pub mod normalize;
pub mod payload;

use normalize::{normalize_pull_request, normalize_push};
use payload::decode_payload;

/// Header carrying the Bitbucket event kind
pub const EVENT_HEADER_KEY: &str = "X-Event-Key";

/// Query parameter carrying the shared token
pub const TOKEN_QUERY_PARAM: &str = "token";

// ============================================================================
// Request
// ============================================================================

/// Incoming webhook delivery: headers, query parameters and the unread body.
///
/// Header names are matched case-insensitively. Query parameters keep their
/// delivery order.
pub struct WebhookRequest<B> {
    headers: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: B,
}

impl<B: Read> WebhookRequest<B> {
    /// Create a request from already-split parts
    pub fn new(headers: HashMap<String, String>, query: Vec<(String, String)>, body: B) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        Self {
            headers,
            query,
            body,
        }
    }

    /// Create a request from the full delivery URL.
    ///
    /// Query parameters are percent-decoded following the URL standard.
    pub fn from_url(url: &Url, headers: HashMap<String, String>, body: B) -> Self {
        let query = url.query_pairs().into_owned().collect();
        Self::new(headers, query, body)
    }

    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Value of the `X-Event-Key` header, if present
    pub fn event_key(&self) -> Option<&str> {
        self.header(EVENT_HEADER_KEY)
    }

    /// First value of a query parameter, if present
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Give up the request and return the unread body
    pub fn into_body(self) -> B {
        self.body
    }
}

impl<B> fmt::Debug for WebhookRequest<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Query values may carry the shared token
        let query_keys: Vec<&str> = self.query.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("WebhookRequest")
            .field("headers", &self.headers)
            .field("query_keys", &query_keys)
            .field("body", &"<unread>")
            .finish()
    }
}

// ============================================================================
// Shared Secret
// ============================================================================

/// Shared token expected on every delivery.
///
/// An empty secret means no authentication is required. The bytes are wiped
/// when the value is dropped.
#[derive(Clone, Default)]
pub struct WebhookSecret(Zeroizing<Vec<u8>>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Secret that disables authentication
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw secret bytes. Never log these.
    pub fn expose_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Compare against a presented token in constant time
    pub fn matches(&self, presented: &[u8]) -> bool {
        use subtle::ConstantTimeEq;

        // Length is not secret
        if self.0.len() != presented.len() {
            return false;
        }

        self.0.as_slice().ct_eq(presented).into()
    }
}

impl From<&str> for WebhookSecret {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes())
    }
}

impl From<String> for WebhookSecret {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

impl<'de> serde::Deserialize<'de> for WebhookSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from)
    }
}

// Security: Don't expose secrets in debug output
impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WebhookSecret").field(&"<REDACTED>").finish()
    }
}

// ============================================================================
// Event Key
// ============================================================================

/// Value of the `X-Event-Key` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    RepoPush,
    PullRequestCreated,
    PullRequestUpdated,
    PullRequestFulfilled,
    PullRequestRejected,
    /// Any other value, including an absent header
    Unrecognized(String),
}

impl EventKey {
    /// Parse an optional header value. An absent header is unrecognized.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(value) => Self::from_str(value).unwrap_or_else(|never| match never {}),
            None => Self::Unrecognized(String::new()),
        }
    }

    /// Header value as sent by Bitbucket
    pub fn as_str(&self) -> &str {
        match self {
            Self::RepoPush => "repo:push",
            Self::PullRequestCreated => "pullrequest:created",
            Self::PullRequestUpdated => "pullrequest:updated",
            Self::PullRequestFulfilled => "pullrequest:fulfilled",
            Self::PullRequestRejected => "pullrequest:rejected",
            Self::Unrecognized(value) => value,
        }
    }

    /// Canonical kind this key normalizes to, `None` when unsupported
    pub fn canonical_kind(&self) -> Option<EventKind> {
        match self {
            Self::RepoPush => Some(EventKind::Push),
            Self::PullRequestCreated => Some(EventKind::PrOpened),
            Self::PullRequestUpdated => Some(EventKind::PrEdited),
            Self::PullRequestFulfilled => Some(EventKind::PrMerged),
            Self::PullRequestRejected => Some(EventKind::PrRejected),
            Self::Unrecognized(_) => None,
        }
    }
}

impl FromStr for EventKey {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "repo:push" => Self::RepoPush,
            "pullrequest:created" => Self::PullRequestCreated,
            "pullrequest:updated" => Self::PullRequestUpdated,
            "pullrequest:fulfilled" => Self::PullRequestFulfilled,
            "pullrequest:rejected" => Self::PullRequestRejected,
            other => Self::Unrecognized(other.to_string()),
        })
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for webhook processing failures
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook token mismatch")]
    AuthenticationFailed,

    #[error("Failed to read webhook body: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },
}

impl WebhookError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Check if a redelivery could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::AuthenticationFailed => false,
            Self::MalformedPayload { .. } => false,
        }
    }

    /// Get error category for monitoring
    pub fn error_category(&self) -> crate::ErrorCategory {
        match self {
            Self::AuthenticationFailed => crate::ErrorCategory::Security,
            Self::Io(_) => crate::ErrorCategory::Transient,
            Self::MalformedPayload { .. } => crate::ErrorCategory::Permanent,
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Check the delivery token and read the full body.
///
/// The token is compared when a secret is expected or when the request
/// presents one anyway. On a mismatch the body is left unread.
///
/// # Errors
///
/// - [`WebhookError::AuthenticationFailed`] if the tokens differ, or a secret
///   is expected and the request carries none
/// - [`WebhookError::Io`] if the body cannot be read
pub fn validate_payload<B: Read>(
    request: WebhookRequest<B>,
    expected: &WebhookSecret,
) -> Result<Bytes, WebhookError> {
    let presented = request.query_param(TOKEN_QUERY_PARAM);

    if !expected.is_empty() || presented.is_some() {
        let matched = presented.is_some_and(|token| expected.matches(token.as_bytes()));
        if !matched {
            warn!(
                token_present = presented.is_some(),
                secret_configured = !expected.is_empty(),
                "Webhook token validation failed"
            );
            return Err(WebhookError::AuthenticationFailed);
        }
        debug!("Webhook token validated");
    } else {
        debug!("Token validation skipped - no secret configured");
    }

    let mut body = Vec::new();
    request.into_body().read_to_end(&mut body)?;

    Ok(Bytes::from(body))
}

// ============================================================================
// Parser
// ============================================================================

/// Provider-specific webhook parser.
pub trait WebhookParser: Send + Sync {
    /// Authenticate the request and read its body
    fn validate_payload<B: Read>(
        &self,
        request: WebhookRequest<B>,
        expected: &WebhookSecret,
    ) -> Result<Bytes, WebhookError>
    where
        Self: Sized,
    {
        validate_payload(request, expected)
    }

    /// Decode an already-read body and normalize it according to the event key.
    ///
    /// Returns `Ok(None)` for event kinds the provider does not normalize.
    fn parse_incoming_webhook(
        &self,
        event_key: &str,
        payload: &[u8],
    ) -> WebhookResult<Option<CanonicalEvent>>;

    /// Full pipeline: authenticate, read, decode and normalize.
    fn parse<B: Read>(
        &self,
        request: WebhookRequest<B>,
        expected: &WebhookSecret,
    ) -> WebhookResult<Option<CanonicalEvent>>
    where
        Self: Sized,
    {
        let event_key = request.event_key().unwrap_or_default().to_string();
        let body = self.validate_payload(request, expected)?;
        self.parse_incoming_webhook(&event_key, &body)
    }
}

/// Parser for Bitbucket Cloud deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitbucketCloudWebhook;

impl BitbucketCloudWebhook {
    /// Provider identifier used in logs
    pub const PROVIDER_ID: &'static str = "bitbucket-cloud";

    pub fn new() -> Self {
        Self
    }
}

impl WebhookParser for BitbucketCloudWebhook {
    #[instrument(
        skip(self, payload),
        fields(provider = Self::PROVIDER_ID, payload_size = payload.len())
    )]
    fn parse_incoming_webhook(
        &self,
        event_key: &str,
        payload: &[u8],
    ) -> WebhookResult<Option<CanonicalEvent>> {
        let decoded = decode_payload(payload)?;

        let key = EventKey::from_header(Some(event_key));
        let event = match key.canonical_kind() {
            Some(EventKind::Push) => normalize_push(&decoded)?,
            Some(kind) => normalize_pull_request(&decoded.pull_request, kind)?,
            None => {
                debug!(event_key = %key, "Ignoring unsupported event kind");
                return Ok(None);
            }
        };

        info!(
            event = %event.event,
            repository = %event.target_repository,
            branch = %event.target_branch,
            pull_request_id = event.pull_request_id,
            "Normalized webhook event"
        );

        Ok(Some(event))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
