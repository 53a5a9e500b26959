//! Common test utilities for Bitbucket webhook integration tests
//!
//! This module provides:
//! - Fixture loading from `tests/fixtures`
//! - Request builders mirroring what an HTTP front end hands to the parser

use bitbucket_webhook_core::{
    webhook::{EVENT_HEADER_KEY, TOKEN_QUERY_PARAM},
    WebhookRequest,
};
use std::{collections::HashMap, io::Cursor, path::PathBuf};
use url::Url;

/// Read a payload fixture by file name
pub fn load_fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("cannot read fixture {}: {}", path.display(), e))
}

/// Build a delivery carrying the given event key and body
pub fn delivery(event_key: &str, body: Vec<u8>) -> WebhookRequest<Cursor<Vec<u8>>> {
    WebhookRequest::new(event_headers(event_key), Vec::new(), Cursor::new(body))
}

/// Build a delivery that presents `token` in its query string
#[allow(dead_code)]
pub fn delivery_with_token(
    event_key: &str,
    token: &str,
    body: Vec<u8>,
) -> WebhookRequest<Cursor<Vec<u8>>> {
    let mut url = Url::parse("https://hooks.example.com/bitbucket").unwrap();
    url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
    WebhookRequest::from_url(&url, event_headers(event_key), Cursor::new(body))
}

fn event_headers(event_key: &str) -> HashMap<String, String> {
    HashMap::from([
        (EVENT_HEADER_KEY.to_string(), event_key.to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), "Bitbucket-Webhooks/2.0".to_string()),
    ])
}
