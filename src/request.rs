use std::time::Duration;

use reqwest::Method;
use tokio::time::Instant;

use crate::{ClientOptions, RequestOptions};

/// How the caller expects the response body to be treated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResponseKind {
    #[default]
    Json,
    Binary,
}

/// One caller-initiated operation. Shared by reference across attempts and
/// never mutated once built.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the configured base URL; may carry a query string.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub response_kind: ResponseKind,
    pub resource_key: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: Duration::from_millis(ClientOptions::default().timeout_ms),
            response_kind: ResponseKind::Json,
            resource_key: None,
        }
    }

    /// Builds a descriptor from per-call options layered over client defaults.
    pub(crate) fn from_options(
        method: Method,
        path: &str,
        options: &RequestOptions,
        defaults: &ClientOptions,
    ) -> Self {
        let timeout_ms = options.timeout_ms.unwrap_or(defaults.timeout_ms);
        Self {
            method,
            path: path.to_owned(),
            query: options.query.clone(),
            body: options.body.clone(),
            headers: options.headers.clone(),
            timeout: Duration::from_millis(timeout_ms),
            response_kind: if options.response_is_binary {
                ResponseKind::Binary
            } else {
                ResponseKind::Json
            },
            resource_key: options.resource_key.clone(),
        }
    }
}

/// Bookkeeping for a single attempt inside the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptMeta {
    /// 0-based attempt index.
    pub index: u32,
    pub issued_at: Instant,
    /// Backoff waited before this attempt was issued.
    pub delay: Duration,
}

impl AttemptMeta {
    pub fn first() -> Self {
        Self {
            index: 0,
            issued_at: Instant::now(),
            delay: Duration::ZERO,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.issued_at.elapsed()
    }
}
