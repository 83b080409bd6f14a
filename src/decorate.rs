use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use reqwest::Method;

use crate::request::{AttemptMeta, RequestDescriptor, ResponseKind};

/// Header carrying the correlation id on every attempt.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error returned by a [`SessionStore`] that cannot be read.
#[derive(Debug, thiserror::Error)]
#[error("session store unavailable: {0}")]
pub struct SessionError(pub String);

/// Source of the bearer token attached to outgoing requests.
///
/// Read once per attempt. An unreachable store results in an
/// unauthenticated request, never in a client-side failure.
pub trait SessionStore: Send + Sync {
    fn token(&self) -> Result<Option<String>, SessionError>;
}

/// Session store holding a fixed token, or none.
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SessionStore for StaticToken {
    fn token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.0.clone())
    }
}

impl<F> SessionStore for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Result<Option<String>, SessionError> {
        Ok(self())
    }
}

static NEXT_REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique token identifying one logical request in logs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mints a fresh id: a monotonic sequence number plus a random suffix.
    pub fn mint() -> Self {
        let seq = NEXT_REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{seq:08x}-{}", &random[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully-formed request for one attempt, ready for the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
    pub response_kind: ResponseKind,
    pub request_id: CorrelationId,
    pub attempt: AttemptMeta,
}

impl OutboundRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Attaches auth, correlation and timing data to a descriptor.
///
/// The same `request_id` must be passed for every attempt of one logical
/// request.
pub(crate) fn decorate(
    descriptor: &RequestDescriptor,
    attempt: AttemptMeta,
    request_id: &CorrelationId,
    session: &dyn SessionStore,
) -> OutboundRequest {
    let mut headers = descriptor.headers.clone();

    match session.token() {
        Ok(Some(token)) if !token.trim().is_empty() => {
            set_header(
                &mut headers,
                "authorization",
                normalize_bearer_authorization(&token),
            );
        }
        Ok(_) => {}
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(request_id = %request_id, "sending without auth header: {}", _err);
        }
    }

    set_header(&mut headers, REQUEST_ID_HEADER, request_id.to_string());

    OutboundRequest {
        method: descriptor.method.clone(),
        path: descriptor.path.clone(),
        query: descriptor.query.clone(),
        headers,
        body: descriptor.body.clone(),
        timeout: descriptor.timeout,
        response_kind: descriptor.response_kind,
        request_id: request_id.clone(),
        attempt,
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    headers.push((name.to_owned(), value));
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
