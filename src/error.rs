use serde::Serialize;

/// Closed set of failure categories every logical request resolves into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response was obtained (DNS, connect, reset, body read).
    Network,
    /// The attempt timed out locally or the server answered `408`.
    Timeout,
    /// `4xx` other than `408`/`429`.
    ClientError,
    /// `429 Too Many Requests`.
    RateLimited,
    /// `5xx`.
    ServerError,
    /// The caller cancelled the logical request.
    Cancelled,
    /// Success status, but the body could not be understood.
    MalformedResponse,
    /// Enveloped `success: false` body.
    ApplicationError,
    Unknown,
}

/// Error type returned by this crate.
///
/// Every failure path produces exactly one `ApiError`; raw transport errors
/// never escape the client.
#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// Human-readable message suitable for display.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Backend-specific error code, e.g. `"VALIDATION"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            code: None,
            details: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request was cancelled")
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    pub fn with_details(mut self, details: Option<serde_json::Value>) -> Self {
        self.details = details;
        self
    }

    /// Whether the retry engine may issue another attempt after this error.
    ///
    /// `ServerError` is only retryable for `500`, `502`, `503` and `504`.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimited => true,
            ErrorKind::ServerError => {
                matches!(self.http_status, Some(500 | 502 | 503 | 504))
            }
            _ => false,
        }
    }

    /// True for failures caused by the request itself rather than the
    /// network or the server.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ClientError | ErrorKind::ApplicationError
        )
    }
}
