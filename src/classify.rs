use serde_json::Value;

use crate::{
    envelope::ErrorBody,
    transport::{FailureKind, TransportFailure},
    ApiError, ErrorKind,
};

pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";
pub const NETWORK_ERROR_MESSAGE: &str = "Unable to reach the server. Check your connection.";
pub const TIMEOUT_ERROR_MESSAGE: &str = "The request timed out. Please try again.";

/// Default user-facing message for an HTTP status code.
pub fn default_message(status: u16) -> Option<&'static str> {
    let message = match status {
        400 => "The request was invalid.",
        401 => "Your session has expired. Please sign in again.",
        403 => "You do not have permission to perform this action.",
        404 => "The requested resource was not found.",
        408 => TIMEOUT_ERROR_MESSAGE,
        409 => "The resource was modified by someone else.",
        413 => "The uploaded file is too large.",
        422 => "Some fields are invalid.",
        429 => "Too many requests. Please slow down.",
        500 => "The server encountered an error.",
        502 => "The server is temporarily unreachable.",
        503 => "The service is temporarily unavailable.",
        504 => "The server took too long to respond.",
        _ => return None,
    };
    Some(message)
}

/// Classifies a response whose status is outside the success range.
///
/// Retryable statuses keep their status-derived kind even when the body is a
/// `success: false` envelope; other `4xx` envelopes become `ApplicationError`.
pub fn classify_status(status: u16, body: &[u8]) -> ApiError {
    let json = serde_json::from_slice::<Value>(body).ok();
    let error_body = json.as_ref().map(ErrorBody::from_json).unwrap_or_default();
    let is_failure_envelope = json
        .as_ref()
        .and_then(|value| value.get("success"))
        .is_some_and(|success| success.as_bool() == Some(false));

    let kind = match status {
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        400..=499 if is_failure_envelope => ErrorKind::ApplicationError,
        400..=499 => ErrorKind::ClientError,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    };

    build(kind, error_body, status)
}

/// Classifies an enveloped `success: false` body.
pub fn classify_application(body: ErrorBody, status: u16) -> ApiError {
    build(ErrorKind::ApplicationError, body, status)
}

/// Classifies an attempt that never produced a response.
pub fn classify_failure(failure: &TransportFailure) -> ApiError {
    match failure.kind {
        FailureKind::Timeout => ApiError::new(ErrorKind::Timeout, TIMEOUT_ERROR_MESSAGE),
        FailureKind::Network => ApiError::new(ErrorKind::Network, NETWORK_ERROR_MESSAGE),
        FailureKind::Build => ApiError::new(ErrorKind::Unknown, GENERIC_ERROR_MESSAGE)
            .with_details(Some(Value::String(failure.message.clone()))),
    }
}

fn build(kind: ErrorKind, body: ErrorBody, status: u16) -> ApiError {
    let message = body
        .message
        .or_else(|| default_message(status).map(str::to_owned))
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_owned());

    ApiError::new(kind, message)
        .with_status(status)
        .with_code(body.code)
        .with_details(body.details)
}
