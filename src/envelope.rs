use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{request::ResponseKind, ApiError};

const SUCCESS_KEY: &str = "success";
const DATA_KEY: &str = "data";
const ERROR_KEY: &str = "error";
const MESSAGE_KEY: &str = "message";

/// Error details carried by a backend response body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub code: Option<String>,
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Extracts error details from a JSON body of any known shape.
    ///
    /// Message lookup order: `error.message`, `error` as a string, then the
    /// top-level `message`.
    pub fn from_json(body: &Value) -> Self {
        let Some(object) = body.as_object() else {
            return Self::default();
        };

        let mut parsed = match object.get(ERROR_KEY) {
            Some(Value::Object(error)) => Self {
                message: non_empty_str(error.get(MESSAGE_KEY)),
                code: error.get("code").and_then(scalar_to_string),
                details: error.get("details").filter(|v| !v.is_null()).cloned(),
            },
            Some(Value::String(message)) if !message.trim().is_empty() => Self {
                message: Some(message.clone()),
                ..Self::default()
            },
            _ => Self::default(),
        };

        if parsed.message.is_none() {
            parsed.message = non_empty_str(object.get(MESSAGE_KEY));
        }
        if parsed.code.is_none() {
            parsed.code = object.get("code").and_then(scalar_to_string);
        }
        parsed
    }
}

/// Recognized response body shapes, in detection priority order.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// Caller declared the body opaque; envelope logic is bypassed.
    Binary(Bytes),
    /// `{ success: true, data?: T, ... }`
    Success {
        data: Value,
        /// Envelope-level keys other than `success`, `data`, `error`.
        /// The normalizer decides which of them count as metadata.
        extra: Map<String, Value>,
    },
    /// `{ success: false, error?: {...} }`
    Failure(ErrorBody),
    /// Legacy body without a `success` discriminator.
    Flat(Value),
}

impl Envelope {
    /// Decides which shape a successful response body has.
    ///
    /// Fails with `MalformedResponse` when the body is not JSON or when the
    /// `success` discriminator is present but not a boolean.
    pub fn sniff(kind: ResponseKind, body: Bytes) -> Result<Self, ApiError> {
        if kind == ResponseKind::Binary {
            return Ok(Self::Binary(body));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::Flat(Value::Null));
        }

        let value = serde_json::from_slice::<Value>(&body)
            .map_err(|err| ApiError::malformed(format!("invalid response JSON: {err}")))?;

        let Value::Object(mut object) = value else {
            return Ok(Self::Flat(value));
        };

        let Some(success) = object.remove(SUCCESS_KEY) else {
            return Ok(Self::Flat(Value::Object(object)));
        };

        match success {
            Value::Bool(true) => {
                let data = object.remove(DATA_KEY).unwrap_or(Value::Null);
                object.remove(ERROR_KEY);
                Ok(Self::Success {
                    data,
                    extra: object,
                })
            }
            Value::Bool(false) => Ok(Self::Failure(ErrorBody::from_json(&Value::Object(
                object,
            )))),
            other => Err(ApiError::malformed(format!(
                "envelope discriminator 'success' must be a boolean, got {other}"
            ))),
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
