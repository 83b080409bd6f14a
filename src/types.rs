use bytes::Bytes;
use serde::Serialize;

/// Pagination and other metadata that travelled next to the payload.
pub type ResponseMeta = serde_json::Map<String, serde_json::Value>;

/// Normalized success value returned to every caller.
///
/// The same logical operation yields the same `ApiResponse` no matter which
/// envelope shape the backend answered with.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl<T> ApiResponse<T> {
    pub fn into_data(self) -> T {
        self.data
    }

    /// Reads a numeric metadata field such as `total` or `page`.
    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.as_ref()?.get(key)?.as_u64()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: f(self.data),
            meta: self.meta,
        }
    }
}

/// Untyped payload produced by the normalizer.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    /// Opaque body passed through untouched (file export, download).
    Binary(Bytes),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Binary(_) => None,
        }
    }
}
