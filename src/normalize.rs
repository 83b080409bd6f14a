use serde_json::{Map, Value};

use crate::{
    classify::classify_application,
    envelope::Envelope,
    types::{Payload, ResponseMeta},
    ApiError, ApiResponse,
};

/// Generic collection key used when no resource-specific key matches.
pub const GENERIC_COLLECTION_KEY: &str = "items";

/// Response status fields some endpoints add next to the payload. They
/// describe the call, not the data, so they never reach `meta`.
const STATUS_KEYS: [&str; 4] = ["message", "timestamp", "statusCode", "status"];

/// Converts a sniffed success-status body into the canonical response.
///
/// `resource_key` is the plural key of the requested resource (for example
/// `certificates`). When present as an array it wins over `items`.
pub(crate) fn normalize(
    envelope: Envelope,
    resource_key: Option<&str>,
    status: u16,
) -> Result<ApiResponse<Payload>, ApiError> {
    match envelope {
        Envelope::Binary(bytes) => Ok(ApiResponse {
            data: Payload::Binary(bytes),
            meta: None,
        }),
        Envelope::Success { data, extra } => {
            let (payload, siblings) = unwrap_collection(data, resource_key);
            let mut meta = extra;
            meta.extend(siblings);
            Ok(ApiResponse {
                data: Payload::Json(payload),
                meta: into_meta(meta),
            })
        }
        Envelope::Failure(body) => Err(classify_application(body, status)),
        Envelope::Flat(body) => {
            let (payload, siblings) = unwrap_collection(body, resource_key);
            Ok(ApiResponse {
                data: Payload::Json(payload),
                meta: into_meta(siblings),
            })
        }
    }
}

/// Pulls a nested collection out of an object payload.
///
/// Only array values are unwrapped; the remaining fields of the object are
/// returned as metadata.
fn unwrap_collection(value: Value, resource_key: Option<&str>) -> (Value, Map<String, Value>) {
    let Value::Object(mut object) = value else {
        return (value, Map::new());
    };

    let candidates = resource_key
        .into_iter()
        .chain(std::iter::once(GENERIC_COLLECTION_KEY));
    for key in candidates {
        if object.get(key).is_some_and(Value::is_array) {
            if let Some(collection) = object.remove(key) {
                return (collection, object);
            }
        }
    }

    (Value::Object(object), Map::new())
}

fn into_meta(mut meta: ResponseMeta) -> Option<ResponseMeta> {
    meta.retain(|key, _| !STATUS_KEYS.contains(&key.as_str()));
    (!meta.is_empty()).then_some(meta)
}

/// Derives the resource key from a request path: the last non-empty
/// segment with any query string removed.
///
/// `/certificates?organizationId=org-1` yields `certificates`.
pub(crate) fn infer_resource_key(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').find(|segment| !segment.is_empty())
}
