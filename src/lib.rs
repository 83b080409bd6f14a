//! `certdash-http` is the resilient API client core of the certificate
//! dashboard.
//!
//! Every data-fetching call goes through [`ApiClient::request`], which:
//! - attaches the bearer token and an `x-request-id` correlation header
//! - retries network failures, `408`, `429` and `500/502/503/504` with
//!   exponential backoff
//! - normalizes the backend's flat and `{ success, data }` envelopes into one
//!   [`ApiResponse`]
//! - maps every failure to exactly one classified [`ApiError`]

mod classify;
mod client;
mod decorate;
mod envelope;
mod error;
mod normalize;
mod notify;
mod options;
mod request;
mod retry;
mod transport;
mod types;

pub use classify::{default_message, GENERIC_ERROR_MESSAGE};
pub use client::ApiClient;
pub use decorate::{
    CorrelationId, OutboundRequest, SessionError, SessionStore, StaticToken, REQUEST_ID_HEADER,
};
pub use error::{ApiError, ErrorKind};
pub use normalize::GENERIC_COLLECTION_KEY;
pub use notify::Notifier;
pub use options::{ClientOptions, RequestOptions, RetryOverride, DEFAULT_BASE_URL};
pub use request::{AttemptMeta, RequestDescriptor, ResponseKind};
pub use retry::{run_with_retry, RetryPolicy};
pub use transport::{FailureKind, HttpTransport, RawResponse, Transport, TransportFailure};
pub use types::{ApiResponse, Payload, ResponseMeta};

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ApiError>;
