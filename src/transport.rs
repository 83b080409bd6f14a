use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::{decorate::OutboundRequest, ApiError, ClientOptions, ErrorKind};

/// Response obtained from the server, whatever its status.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// DNS, connect, reset or body read failure.
    Network,
    Timeout,
    /// The request could not be built (bad header value, bad URL).
    Build,
}

/// An attempt that produced no response.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} failure: {message}")]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_builder() {
            FailureKind::Build
        } else if err.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Network
        };
        Self::new(kind, err.to_string())
    }
}

/// Executes exactly one HTTP attempt. Implementations must not retry or
/// classify; both happen above this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure>;
}

/// `reqwest`-backed transport bound to one base URL.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpTransport {
    /// Builds the shared connection pool with JSON defaults and the
    /// configured headers.
    pub fn new(options: &ClientOptions) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &options.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| config_error(format!("invalid header name '{name}': {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| config_error(format!("invalid value for header {name}: {err}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(options.timeout_ms));
        if let Some(user_agent) = &options.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        let http = builder
            .build()
            .map_err(|err| config_error(format!("failed to initialize HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a request path against the base URL.
    ///
    /// Absolute URLs are accepted only when they share the base URL's origin,
    /// so session credentials never leave the configured backend.
    fn url_for(&self, path: &str) -> Result<String, TransportFailure> {
        if !(path.starts_with("http://") || path.starts_with("https://")) {
            return Ok(format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        }

        let target = reqwest::Url::parse(path).map_err(|err| {
            TransportFailure::new(FailureKind::Build, format!("invalid URL '{path}': {err}"))
        })?;
        let same_origin = reqwest::Url::parse(&self.base_url)
            .is_ok_and(|base| base.origin() == target.origin());
        if !same_origin {
            return Err(TransportFailure::new(
                FailureKind::Build,
                format!(
                    "refusing to send request to {} outside of {}",
                    target.origin().ascii_serialization(),
                    self.base_url
                ),
            ));
        }
        Ok(target.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url_for(&request.path)?)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn config_error(message: String) -> ApiError {
    ApiError::new(ErrorKind::Unknown, message)
}

#[cfg(test)]
mod tests {
    use super::{FailureKind, HttpTransport, RawResponse};
    use crate::{ClientOptions, ErrorKind};

    #[test]
    fn joins_paths_against_base_url() {
        let transport =
            HttpTransport::new(&ClientOptions::new("http://api.local/v1/")).expect("must build");
        assert_eq!(transport.base_url(), "http://api.local/v1");
        assert_eq!(
            transport.url_for("/certificates").expect("relative path"),
            "http://api.local/v1/certificates"
        );
        assert_eq!(
            transport.url_for("students?page=2").expect("relative path"),
            "http://api.local/v1/students?page=2"
        );
        assert_eq!(
            transport
                .url_for("http://api.local/v1/reports/export.csv")
                .expect("same origin"),
            "http://api.local/v1/reports/export.csv"
        );
    }

    #[test]
    fn refuses_absolute_urls_on_another_origin() {
        let transport =
            HttpTransport::new(&ClientOptions::new("http://api.local/v1")).expect("must build");
        for foreign in [
            "https://files.local/export.csv",
            "https://api.local/v1/certificates",
            "http://api.local:8080/v1/certificates",
            "http://api.local.evil.example/v1",
        ] {
            let failure = transport.url_for(foreign).expect_err("foreign origin");
            assert_eq!(failure.kind, FailureKind::Build, "{foreign}");
        }
    }

    #[test]
    fn rejects_invalid_default_header() {
        let options = ClientOptions::new("http://api.local").with_header("x-tenant", "bad\nvalue");
        let err = HttpTransport::new(&options).expect_err("must reject header");
        assert_eq!(err.kind, ErrorKind::Unknown);
    }

    #[test]
    fn success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(304, "").is_success());
        assert!(!RawResponse::new(404, "").is_success());
    }
}
