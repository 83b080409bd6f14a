use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;

use crate::{
    classify::{classify_failure, classify_status},
    decorate::{decorate, CorrelationId, OutboundRequest, SessionStore, StaticToken},
    envelope::Envelope,
    normalize::{infer_resource_key, normalize},
    request::RequestDescriptor,
    retry::{run_with_retry, RetryPolicy},
    transport::{HttpTransport, Transport},
    ApiError, ApiResponse, ClientOptions, ErrorKind, Notifier, Payload, RequestOptions, Result,
};

#[derive(Clone)]
/// API client shared by every feature-level caller.
///
/// Each call runs the staged pipeline decorate → transport → normalize or
/// classify, inside the retry loop. Cloning is cheap; clones share the
/// connection pool.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
    notifier: Option<Arc<dyn Notifier>>,
    options: ClientOptions,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("session", &"<redacted>")
            .field("notifier", &self.notifier.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client backed by [`HttpTransport`].
    pub fn new(options: ClientOptions) -> Result<Self> {
        let transport = HttpTransport::new(&options)?;
        Ok(Self::with_transport(options, transport))
    }

    /// Creates a client from `CERTDASH_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        let options = ClientOptions::from_env()?;
        Self::new(options).map_err(|err| err.message)
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(options: ClientOptions, transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            session: Arc::new(StaticToken::anonymous()),
            notifier: None,
            options,
        }
    }

    pub fn with_session_store(mut self, session: impl SessionStore + 'static) -> Self {
        self.session = Arc::new(session);
        self
    }

    /// Shortcut for a fixed bearer token. The `Bearer ` prefix is optional.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.with_session_store(StaticToken::new(token))
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a request and decodes the normalized payload into `T`.
    ///
    /// A payload that does not deserialize into `T` is reported as
    /// [`ErrorKind::MalformedResponse`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        let result = self
            .execute(method, path, &options)
            .await
            .and_then(decode_payload);
        self.report(result, &options)
    }

    /// Sends a request and returns the untyped normalized payload.
    pub async fn request_payload(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<Payload>> {
        let result = self.execute(method, path, &options).await;
        self.report(result, &options)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.send_with_body(Method::POST, path, body, options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.send_with_body(Method::PUT, path, body, options).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.send_with_body(Method::PATCH, path, body, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::DELETE, path, options).await
    }

    /// Fetches an opaque body (file export, certificate PDF) untouched.
    pub async fn download(&self, path: &str, options: RequestOptions) -> Result<Bytes> {
        let response = self
            .request_payload(Method::GET, path, options.binary())
            .await?;
        match response.data {
            Payload::Binary(bytes) => Ok(bytes),
            Payload::Json(_) => Err(ApiError::malformed("expected a binary response body")),
        }
    }

    async fn send_with_body<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        match serde_json::to_value(body) {
            Ok(body) => self.request(method, path, options.with_body(body)).await,
            Err(err) => {
                let err = ApiError::new(
                    ErrorKind::Unknown,
                    format!("failed to serialize request body: {err}"),
                );
                self.report(Err(err), &options)
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<ApiResponse<Payload>> {
        let descriptor = RequestDescriptor::from_options(method, path, options, &self.options);
        let policy = RetryPolicy::new(
            options.retry.resolve(self.options.max_retries),
            Duration::from_millis(
                options
                    .retry_delay_ms
                    .unwrap_or(self.options.retry_delay_ms),
            ),
        );
        let resource_key = descriptor
            .resource_key
            .as_deref()
            .or_else(|| infer_resource_key(&descriptor.path));
        let request_id = CorrelationId::mint();
        let started = Instant::now();

        let result = run_with_retry(&policy, options.cancel.as_ref(), |attempt| {
            let outbound = decorate(&descriptor, attempt, &request_id, self.session.as_ref());
            self.attempt(outbound, resource_key)
        })
        .await;

        log_outcome(&request_id, &descriptor, &result, started);
        result
    }

    async fn attempt(
        &self,
        outbound: OutboundRequest,
        resource_key: Option<&str>,
    ) -> Result<ApiResponse<Payload>> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            request_id = %outbound.request_id,
            attempt = outbound.attempt.index,
            "{} {}",
            outbound.method,
            outbound.path
        );

        let outcome = self.transport.execute(&outbound).await;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            request_id = %outbound.request_id,
            attempt = outbound.attempt.index,
            latency_ms = outbound.attempt.elapsed().as_millis() as u64,
            status = outcome.as_ref().ok().map(|raw| raw.status),
            "attempt finished"
        );
        let raw = outcome.map_err(|failure| classify_failure(&failure))?;

        if !raw.is_success() {
            return Err(classify_status(raw.status, &raw.body));
        }

        let status = raw.status;
        let envelope = Envelope::sniff(outbound.response_kind, raw.body)
            .map_err(|err| err.with_status(status))?;
        normalize(envelope, resource_key, status)
    }

    fn report<T>(&self, result: Result<T>, options: &RequestOptions) -> Result<T> {
        let Some(notifier) = &self.notifier else {
            return result;
        };
        match &result {
            Ok(_) => {
                if let Some(message) = &options.success_message {
                    notifier.success(message);
                }
            }
            Err(err) if err.kind != ErrorKind::Cancelled && !options.silent => {
                notifier.error(err);
            }
            Err(_) => {}
        }
        result
    }
}

#[cfg(feature = "tracing")]
fn log_outcome<T>(
    request_id: &CorrelationId,
    descriptor: &RequestDescriptor,
    result: &Result<T>,
    started: Instant,
) {
    let elapsed_ms = started.elapsed().as_millis();
    match result {
        Ok(_) => tracing::debug!(
            request_id = %request_id,
            method = %descriptor.method,
            path = %descriptor.path,
            "request completed in {elapsed_ms} ms"
        ),
        Err(err) => tracing::warn!(
            request_id = %request_id,
            method = %descriptor.method,
            path = %descriptor.path,
            kind = ?err.kind,
            status = ?err.http_status,
            "request failed after {elapsed_ms} ms: {}",
            err.message
        ),
    }
}

#[cfg(not(feature = "tracing"))]
fn log_outcome<T>(
    _request_id: &CorrelationId,
    _descriptor: &RequestDescriptor,
    _result: &Result<T>,
    _started: Instant,
) {
}

fn decode_payload<T: DeserializeOwned>(response: ApiResponse<Payload>) -> Result<ApiResponse<T>> {
    let ApiResponse { data, meta } = response;
    let value = match data {
        Payload::Json(value) => value,
        Payload::Binary(_) => {
            return Err(ApiError::malformed(
                "binary response cannot be decoded as JSON; use download()",
            ))
        }
    };
    let data = serde_json::from_value(value)
        .map_err(|err| ApiError::malformed(format!("unexpected payload shape: {err}")))?;
    Ok(ApiResponse { data, meta })
}
