use tokio_util::sync::CancellationToken;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Process-wide client configuration.
///
/// Built once at startup and handed to [`crate::ApiClient::new`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Base endpoint every request path is resolved against.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_delay_ms: u64,
    /// Extra headers sent with every request.
    pub default_headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            default_headers: Vec::new(),
            user_agent: None,
        }
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// Reads:
    /// - `CERTDASH_API_URL` (required)
    /// - `CERTDASH_TIMEOUT_MS`, `CERTDASH_MAX_RETRIES`,
    ///   `CERTDASH_RETRY_DELAY_MS` (optional)
    pub fn from_env() -> std::result::Result<Self, String> {
        let base_url = std::env::var("CERTDASH_API_URL")
            .map_err(|_| "missing CERTDASH_API_URL environment variable".to_owned())?;
        if base_url.trim().is_empty() {
            return Err("CERTDASH_API_URL is set but empty".to_owned());
        }

        let mut options = Self::new(base_url.trim());
        if let Some(value) = env_number("CERTDASH_TIMEOUT_MS")? {
            if value == 0 {
                return Err("CERTDASH_TIMEOUT_MS must be greater than zero".to_owned());
            }
            options.timeout_ms = value;
        }
        if let Some(value) = env_number("CERTDASH_MAX_RETRIES")? {
            options.max_retries = u32::try_from(value)
                .map_err(|_| format!("CERTDASH_MAX_RETRIES is out of range: {value}"))?;
        }
        if let Some(value) = env_number("CERTDASH_RETRY_DELAY_MS")? {
            options.retry_delay_ms = value;
        }
        Ok(options)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

fn env_number(name: &str) -> std::result::Result<Option<u64>, String> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| format!("{name} must be a non-negative integer: {err}")),
        _ => Ok(None),
    }
}

/// Per-call retry configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RetryOverride {
    /// Use [`ClientOptions::max_retries`].
    #[default]
    Inherit,
    /// Retry at most `n` times; `Limit(0)` behaves like `Disabled`.
    Limit(u32),
    Disabled,
}

impl RetryOverride {
    pub fn resolve(self, default_retries: u32) -> u32 {
        match self {
            Self::Inherit => default_retries,
            Self::Limit(retries) => retries,
            Self::Disabled => 0,
        }
    }
}

/// Per-call overrides. Every field is optional.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub retry: RetryOverride,
    /// Base backoff delay overriding [`ClientOptions::retry_delay_ms`].
    pub retry_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Skip envelope handling and return the raw body.
    pub response_is_binary: bool,
    /// Collection key to unwrap, e.g. `certificates`. Inferred from the
    /// path when absent.
    pub resource_key: Option<String>,
    pub cancel: Option<CancellationToken>,
    /// Suppress error notification for this call.
    pub silent: bool,
    /// Message handed to the notifier when the call succeeds.
    pub success_message: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry = RetryOverride::Limit(retries);
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = RetryOverride::Disabled;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = Some(retry_delay_ms);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn binary(mut self) -> Self {
        self.response_is_binary = true;
        self
    }

    pub fn with_resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }
}
