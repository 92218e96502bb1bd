//! HTTP transport speaking the `{status, data, message}` JSON envelope.
//!
//! Every response body is an envelope:
//!
//! ```json
//! {"status": "success", "data": {"id": "ZTF21aaa", "ra": 234.22}}
//! {"status": "error", "message": "Invalid candidate ID"}
//! ```
//!
//! Mapping onto [`TransportFailure`]:
//!
//! | Response                                         | Result                      |
//! |--------------------------------------------------|-----------------------------|
//! | 2xx, `status == "success"`                       | `Ok(data)` (`null` if none) |
//! | any code, `status != "success"`, with `message`  | `Application`               |
//! | unreadable body, error without `message`         | `Transport`                 |
//! | connection failure, timeout                      | `Transport`                 |
//!
//! `HEAD` responses have no body: 2xx is `Ok(null)`, anything else is an
//! `Application` failure carrying the status' reason phrase.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use slate_core::{Method, Transport, TransportFailure, TransportFuture, TransportRequest};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the API base URL (required by [`HttpTransportConfig::from_env`])
pub const API_URL_VAR: &str = "SLATE_API_URL";

/// Environment variable holding the API token
pub const API_TOKEN_VAR: &str = "SLATE_API_TOKEN";

/// Environment variable holding the per-request timeout in seconds
pub const API_TIMEOUT_VAR: &str = "SLATE_API_TIMEOUT_SECS";

/// Errors building an [`HttpTransport`]
#[derive(Error, Debug)]
pub enum HttpConfigError {
    /// A required environment variable is not set
    #[error("Environment variable {0} is not set")]
    MissingVar(&'static str),

    /// The timeout variable is not a whole number of seconds
    #[error("Invalid timeout '{0}': expected whole seconds")]
    InvalidTimeout(String),

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Configuration for [`HttpTransport`]
///
/// # Example
///
/// ```
/// use slate_runtime::http::HttpTransportConfig;
/// use std::time::Duration;
///
/// let config = HttpTransportConfig::new("https://skyportal.example.org/")
///     .with_token("abc123")
///     .with_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.base_url, "https://skyportal.example.org");
/// ```
#[derive(Clone)]
pub struct HttpTransportConfig {
    /// Scheme and host, without trailing slash; request paths are appended
    pub base_url: String,
    /// Sent as `Authorization: token <token>`
    pub token: Option<String>,
    /// Per-request timeout enforced by the HTTP client
    pub timeout: Duration,
}

impl HttpTransportConfig {
    /// Configuration for `base_url` with no token and a 30 second timeout
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Authenticate every request with `token`
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the configuration from `SLATE_API_URL`, `SLATE_API_TOKEN` and
    /// `SLATE_API_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns [`HttpConfigError::MissingVar`] if `SLATE_API_URL` is unset, or
    /// [`HttpConfigError::InvalidTimeout`] if the timeout does not parse.
    pub fn from_env() -> Result<Self, HttpConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, HttpConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(API_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or(HttpConfigError::MissingVar(API_URL_VAR))?;

        let mut config = Self::new(base_url);

        if let Some(token) = lookup(API_TOKEN_VAR).filter(|token| !token.is_empty()) {
            config = config.with_token(token);
        }

        if let Some(raw) = lookup(API_TIMEOUT_VAR) {
            let seconds = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| HttpConfigError::InvalidTimeout(raw.clone()))?;
            config = config.with_timeout(Duration::from_secs(seconds));
        }

        Ok(config)
    }
}

impl std::fmt::Debug for HttpTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// [`Transport`] over HTTP with the JSON envelope
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Build a transport from `config`
    ///
    /// # Errors
    ///
    /// Returns [`HttpConfigError::Client`] if the HTTP client cannot be built
    /// (e.g., the TLS backend fails to initialise).
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpConfigError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Build a transport configured from the environment
    ///
    /// # Errors
    ///
    /// See [`HttpTransportConfig::from_env`] and [`HttpTransport::new`].
    pub fn from_env() -> Result<Self, HttpConfigError> {
        Self::new(HttpTransportConfig::from_env()?)
    }

    /// The configuration in use
    #[must_use]
    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.config.base_url)
        } else {
            format!("{}/{path}", self.config.base_url)
        }
    }

    #[tracing::instrument(
        skip(self, request),
        name = "http_request",
        fields(method = %request.method, path = %request.path)
    )]
    async fn send(&self, request: TransportRequest) -> Result<Value, TransportFailure> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), self.url(&request.path));

        if let Some(token) = &self.config.token {
            builder = builder.header(AUTHORIZATION, format!("token {token}"));
        }
        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "HTTP request failed");
            TransportFailure::Transport(e.to_string())
        })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "HTTP response received");

        if request.method == Method::Head {
            return head_result(status);
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportFailure::Transport(e.to_string()))?;

        interpret(status.as_u16(), &body)
    }
}

impl Transport for HttpTransport {
    fn request(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(self.send(request))
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn head_result(status: StatusCode) -> Result<Value, TransportFailure> {
    if status.is_success() {
        Ok(Value::Null)
    } else {
        Err(TransportFailure::Application {
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Interpret an envelope response body
///
/// # Errors
///
/// Returns [`TransportFailure::Application`] for error envelopes carrying a
/// message and [`TransportFailure::Transport`] for anything uninterpretable.
pub fn interpret(status: u16, body: &str) -> Result<Value, TransportFailure> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(status, error = %e, "Response body is not an envelope");
        TransportFailure::Transport(format!("HTTP {status}: unreadable response body: {e}"))
    })?;

    let is_success = envelope.status == "success";

    if is_success && (200..300).contains(&status) {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    match envelope.message {
        Some(message) if !is_success => Err(TransportFailure::Application {
            status: Some(status),
            message,
        }),
        _ => Err(TransportFailure::Transport(format!(
            "HTTP {status}: '{}' response without a usable message",
            envelope.status
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_success_envelope_returns_data() {
        let body = r#"{"status": "success", "data": {"id": "ZTF21aaa", "ra": 234.22}}"#;
        assert_eq!(interpret(200, body), Ok(json!({"id": "ZTF21aaa", "ra": 234.22})));
    }

    #[test]
    fn test_success_without_data_is_null() {
        assert_eq!(interpret(200, r#"{"status": "success"}"#), Ok(Value::Null));
    }

    #[test]
    fn test_error_envelope_is_application_failure() {
        let body = r#"{"status": "error", "message": "Invalid candidate ID"}"#;
        assert_eq!(
            interpret(400, body),
            Err(TransportFailure::Application {
                status: Some(400),
                message: "Invalid candidate ID".into(),
            })
        );
        // The envelope decides, not the status code
        assert!(matches!(
            interpret(200, body),
            Err(TransportFailure::Application { .. })
        ));
    }

    #[test]
    fn test_uninterpretable_bodies_are_transport_failures() {
        assert!(interpret(502, "<html>Bad Gateway</html>").unwrap_err().is_transport());
        assert!(interpret(500, r#"{"status": "error"}"#).unwrap_err().is_transport());
        assert!(interpret(500, r#"{"status": "success", "data": 1}"#).unwrap_err().is_transport());
    }

    #[test]
    fn test_head_result() {
        assert_eq!(head_result(StatusCode::OK), Ok(Value::Null));
        assert_eq!(
            head_result(StatusCode::NOT_FOUND),
            Err(TransportFailure::Application {
                status: Some(404),
                message: "Not Found".into(),
            })
        );
    }

    #[test]
    fn test_url_joining() {
        let transport =
            HttpTransport::new(HttpTransportConfig::new("http://localhost:5000/")).unwrap();
        assert_eq!(
            transport.url("/api/candidates/1"),
            "http://localhost:5000/api/candidates/1"
        );
        assert_eq!(transport.url("api/sysinfo"), "http://localhost:5000/api/sysinfo");
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_from_lookup() {
        let config = HttpTransportConfig::from_lookup(lookup(&[
            (API_URL_VAR, "http://localhost:5000"),
            (API_TOKEN_VAR, "abc123"),
            (API_TIMEOUT_VAR, "5"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.token.as_deref(), Some("abc123"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_requires_url() {
        assert!(matches!(
            HttpTransportConfig::from_lookup(lookup(&[])),
            Err(HttpConfigError::MissingVar(API_URL_VAR))
        ));
        assert!(matches!(
            HttpTransportConfig::from_lookup(lookup(&[
                (API_URL_VAR, "http://localhost:5000"),
                (API_TIMEOUT_VAR, "soon"),
            ])),
            Err(HttpConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = HttpTransportConfig::new("http://localhost").with_token("secret");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
