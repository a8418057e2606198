//! One-shot SCIM HTTP client.
//!
//! Performs a single request against a downstream SCIM service provider and
//! reflects the outcome as a [`ScimResponse`] value. Throws are caught at
//! this boundary: transport-level failures (DNS, TCP, TLS, timeouts) become
//! `status = 0` with an error message, so callers classify retryability
//! without touching exception paths.

use std::time::Duration;

use crate::error::{ScimClientError, ScimClientResult};

/// SCIM media type used for both `Accept` and `Content-Type`.
pub const SCIM_MEDIA_TYPE: &str = "application/scim+json";

/// Default connect and total timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP methods the SCIM core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScimMethod {
    Post,
    Put,
    Patch,
    Delete,
    Get,
}

impl ScimMethod {
    /// Whether requests with this method carry a body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        matches!(self, ScimMethod::Post | ScimMethod::Put | ScimMethod::Patch)
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            ScimMethod::Post => reqwest::Method::POST,
            ScimMethod::Put => reqwest::Method::PUT,
            ScimMethod::Patch => reqwest::Method::PATCH,
            ScimMethod::Delete => reqwest::Method::DELETE,
            ScimMethod::Get => reqwest::Method::GET,
        }
    }
}

impl std::fmt::Display for ScimMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScimMethod::Post => "POST",
            ScimMethod::Put => "PUT",
            ScimMethod::Patch => "PATCH",
            ScimMethod::Delete => "DELETE",
            ScimMethod::Get => "GET",
        };
        write!(f, "{s}")
    }
}

/// One outbound SCIM request.
#[derive(Debug)]
pub struct ScimRequest<'a> {
    /// Destination base URL. Trailing-slash-insensitive.
    pub base_url: &'a str,
    /// Bearer token for the `Authorization` header.
    pub token: &'a str,
    /// HTTP method.
    pub method: ScimMethod,
    /// Resource path under the base URL, e.g. `Users` or `Groups`.
    pub resource_path: &'a str,
    /// Downstream resource id appended to the path, if any.
    pub resource_id: Option<&'a str>,
    /// Request body for body-carrying methods.
    pub body: Option<&'a serde_json::Value>,
}

/// The outcome of one SCIM request, as a plain value.
#[derive(Debug, Clone)]
pub struct ScimResponse {
    /// HTTP status code; `0` for transport-level failures.
    pub status: u16,
    /// Response body text, if any was received.
    pub body: Option<String>,
    /// Top-level `id` extracted from a successful 2xx body.
    pub scim_resource_id: Option<String>,
    /// Transport failure cause, when `status == 0`.
    pub error_message: Option<String>,
}

impl ScimResponse {
    /// Build a response for a transport-level failure.
    #[must_use]
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: None,
            scim_resource_id: None,
            error_message: Some(message.into()),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the outcome warrants a retry: transport failures, request
    /// timeout, throttling, and server errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, 0 | 408 | 429) || (500..=599).contains(&self.status)
    }

    /// A short description of the failure for delivery records.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        match (&self.error_message, self.status) {
            (Some(msg), 0) => msg.clone(),
            _ => {
                let body = self.body.as_deref().unwrap_or_default();
                let trimmed: String = body.chars().take(200).collect();
                if trimmed.is_empty() {
                    format!("HTTP {}", self.status)
                } else {
                    format!("HTTP {}: {}", self.status, trimmed)
                }
            }
        }
    }
}

/// One-shot SCIM HTTP client with connect and total timeouts.
#[derive(Debug, Clone)]
pub struct ScimClient {
    http: reqwest::Client,
}

impl ScimClient {
    /// Build a client with the given connect/total timeout.
    pub fn new(timeout: Duration) -> ScimClientResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { http })
    }

    /// Build a client with the default 30 s timeouts.
    pub fn with_defaults() -> ScimClientResult<Self> {
        Self::new(DEFAULT_TIMEOUT)
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Perform one request. Never returns an error: every outcome,
    /// including transport failure, is reflected in the [`ScimResponse`].
    pub async fn execute(&self, request: ScimRequest<'_>) -> ScimResponse {
        let url = join_url(request.base_url, request.resource_path, request.resource_id);

        let mut builder = self
            .http
            .request(request.method.as_reqwest(), &url)
            .bearer_auth(request.token)
            .header(reqwest::header::ACCEPT, SCIM_MEDIA_TYPE);

        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, SCIM_MEDIA_TYPE)
                .json(body);
        }

        tracing::debug!(
            target: "scim_delivery",
            method = %request.method,
            url = %url,
            "Executing SCIM request"
        );

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();

                let scim_resource_id = if (200..300).contains(&status) {
                    extract_resource_id(&body)
                } else {
                    None
                };

                ScimResponse {
                    status,
                    body: if body.is_empty() { None } else { Some(body) },
                    scim_resource_id,
                    error_message: None,
                }
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("Request timeout: {e}")
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };

                tracing::warn!(
                    target: "scim_delivery",
                    method = %request.method,
                    url = %url,
                    error = %message,
                    "SCIM request failed at transport level"
                );

                ScimResponse::transport_failure(message)
            }
        }
    }
}

/// Join a base URL, resource path, and optional resource id, insensitive to
/// stray slashes on either side.
#[must_use]
pub fn join_url(base_url: &str, resource_path: &str, resource_id: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    let path = resource_path.trim_matches('/');
    match resource_id {
        Some(id) => format!("{base}/{path}/{id}"),
        None => format!("{base}/{path}"),
    }
}

/// Extract the top-level `id` field from a SCIM response body.
///
/// Accepts both string and numeric ids.
#[must_use]
pub fn extract_resource_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("id") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
