use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::services::session::SessionContext;

/// Shared HTTP transport for the Vision Tech API.
///
/// Every authenticated request takes its bearer token from the session; a 401
/// response tears that session down for all clones.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: SessionContext,
}

/// One entry of a 422 validation body, rendered as `field: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Deserialize)]
struct ValidationEntry {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        session: SessionContext,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        // Url::join drops the last path segment unless it ends with a slash.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// Request builder carrying the session's bearer token.
    ///
    /// Fails without touching the network when there is no usable session.
    pub fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.session.bearer_token().ok_or(ApiError::Unauthenticated)?;
        Ok(self.http.request(method, self.url(path)?).bearer_auth(token))
    }

    /// Request builder without credentials (login).
    pub fn anonymous(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.http.request(method, self.url(path)?))
    }

    /// Send a request and map non-success statuses onto `ApiError`.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let error = self.error_for_status(status, &body);
        tracing::warn!(status = status.as_u16(), path = %url, error = %error, "API request failed");
        Err(error)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ApiError::Decode)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.authorized(Method::GET, path)?).await
    }

    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send_json(self.authorized(Method::GET, path)?.query(query))
            .await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(self.authorized(Method::POST, path)?.json(body))
            .await
    }

    /// POST with no body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.authorized(Method::POST, path)?).await
    }

    fn error_for_status(&self, status: StatusCode, body: &str) -> ApiError {
        match status {
            StatusCode::UNAUTHORIZED => {
                self.session.clear();
                ApiError::Unauthorized
            }
            StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation(parse_validation_errors(body)),
            StatusCode::NOT_IMPLEMENTED => ApiError::NotImplemented(error_detail(body)),
            _ => ApiError::Status {
                status: status.as_u16(),
                detail: error_detail(body),
            },
        }
    }
}

/// Extract `detail` from a JSON error body, falling back to the raw text.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Turn a 422 body into readable per-field messages.
///
/// The service reports `{"detail": [{"loc": [...], "msg": "..."}]}`; anything else
/// is kept verbatim as a single message.
pub fn parse_validation_errors(body: &str) -> Vec<FieldError> {
    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.detail,
        Err(_) => {
            return vec![FieldError {
                field: None,
                message: body.trim().to_string(),
            }]
        }
    };

    if let serde_json::Value::String(message) = detail {
        return vec![FieldError {
            field: None,
            message,
        }];
    }

    match serde_json::from_value::<Vec<ValidationEntry>>(detail.clone()) {
        Ok(entries) if !entries.is_empty() => entries
            .into_iter()
            .map(|entry| FieldError {
                field: field_path(&entry.loc),
                message: entry.msg,
            })
            .collect(),
        _ => vec![FieldError {
            field: None,
            message: detail.to_string(),
        }],
    }
}

fn field_path(loc: &[serde_json::Value]) -> Option<String> {
    let parts: Vec<String> = loc
        .iter()
        .enumerate()
        .filter(|(i, part)| {
            !(*i == 0 && matches!(part.as_str(), Some("body" | "query" | "path")))
        })
        .map(|(_, part)| match part {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not signed in or session expired")]
    Unauthenticated,

    #[error("Session rejected by the server (401)")]
    Unauthorized,

    #[error("Validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Request rejected locally: {0}")]
    InvalidRequest(#[from] garde::Report),

    #[error("Server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Not implemented by the server: {0}")]
    NotImplemented(String),

    #[error("Export format '{0}' is not supported by this service")]
    UnsupportedFormat(crate::models::detection::ExportFormat),

    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Transport and authorization failures; handled centrally rather than per view.
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Unauthorized)
    }
}
