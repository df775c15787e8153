use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {}", truncate_body(.0))]
    BadRequest(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized(String),

    #[error("Access denied: {}", truncate_body(.0))]
    AccessDenied(String),

    #[error("Resource not found: {}", truncate_body(.0))]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {}", truncate_body(.0))]
    ServerError(String),

    #[error("Status {status}: {}", truncate_body(.body))]
    UnexpectedStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.to_string();
        match status {
            400 => ApiError::BadRequest(body),
            401 => ApiError::Unauthorized(body),
            403 => ApiError::AccessDenied(body),
            404 => ApiError::NotFound(body),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(body),
            _ => ApiError::UnexpectedStatus { status, body },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// An owned copy of this error for callers that share one failure.
    ///
    /// Status errors are copied exactly. Errors wrapping a non-cloneable
    /// source become `RefreshFailed` with the source's message.
    pub(crate) fn replay(&self) -> Self {
        match self {
            ApiError::BadRequest(body) => ApiError::BadRequest(body.clone()),
            ApiError::Unauthorized(body) => ApiError::Unauthorized(body.clone()),
            ApiError::AccessDenied(body) => ApiError::AccessDenied(body.clone()),
            ApiError::NotFound(body) => ApiError::NotFound(body.clone()),
            ApiError::RateLimited => ApiError::RateLimited,
            ApiError::ServerError(body) => ApiError::ServerError(body.clone()),
            ApiError::UnexpectedStatus { status, body } => ApiError::UnexpectedStatus {
                status: *status,
                body: body.clone(),
            },
            ApiError::InvalidResponse(message) => ApiError::InvalidResponse(message.clone()),
            ApiError::NoRefreshToken => ApiError::NoRefreshToken,
            ApiError::RefreshFailed(message) => ApiError::RefreshFailed(message.clone()),
            other => ApiError::RefreshFailed(other.to_string()),
        }
    }

    fn body(&self) -> Option<&str> {
        match self {
            ApiError::BadRequest(body)
            | ApiError::Unauthorized(body)
            | ApiError::AccessDenied(body)
            | ApiError::NotFound(body)
            | ApiError::ServerError(body)
            | ApiError::UnexpectedStatus { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Error payload of the response, when the body is JSON.
    pub fn payload(&self) -> Option<Value> {
        self.body().and_then(|body| serde_json::from_str(body).ok())
    }

    /// The conventional `detail` message of an error payload.
    pub fn detail(&self) -> Option<String> {
        match self.payload()? {
            Value::Object(map) => match map.get("detail") {
                Some(Value::String(detail)) if !detail.is_empty() => Some(detail.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// First field-level validation message of an error payload.
    ///
    /// Field values are visited in payload order; list values are flattened
    /// one level, so `{"name": ["taken"], "password": ["short"]}` yields
    /// `"taken"`.
    pub fn first_field_message(&self) -> Option<String> {
        let Value::Object(map) = self.payload()? else {
            return None;
        };
        let first = map
            .into_iter()
            .flat_map(|(_, value)| match value {
                Value::Array(items) => items,
                other => vec![other],
            })
            .next()?;
        match first {
            Value::String(message) if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}
