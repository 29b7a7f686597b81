use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Shown when a failure carries no usable message of its own.
pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// Maximum length for messages lifted out of response bodies
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - session expired or credentials rejected: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Unauthorized,
    Forbidden,
    Client,
    Server,
    InvalidResponse,
}

/// The presentable form of a failure, as stored in session and resource states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    fn truncate(message: &str) -> String {
        if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
            return message.to_string();
        }
        let mut end = MAX_ERROR_MESSAGE_LENGTH;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &message[..end], message.len())
    }

    /// Classify a non-success response. The message comes from the body when it
    /// carries one, otherwise the fixed fallback is used.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = Self::truncate(&normalize_message(body_json(body).as_ref(), None));
        match status {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            400..=499 => ApiError::Client { status, message },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::InvalidResponse(format!("Unexpected status {}: {}", status, message)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::Client { .. } | ApiError::InvalidRequest(_) => ErrorKind::Client,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The user-presentable message, without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Network(message)
            | ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::InvalidResponse(message)
            | ApiError::InvalidRequest(message)
            | ApiError::Client { message, .. }
            | ApiError::Server { message, .. } => message,
        }
    }

    /// Server errors and transport failures are worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Server { .. })
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind(),
            status: self.status(),
            message: self.message().to_string(),
        }
    }
}

impl From<&ApiError> for ErrorInfo {
    fn from(error: &ApiError) -> Self {
        error.info()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::InvalidResponse(error.to_string())
        } else {
            let message = normalize_message(None, Some(&error.to_string()));
            ApiError::Network(message)
        }
    }
}

fn body_json(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    serde_json::from_str(body).ok()
}

/// Render a `message`-like field. Validation failures often arrive as a list.
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(map) => map.get("message").and_then(message_text),
        _ => None,
    }
}

/// Collapse a failure into one presentable message.
///
/// The first present of the body's `message`, the body's `error`, and the
/// transport's own message wins; otherwise [`FALLBACK_MESSAGE`].
pub fn normalize_message(body: Option<&Value>, transport_message: Option<&str>) -> String {
    body.and_then(|b| b.get("message"))
        .and_then(message_text)
        .or_else(|| body.and_then(|b| b.get("error")).and_then(message_text))
        .or_else(|| {
            transport_message
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_prefers_message_over_error() {
        let body = json!({ "message": "Email already taken", "error": "Conflict" });
        assert_eq!(normalize_message(Some(&body), Some("boom")), "Email already taken");
    }

    #[test]
    fn test_normalize_falls_back_to_error_then_transport() {
        let body = json!({ "error": "Bad Request" });
        assert_eq!(normalize_message(Some(&body), Some("boom")), "Bad Request");

        let body = json!({ "statusCode": 500 });
        assert_eq!(normalize_message(Some(&body), Some("connection reset")), "connection reset");
    }

    #[test]
    fn test_normalize_uses_fixed_fallback() {
        assert_eq!(normalize_message(None, None), FALLBACK_MESSAGE);
        assert_eq!(normalize_message(Some(&json!({})), Some("  ")), FALLBACK_MESSAGE);
        assert_eq!(normalize_message(Some(&json!({ "message": "" })), None), FALLBACK_MESSAGE);
    }

    #[test]
    fn test_normalize_joins_validation_lists() {
        let body = json!({ "message": ["name must not be empty", "email must be an email"] });
        assert_eq!(
            normalize_message(Some(&body), None),
            "name must not be empty; email must be an email"
        );
    }

    #[test]
    fn test_from_status_classifies() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::Forbidden(_)));
        assert!(matches!(
            ApiError::from_status(422, r#"{"message":"invalid"}"#),
            ApiError::Client { status: 422, .. }
        ));
        assert!(matches!(ApiError::from_status(503, "<html>"), ApiError::Server { status: 503, .. }));
        assert!(matches!(ApiError::from_status(302, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_from_status_message() {
        let error = ApiError::from_status(404, r#"{"message":"Teacher not found"}"#);
        assert_eq!(error.message(), "Teacher not found");
        assert_eq!(error.status(), Some(404));

        let error = ApiError::from_status(500, "not json at all");
        assert_eq!(error.message(), FALLBACK_MESSAGE);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let long = "x".repeat(2000);
        let body = json!({ "message": long }).to_string();
        let error = ApiError::from_status(400, &body);
        assert!(error.message().len() < 600);
        assert!(error.message().contains("truncated, 2000 total bytes"));
    }

    #[test]
    fn test_info_and_transience() {
        let error = ApiError::Server {
            status: 502,
            message: "Bad gateway".to_string(),
        };
        let info = error.info();
        assert_eq!(info.kind, ErrorKind::Server);
        assert_eq!(info.status, Some(502));
        assert_eq!(info.message, "Bad gateway");
        assert!(error.is_transient());
        assert!(!ApiError::Forbidden("no".to_string()).is_transient());
    }
}
