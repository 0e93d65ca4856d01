use serde::Deserialize;
use thiserror::Error;

/// One entry of a backend validation error list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    #[serde(default)]
    pub msg: String,
    /// Stable validation code, e.g. `missing` or `string_too_short`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub ctx: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FieldError {
    /// The field this error is about: the last string element of `loc`.
    pub fn field(&self) -> Option<&str> {
        self.loc.last().and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    /// Integer value from the validation context, e.g. `min_length`.
    pub fn ctx_value(&self, key: &str) -> Option<String> {
        let value = self.ctx.as_ref()?.get(key)?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// The `detail` member of a backend error body.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    /// `{"detail": "..."}`
    Message(String),
    /// `{"detail": [{"loc": [...], "msg": "..."}]}`
    Fields(Vec<FieldError>),
    /// Body that is not a JSON error document (truncated)
    Raw(String),
    /// No body, or a body without a usable `detail`
    Empty,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetailPayload {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<DetailPayload>,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ErrorDetail {
    /// Parse an error response body.
    pub fn parse(body: &str) -> Self {
        if body.trim().is_empty() {
            return ErrorDetail::Empty;
        }
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { detail: Some(DetailPayload::Message(msg)) }) if !msg.is_empty() => {
                ErrorDetail::Message(msg)
            }
            Ok(ErrorBody { detail: Some(DetailPayload::Fields(fields)) }) => ErrorDetail::Fields(fields),
            Ok(_) => ErrorDetail::Empty,
            Err(_) => ErrorDetail::Raw(truncate_body(body)),
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetail::Message(msg) => write!(f, "{}", msg),
            ErrorDetail::Fields(fields) => {
                let msgs: Vec<&str> = fields.iter().map(|e| e.msg.as_str()).collect();
                write!(f, "{}", msgs.join("; "))
            }
            ErrorDetail::Raw(body) => write!(f, "{}", body),
            ErrorDetail::Empty => write!(f, "no detail"),
        }
    }
}

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

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(ErrorDetail),

    #[error("Access denied: {0}")]
    AccessDenied(ErrorDetail),

    #[error("Resource not found: {0}")]
    NotFound(ErrorDetail),

    #[error("Bad request: {0}")]
    BadRequest(ErrorDetail),

    #[error("Validation failed: {0}")]
    Validation(ErrorDetail),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(ErrorDetail),

    #[error("Request rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: ErrorDetail },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = ErrorDetail::parse(body);
        match status.as_u16() {
            400 => ApiError::BadRequest(detail),
            401 => ApiError::Unauthorized(detail),
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            422 => ApiError::Validation(detail),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail),
            code => ApiError::Rejected { status: code, detail },
        }
    }

    /// True when no response was received at all. A request that could not
    /// be built (e.g. a malformed base URL) is not a network failure.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::NetworkError(e) if e.is_connect() || e.is_timeout() || e.is_request())
    }

    /// True when the backend answered but the body could not be read as
    /// the expected JSON.
    pub fn is_invalid_response(&self) -> bool {
        match self {
            ApiError::InvalidResponse(_) => true,
            ApiError::NetworkError(e) => e.is_decode(),
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// The backend-provided detail, if the server answered with one.
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            ApiError::Unauthorized(d)
            | ApiError::AccessDenied(d)
            | ApiError::NotFound(d)
            | ApiError::BadRequest(d)
            | ApiError::Validation(d)
            | ApiError::ServerError(d)
            | ApiError::Rejected { detail: d, .. } => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_parse_string_detail() {
        let detail = ErrorDetail::parse(r#"{"detail":"Неверный логин или пароль"}"#);
        assert_eq!(detail, ErrorDetail::Message("Неверный логин или пароль".to_string()));
    }

    #[test]
    fn test_parse_field_detail() {
        let body = r#"{"detail":[{"loc":["body","company_name"],"msg":"Field required","type":"missing"}]}"#;
        match ErrorDetail::parse(body) {
            ErrorDetail::Fields(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field(), Some("company_name"));
                assert_eq!(fields[0].kind.as_deref(), Some("missing"));
            }
            other => panic!("expected field errors, got {:?}", other),
        }
    }

    #[test]
    fn test_field_ignores_numeric_loc() {
        let err: FieldError = serde_json::from_str(r#"{"loc":["body",0],"msg":"x"}"#).unwrap();
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_invalid_response_is_not_network() {
        let err = ApiError::InvalidResponse("GET /auth/me: expected value".to_string());
        assert!(err.is_invalid_response());
        assert!(!err.is_network());
        assert!(!ApiError::Unauthorized(ErrorDetail::Empty).is_invalid_response());
    }

    #[test]
    fn test_ctx_value() {
        let err: FieldError = serde_json::from_str(
            r#"{"loc":["body","login"],"msg":"m","type":"string_too_short","ctx":{"min_length":3}}"#,
        )
        .unwrap();
        assert_eq!(err.ctx_value("min_length").as_deref(), Some("3"));
        assert_eq!(err.ctx_value("max_length"), None);
    }

    #[test]
    fn test_parse_empty_and_raw() {
        assert_eq!(ErrorDetail::parse(""), ErrorDetail::Empty);
        assert_eq!(ErrorDetail::parse(r#"{"detail":null}"#), ErrorDetail::Empty);
        assert_eq!(ErrorDetail::parse(r#"{"detail":""}"#), ErrorDetail::Empty);
        assert_eq!(
            ErrorDetail::parse("<html>Bad Gateway</html>"),
            ErrorDetail::Raw("<html>Bad Gateway</html>".to_string())
        );
    }

    #[test]
    fn test_raw_body_is_truncated() {
        let body = "ж".repeat(400);
        match ErrorDetail::parse(&body) {
            ErrorDetail::Raw(text) => {
                assert!(text.contains("truncated, 800 total bytes"));
            }
            other => panic!("expected raw detail, got {:?}", other),
        }
    }

    #[test]
    fn test_from_status() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":[]}"#),
            ApiError::Validation(ErrorDetail::Fields(_))
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail":"Логин уже занят"}"#),
            ApiError::BadRequest(ErrorDetail::Message(_))
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::ServerError(ErrorDetail::Empty)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::CONFLICT, ""),
            ApiError::Rejected { status: 409, .. }
        ));
        assert!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "").detail().is_none());
    }
}
