use thiserror::Error;

/// Message shown when the API cannot be reached at all.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Service unavailable";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            502..=504 => ApiError::ServiceUnavailable(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map a failed sign-in or sign-up response. Any 4xx other than rate
    /// limiting is a credential rejection carrying the server's message.
    pub fn from_auth_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            429 => ApiError::RateLimited,
            400..=499 => ApiError::InvalidCredentials(Self::server_message(body)),
            _ => Self::from_status(status, body),
        }
    }

    /// Pull a human-readable message out of an error body.
    ///
    /// Accepts `{"message": ".."}`, `{"error": ".."}` or plain text.
    fn server_message(body: &str) -> String {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            for key in ["message", "error", "detail"] {
                if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                    return msg.to_string();
                }
            }
        }
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "Invalid email or password".to_string()
        } else {
            Self::truncate_body(trimmed)
        }
    }

    /// True when the request never got a usable answer from the API.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ApiError::ServiceUnavailable(_) => true,
            ApiError::NetworkError(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// Text suitable for display next to a form.
    pub fn user_message(&self) -> String {
        if self.is_unavailable() {
            return SERVICE_UNAVAILABLE_MESSAGE.to_string();
        }
        match self {
            ApiError::InvalidCredentials(msg) => msg.clone(),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, "x"), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ApiError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn test_auth_rejection_uses_server_message() {
        let err = ApiError::from_auth_status(StatusCode::BAD_REQUEST, r#"{"message":"Wrong password"}"#);
        assert_eq!(err.user_message(), "Wrong password");

        let err = ApiError::from_auth_status(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.user_message(), "Invalid email or password");

        let err = ApiError::from_auth_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, ApiError::RateLimited));
    }

    #[test]
    fn test_unavailable_maps_to_generic_message() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>upstream down</html>");
        assert_eq!(err.user_message(), SERVICE_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }
}
