//! Errors returned by service clients

use thiserror::Error;

/// Maximum length of response body kept in log lines
const MAX_LOG_BODY_LENGTH: usize = 200;

#[derive(Debug, Error)]
pub enum SdkError {
    /// The service answered with a status outside the expected codes
    #[error("{method} {url} returned {status}: [{error_code}] {error_msg}")]
    Http {
        status: u16,
        method: String,
        url: String,
        error_code: String,
        error_msg: String,
        body: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl SdkError {
    /// Build an HTTP error, extracting the service error code and message
    /// from the common HuaweiCloud error body shapes.
    pub fn http(status: u16, method: &str, url: &str, body: String) -> Self {
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        let find = |candidates: &[&str]| -> String {
            candidates
                .iter()
                .find_map(|pointer| parsed.pointer(pointer).and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string()
        };
        let error_code = find(&["/error_code", "/errCode", "/error/code", "/code"]);
        let error_msg = find(&[
            "/error_msg",
            "/externalMessage",
            "/error/message",
            "/message",
        ]);

        SdkError::Http {
            status,
            method: method.to_string(),
            url: url.to_string(),
            error_code,
            error_msg,
            body,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            SdkError::Http { error_code, .. } if !error_code.is_empty() => Some(error_code),
            _ => None,
        }
    }

    /// Parsed JSON body of an HTTP error
    pub fn body_json(&self) -> Option<serde_json::Value> {
        match self {
            SdkError::Http { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Throttling and gateway failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            SdkError::Http { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            SdkError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Turn this error into a 404 with the same body
    pub fn into_not_found(self) -> Self {
        match self {
            SdkError::Http {
                method,
                url,
                error_code,
                error_msg,
                body,
                ..
            } => SdkError::Http {
                status: 404,
                method,
                url,
                error_code,
                error_msg,
                body,
            },
            other => other,
        }
    }
}

/// Truncate a body for logging
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| c.is_control(), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_code_and_message() {
        let err = SdkError::http(
            400,
            "GET",
            "https://ccm/v1/private-certificate-authorities/x",
            r#"{"error_code":"PCA.10010002","error_msg":"CA not found"}"#.to_string(),
        );
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.error_code(), Some("PCA.10010002"));
        assert!(err.to_string().contains("CA not found"));
        assert!(!err.is_not_found());
        assert!(err.into_not_found().is_not_found());
    }

    #[test]
    fn parses_nested_error_shape() {
        let err = SdkError::http(
            409,
            "POST",
            "u",
            r#"{"error":{"code":"DBS.280343","message":"busy"}}"#.to_string(),
        );
        assert_eq!(err.error_code(), Some("DBS.280343"));
    }

    #[test]
    fn non_json_body() {
        let err = SdkError::http(503, "GET", "u", "Service Unavailable".to_string());
        assert_eq!(err.error_code(), None);
        assert!(err.is_retryable());
    }

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("500 bytes total"));
    }
}
