/// Error taxonomy for the migrator. Three disjoint kinds share a common
/// base so blanket handlers (batch worker boundary, CLI exit code) can
/// match on one type without losing the diagnostic fields each kind
/// carries.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The PowerDNS server returned a 4xx/5xx that was not retried, or
    /// was the last attempt of a retried sequence.
    #[error("{method} {url} -> {status}: {body}")]
    Api {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// All retries were exhausted due to transport failures (connect
    /// error, read timeout, peer reset).
    #[error("{method} {url}: connection failed after {retries_attempted} retr{plural}: {cause_message}",
        plural = if *retries_attempted == 1 { "y" } else { "ies" })]
    Connection {
        method: String,
        url: String,
        cause_type: String,
        cause_message: String,
        retries_attempted: u32,
    },

    /// Pre-flight validation failure: missing input file, invalid flag
    /// combination, malformed source zone document.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MigrateError {
    pub fn config(msg: impl Into<String>) -> Self {
        MigrateError::Config(msg.into())
    }

    /// `true` for the handful of HTTP statuses the client retries on.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
    }

    /// Best-effort classification label for batch-level logging.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::Api { .. } => "api_error",
            MigrateError::Connection { .. } => "connection_error",
            MigrateError::Config(_) => "config_error",
        }
    }
}

/// Bounded-length truncation for diagnostic response bodies (spec:
/// "bounded-length truncation acceptable").
pub fn truncate_body(body: &str, max_len: usize) -> String {
    if body.len() <= max_len {
        return body.to_string();
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &body[..end], body.len())
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_spec() {
        for s in [408, 429, 500, 502, 503, 504] {
            assert!(MigrateError::is_retryable_status(s));
        }
        for s in [400, 401, 403, 404, 409, 422] {
            assert!(!MigrateError::is_retryable_status(s));
        }
    }

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("short", 2048), "short");
    }

    #[test]
    fn truncate_body_truncates_long_bodies() {
        let body = "x".repeat(3000);
        let out = truncate_body(&body, 2048);
        assert!(out.starts_with(&"x".repeat(2048)));
        assert!(out.contains("3000 bytes total"));
    }

    #[test]
    fn error_kinds_are_disjoint() {
        let api = MigrateError::Api {
            method: "GET".into(),
            url: "http://x".into(),
            status: 404,
            body: String::new(),
        };
        assert_eq!(api.kind(), "api_error");
        let conn = MigrateError::Connection {
            method: "GET".into(),
            url: "http://x".into(),
            cause_type: "timeout".into(),
            cause_message: "timed out".into(),
            retries_attempted: 3,
        };
        assert_eq!(conn.kind(), "connection_error");
        assert_eq!(MigrateError::config("bad").kind(), "config_error");
    }
}
