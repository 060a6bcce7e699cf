use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// A credential or setting needed by this operation is absent.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{service} error (status {status}): {detail}")]
    Upstream {
        service: &'static str,
        status: u16,
        detail: String,
    },

    /// The completion service answered without a usable JSON payload.
    #[error("Parsing failed, no valid JSON in AI response: {excerpt}")]
    MalformedResponse { excerpt: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Candidate {id} already {state}")]
    AlreadyTerminal { id: i64, state: &'static str },

    /// The file changed between reading its revision and writing it. Safe to retry.
    #[error("Publish conflict: {0}")]
    PublishConflict(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let target = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "request".to_string());
            AppError::Timeout(target)
        } else {
            AppError::Http(err)
        }
    }
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short machine-readable label, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Upstream { .. } => "upstream",
            AppError::MalformedResponse { .. } => "malformed_response",
            AppError::Validation(_) => "validation",
            AppError::NotFound { .. } => "not_found",
            AppError::AlreadyTerminal { .. } => "already_terminal",
            AppError::PublishConflict(_) => "publish_conflict",
            AppError::Timeout(_) => "timeout",
            AppError::Storage(_) | AppError::Database(_) => "storage",
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Toml(_) => "toml",
            AppError::Io(_) => "io",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::PublishConflict(_) | AppError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_distinct_for_review_conflicts() {
        let terminal = AppError::AlreadyTerminal {
            id: 3,
            state: "validated",
        };
        let missing = AppError::not_found("candidate", 3);
        assert_eq!(terminal.kind(), "already_terminal");
        assert_eq!(missing.kind(), "not_found");
        assert_eq!(terminal.to_string(), "Candidate 3 already validated");
        assert_eq!(missing.to_string(), "candidate 3 not found");
    }

    #[test]
    fn test_publish_conflict_is_retryable() {
        assert!(AppError::PublishConflict("sha mismatch".into()).is_retryable());
        assert!(!AppError::Validation("title".into()).is_retryable());
    }
}
