//! Remote store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store answered with a non-success status
    #[error("{table} request failed ({status}): {message}")]
    Http {
        table: String,
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upsert succeeded but the echoed row carries no `id`
    #[error("{table} upsert returned no id")]
    MissingIdentity { table: String },

    #[error("Invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Http { .. } => "STORE_HTTP_ERROR",
            StoreError::Transport(_) => "STORE_TRANSPORT_ERROR",
            StoreError::MissingIdentity { .. } => "STORE_MISSING_IDENTITY",
            StoreError::InvalidResponse(_) => "STORE_INVALID_RESPONSE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_message() {
        let err = StoreError::Http {
            table: "profiles".to_string(),
            status: 409,
            message: "duplicate key value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "profiles request failed (409): duplicate key value"
        );
        assert_eq!(err.error_code(), "STORE_HTTP_ERROR");
    }

    #[test]
    fn test_missing_identity() {
        let err = StoreError::MissingIdentity {
            table: "workspaces".to_string(),
        };
        assert_eq!(err.error_code(), "STORE_MISSING_IDENTITY");
        assert_eq!(err.to_string(), "workspaces upsert returned no id");
    }
}
