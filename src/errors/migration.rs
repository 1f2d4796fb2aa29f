//! Run-level migration errors

use std::path::PathBuf;

use thiserror::Error;

use crate::duplicates::DuplicateIssue;

#[derive(Error, Debug)]
pub enum MigrationError {
    /// A required field is missing; nothing has been written
    #[error("Record #{index} ({identifier}): missing required field `{field}`")]
    Validation {
        index: usize,
        field: String,
        identifier: String,
    },

    /// One or more id/slug collisions inside the batch
    #[error("{} duplicate identifier(s) found: {}", .0.len(), join_issues(.0))]
    Duplicates(Vec<DuplicateIssue>),

    #[error("Failed to read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input parsed but has an unsupported shape
    #[error("Invalid input format: {0}")]
    InputFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to write manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_issues(issues: &[DuplicateIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MigrationError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MigrationError::Validation { .. } | MigrationError::Duplicates(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            MigrationError::Validation { .. } => "VALIDATION_FAILED",
            MigrationError::Duplicates(_) => "DUPLICATE_IDENTITY",
            MigrationError::Input { .. } => "INPUT_UNREADABLE",
            MigrationError::InputFormat(_) => "INVALID_INPUT_FORMAT",
            MigrationError::Json(_) => "JSON_ERROR",
            MigrationError::Config(_) => "INVALID_CONFIGURATION",
            MigrationError::Manifest { .. } => "MANIFEST_WRITE_FAILED",
        }
    }
}

impl From<serde_yaml::Error> for MigrationError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrationError::Config(err.to_string())
    }
}
