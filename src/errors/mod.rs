//! Domain error types for the migration engine
//!
//! # Error Categories
//!
//! - **MigrationError**: run-level failures that abort before (or instead of) any store write:
//!   validation, duplicate identities, unreadable input, bad configuration
//! - **StoreError**: a single remote upsert or upload that failed; fatal for that entity only
//!
//! Non-fatal, per-record problems are not errors at all; they are collected as
//! [`RecordIssue`](crate::report::RecordIssue)s.
//!
//! # Examples
//!
//! ```rust
//! use cloud_migrate::errors::MigrationError;
//!
//! let err = MigrationError::Validation {
//!     index: 3,
//!     field: "title".to_string(),
//!     identifier: "intro-call".to_string(),
//! };
//! assert!(err.is_validation());
//! assert_eq!(err.error_code(), "VALIDATION_FAILED");
//! ```

pub mod migration;
pub mod store;

pub use migration::MigrationError;
pub use store::StoreError;

/// Result type alias for run-level operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Result type alias for remote store calls
pub type StoreResult<T> = Result<T, StoreError>;
