//! Remote table store boundary
//!
//! The engine only needs conflict-target upserts that echo the persisted row, plus an object
//! upload for logo bytes. [`RestStore`] talks to a PostgREST-style HTTP API;
//! [`InMemoryStore`] records calls for tests and dry experiments.

pub mod memory;
pub mod rest;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};

pub use memory::InMemoryStore;
pub use rest::RestStore;

pub const WORKSPACES_TABLE: &str = "workspaces";
pub const PROFILES_TABLE: &str = "profiles";
pub const PROMPTS_TABLE: &str = "prompts";
pub const PDF_LOGOS_TABLE: &str = "pdf_logos";

/// Column (or column set) an upsert uses to decide between insert and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictTarget {
    Id,
    Slug,
    /// Profiles without an id are unique per workspace, not globally
    WorkspaceSlug,
}

impl ConflictTarget {
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ConflictTarget::Id => &["id"],
            ConflictTarget::Slug => &["slug"],
            ConflictTarget::WorkspaceSlug => &["workspace_id", "slug"],
        }
    }

    /// The `on_conflict` parameter value.
    pub fn column(&self) -> &'static str {
        match self {
            ConflictTarget::Id => "id",
            ConflictTarget::Slug => "slug",
            ConflictTarget::WorkspaceSlug => "workspace_id,slug",
        }
    }
}

impl fmt::Display for ConflictTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upserts one row and returns the persisted row, including its store-assigned `id`.
    async fn upsert(
        &self,
        table: &str,
        row: Value,
        conflict: ConflictTarget,
    ) -> StoreResult<Value>;

    /// Uploads (or overwrites) an object and returns its storage path.
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<String>;
}

/// The `id` the store echoed back for `table`.
pub fn persisted_id(table: &str, row: &Value) -> StoreResult<String> {
    match row.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(StoreError::MissingIdentity {
            table: table.to_string(),
        }),
    }
}
