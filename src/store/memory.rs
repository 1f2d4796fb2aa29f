use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ConflictTarget, RemoteStore};
use crate::errors::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertCall {
    pub table: String,
    pub row: Value,
    pub conflict: ConflictTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadCall {
    pub bucket: String,
    pub path: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    upserts: Vec<UpsertCall>,
    uploads: Vec<UploadCall>,
    rejected_slugs: Vec<(String, String, String)>,
    rejected_uploads: Vec<(String, String)>,
    next_id: u64,
}

/// Upsert-by-key store held in memory; assigns UUID-shaped ids to new rows.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects upserts into `table` whose row carries `slug`.
    pub fn reject_slug(self, table: &str, slug: &str, message: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .rejected_slugs
                .push((table.to_string(), slug.to_string(), message.to_string()));
        }
        self
    }

    pub fn reject_upload(self, path: &str, message: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .rejected_uploads
                .push((path.to_string(), message.to_string()));
        }
        self
    }

    pub fn upserts(&self) -> Vec<UpsertCall> {
        self.state
            .lock()
            .map(|state| state.upserts.clone())
            .unwrap_or_default()
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        self.state
            .lock()
            .map(|state| state.uploads.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.upserts.len() + state.uploads.len())
            .unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .map(|state| {
                state
                    .tables
                    .get(table)
                    .map(|rows| rows.iter().cloned().map(Value::Object).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

fn poisoned() -> StoreError {
    StoreError::InvalidResponse("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn upsert(
        &self,
        table: &str,
        row: Value,
        conflict: ConflictTarget,
    ) -> StoreResult<Value> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.upserts.push(UpsertCall {
            table: table.to_string(),
            row: row.clone(),
            conflict,
        });

        let Value::Object(incoming) = row else {
            return Err(StoreError::InvalidResponse("row must be an object".to_string()));
        };
        let slug = incoming.get("slug").and_then(Value::as_str).unwrap_or_default();
        if let Some((_, _, message)) = state
            .rejected_slugs
            .iter()
            .find(|(t, s, _)| t == table && s == slug)
        {
            return Err(StoreError::Http {
                table: table.to_string(),
                status: 409,
                message: message.clone(),
            });
        }

        let key = conflict
            .columns()
            .iter()
            .map(|column| incoming.get(*column).cloned())
            .collect::<Option<Vec<Value>>>()
            .ok_or_else(|| StoreError::Http {
                table: table.to_string(),
                status: 400,
                message: format!("missing conflict column {}", conflict),
            })?;

        state.next_id += 1;
        let generated = format!("00000000-0000-4000-8000-{:012x}", state.next_id);
        let rows = state.tables.entry(table.to_string()).or_default();
        let position = rows.iter().position(|existing| {
            conflict
                .columns()
                .iter()
                .zip(&key)
                .all(|(column, value)| existing.get(*column) == Some(value))
        });
        let persisted = match position {
            Some(position) => {
                let existing = &mut rows[position];
                for (column, value) in incoming {
                    existing.insert(column, value);
                }
                existing.clone()
            }
            None => {
                let mut inserted = incoming;
                inserted
                    .entry("id".to_string())
                    .or_insert(Value::String(generated));
                rows.push(inserted.clone());
                inserted
            }
        };
        Ok(Value::Object(persisted))
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<String> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.uploads.push(UploadCall {
            bucket: bucket.to_string(),
            path: path.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
        });
        if let Some((_, message)) = state.rejected_uploads.iter().find(|(p, _)| p == path) {
            return Err(StoreError::Http {
                table: bucket.to_string(),
                status: 400,
                message: message.clone(),
            });
        }
        Ok(path.to_string())
    }
}
