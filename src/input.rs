//! Dataset loading and shape checks

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{MigrationError, MigrationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Workspaces,
    Prompts,
}

impl DatasetKind {
    fn collection_keys(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Workspaces => &["workspaces", "items"],
            DatasetKind::Prompts => &["prompts", "items"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<Value>,
    /// Top-level `updatedAt` of the export, used as a timestamp fallback
    pub updated_at: Option<Value>,
    /// Directory of the input file; relative asset paths resolve against it
    pub base_dir: PathBuf,
}

/// Splits a parsed document into its records. Accepts a bare array or a wrapping object.
pub fn parse_dataset(
    document: Value,
    kind: DatasetKind,
    base_dir: PathBuf,
) -> MigrationResult<Dataset> {
    match document {
        Value::Array(records) => Ok(Dataset {
            records,
            updated_at: None,
            base_dir,
        }),
        Value::Object(mut object) => {
            let updated_at = ["updatedAt", "updated_at"]
                .iter()
                .find_map(|key| object.get(*key).filter(|value| !value.is_null()).cloned());
            let records = kind
                .collection_keys()
                .iter()
                .find_map(|key| match object.remove(*key) {
                    Some(Value::Array(records)) => Some(records),
                    _ => None,
                })
                .ok_or_else(|| {
                    MigrationError::InputFormat(format!(
                        "expected an array or an object with one of: {}",
                        kind.collection_keys().join(", ")
                    ))
                })?;
            Ok(Dataset {
                records,
                updated_at,
                base_dir,
            })
        }
        other => Err(MigrationError::InputFormat(format!(
            "expected an array or an object, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub async fn load_dataset(path: &Path, kind: DatasetKind) -> MigrationResult<Dataset> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| MigrationError::Input {
            path: path.to_path_buf(),
            source,
        })?;
    let document: Value = serde_json::from_str(&content)?;
    let base_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let dataset = parse_dataset(document, kind, base_dir)?;
    debug!("Loaded {} record(s) from {}", dataset.records.len(), path.display());
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_is_accepted() {
        let dataset =
            parse_dataset(json!([{"name": "a"}]), DatasetKind::Workspaces, ".".into()).unwrap();
        assert_eq!(dataset.records.len(), 1);
        assert!(dataset.updated_at.is_none());
    }

    #[test]
    fn wrapped_collection_keeps_updated_at() {
        let doc = json!({"updatedAt": "2024-01-01T00:00:00Z", "prompts": [{}, {}]});
        let dataset = parse_dataset(doc, DatasetKind::Prompts, ".".into()).unwrap();
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.updated_at, Some(json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn items_key_works_for_both_kinds() {
        let dataset =
            parse_dataset(json!({"items": [{}]}), DatasetKind::Workspaces, ".".into()).unwrap();
        assert_eq!(dataset.records.len(), 1);
    }

    #[test]
    fn wrong_collection_is_rejected() {
        let err = parse_dataset(json!({"prompts": []}), DatasetKind::Workspaces, ".".into())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT_FORMAT");
        let err = parse_dataset(json!("text"), DatasetKind::Prompts, ".".into()).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }

    #[tokio::test]
    async fn missing_file_is_an_input_error() {
        let err = load_dataset(Path::new("/nonexistent/data.json"), DatasetKind::Prompts)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INPUT_UNREADABLE");
    }

    #[tokio::test]
    async fn base_dir_is_the_file_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspaces.json");
        std::fs::write(&path, r#"{"workspaces": [{"name": "Acme"}]}"#).unwrap();
        let dataset = load_dataset(&path, DatasetKind::Workspaces).await.unwrap();
        assert_eq!(dataset.base_dir, dir.path());
    }
}
