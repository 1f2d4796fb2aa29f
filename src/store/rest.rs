use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{ConflictTarget, RemoteStore};
use crate::errors::{StoreError, StoreResult};

const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// HTTP client for a PostgREST-style table API with an object storage endpoint.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: Url,
}

impl RestStore {
    pub fn new(base_url: Url, service_key: &str, timeout: Duration) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(service_key)
            .map_err(|e| StoreError::InvalidResponse(format!("invalid service key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", service_key))
            .map_err(|e| StoreError::InvalidResponse(format!("invalid service key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::InvalidResponse(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn error_from(table: &str, response: Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StoreError::Http {
            table: table.to_string(),
            status: status.as_u16(),
            message: error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        }
    }
}

/// Human-readable message from a store error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    ["message", "error", "msg", "details"]
        .iter()
        .find_map(|key| parsed.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .filter(|message| !message.is_empty())
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn upsert(
        &self,
        table: &str,
        row: Value,
        conflict: ConflictTarget,
    ) -> StoreResult<Value> {
        let mut url = self.endpoint(&format!("rest/v1/{}", table))?;
        url.query_pairs_mut()
            .append_pair("on_conflict", conflict.column());
        debug!("Upserting into {} on {}", table, conflict);

        let response = self
            .client
            .post(url)
            .header("Prefer", PREFER_UPSERT)
            .json(&Value::Array(vec![row]))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(table, response).await);
        }

        match response.json::<Value>().await? {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            Value::Object(row) => Ok(Value::Object(row)),
            other => Err(StoreError::InvalidResponse(format!(
                "{} upsert returned {}",
                table, other
            ))),
        }
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<String> {
        let url = self.endpoint(&format!("storage/v1/object/{}/{}", bucket, path))?;
        debug!("Uploading {} bytes to {}/{}", bytes.len(), bucket, path);

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(bucket, response).await);
        }
        Ok(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(r#"{"message": "duplicate key", "code": "23505"}"#),
            Some("duplicate key".to_string())
        );
        assert_eq!(
            error_message(r#"{"error": "Bucket not found"}"#),
            Some("Bucket not found".to_string())
        );
        assert_eq!(error_message("<html>"), None);
        assert_eq!(error_message(r#"{"message": ""}"#), None);
    }

    #[test]
    fn endpoints_join_onto_base_url() {
        let store = RestStore::new(
            Url::parse("https://example.supabase.co/").unwrap(),
            "service-key",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            store.endpoint("rest/v1/workspaces").unwrap().as_str(),
            "https://example.supabase.co/rest/v1/workspaces"
        );
    }
}
