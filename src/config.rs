use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::assets::DEFAULT_STORAGE_PREFIXES;
use crate::errors::{MigrationError, MigrationResult};

pub const DEFAULT_LOGO_BUCKET: &str = "pdf-logos";

/// Migrator configuration loaded from environment variables and an optional YAML file.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    pub store_url: Option<Url>,
    pub service_key: Option<String>,
    pub logo_bucket: String,
    pub storage_prefixes: Vec<String>,
    pub workspaces_file: Option<PathBuf>,
    pub prompts_file: Option<PathBuf>,
    pub logos_dir: Option<PathBuf>,
    pub manifest_dir: PathBuf,
    pub request_timeout: Duration,
}

/// Keys accepted in the YAML overlay; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct ConfigFile {
    store_url: Option<String>,
    service_key: Option<String>,
    logo_bucket: Option<String>,
    storage_prefixes: Option<Vec<String>>,
    workspaces_file: Option<PathBuf>,
    prompts_file: Option<PathBuf>,
    logos_dir: Option<PathBuf>,
    manifest_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl MigratorConfig {
    pub fn from_env() -> Self {
        let mut values = HashMap::new();
        for key in Self::tracked_keys() {
            if let Ok(value) = std::env::var(key) {
                values.insert(key.to_string(), value);
            }
        }
        Self::from_map(&values)
    }

    pub fn from_map(values: &HashMap<String, String>) -> Self {
        fn read(values: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
            keys.iter()
                .filter_map(|key| values.get(*key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        }

        let store_url = read(values, &["CLOUD_MIGRATE_STORE_URL", "SUPABASE_URL"])
            .and_then(|raw| parse_store_url(&raw).ok());
        let storage_prefixes = read(values, &["CLOUD_MIGRATE_STORAGE_PREFIXES"])
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|prefix| !prefix.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|prefixes| !prefixes.is_empty())
            .unwrap_or_else(default_prefixes);
        let timeout_secs = read(values, &["CLOUD_MIGRATE_TIMEOUT_SECS"])
            .and_then(|value| value.parse().ok())
            .unwrap_or(30);

        Self {
            store_url,
            service_key: read(
                values,
                &["CLOUD_MIGRATE_SERVICE_KEY", "SUPABASE_SERVICE_ROLE_KEY"],
            ),
            logo_bucket: read(values, &["CLOUD_MIGRATE_LOGO_BUCKET"])
                .unwrap_or_else(|| DEFAULT_LOGO_BUCKET.to_string()),
            storage_prefixes,
            workspaces_file: read(values, &["CLOUD_MIGRATE_WORKSPACES_FILE"]).map(PathBuf::from),
            prompts_file: read(values, &["CLOUD_MIGRATE_PROMPTS_FILE"]).map(PathBuf::from),
            logos_dir: read(values, &["CLOUD_MIGRATE_LOGOS_DIR"]).map(PathBuf::from),
            manifest_dir: read(values, &["CLOUD_MIGRATE_MANIFEST_DIR"])
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn tracked_keys() -> Vec<&'static str> {
        vec![
            "CLOUD_MIGRATE_STORE_URL",
            "SUPABASE_URL",
            "CLOUD_MIGRATE_SERVICE_KEY",
            "SUPABASE_SERVICE_ROLE_KEY",
            "CLOUD_MIGRATE_LOGO_BUCKET",
            "CLOUD_MIGRATE_STORAGE_PREFIXES",
            "CLOUD_MIGRATE_WORKSPACES_FILE",
            "CLOUD_MIGRATE_PROMPTS_FILE",
            "CLOUD_MIGRATE_LOGOS_DIR",
            "CLOUD_MIGRATE_MANIFEST_DIR",
            "CLOUD_MIGRATE_TIMEOUT_SECS",
        ]
    }

    /// Applies a YAML overlay on top of the current values.
    pub fn merge_yaml(mut self, yaml: &str) -> MigrationResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        if let Some(raw) = file.store_url {
            self.store_url = Some(parse_store_url(&raw)?);
        }
        if let Some(key) = file.service_key.filter(|key| !key.trim().is_empty()) {
            self.service_key = Some(key);
        }
        if let Some(bucket) = file.logo_bucket {
            self.logo_bucket = bucket;
        }
        if let Some(prefixes) = file.storage_prefixes {
            self.storage_prefixes = prefixes;
        }
        self.workspaces_file = file.workspaces_file.or(self.workspaces_file);
        self.prompts_file = file.prompts_file.or(self.prompts_file);
        self.logos_dir = file.logos_dir.or(self.logos_dir);
        if let Some(dir) = file.manifest_dir {
            self.manifest_dir = dir;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }

    pub fn load(path: Option<&Path>) -> MigrationResult<Self> {
        let config = Self::from_env();
        let Some(path) = path else {
            return Ok(config);
        };
        debug!("Loading configuration overlay from {}", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|source| MigrationError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        config.merge_yaml(&yaml)
    }

    /// URL and key for the remote store; only real runs need them.
    pub fn store_credentials(&self) -> MigrationResult<(Url, String)> {
        let url = self.store_url.clone().ok_or_else(|| {
            MigrationError::Config(
                "store URL is not set (CLOUD_MIGRATE_STORE_URL or SUPABASE_URL)".to_string(),
            )
        })?;
        let key = self.service_key.clone().ok_or_else(|| {
            MigrationError::Config(
                "service key is not set (CLOUD_MIGRATE_SERVICE_KEY or SUPABASE_SERVICE_ROLE_KEY)"
                    .to_string(),
            )
        })?;
        Ok((url, key))
    }
}

fn default_prefixes() -> Vec<String> {
    DEFAULT_STORAGE_PREFIXES
        .iter()
        .map(|prefix| prefix.to_string())
        .collect()
}

/// Parses the store base URL, ensuring a trailing slash so relative joins keep its path.
pub fn parse_store_url(raw: &str) -> MigrationResult<Url> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    Url::parse(&normalized)
        .map_err(|err| MigrationError::Config(format!("invalid store URL `{}`: {}", trimmed, err)))
}
