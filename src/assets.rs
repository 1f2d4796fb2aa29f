//! Classification of referenced asset paths
//!
//! A reference is either already hosted (URL or known storage prefix), present on local disk
//! and waiting for upload, or blank. Network-shaped values are decided without touching the
//! filesystem.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("url pattern"));

pub const DEFAULT_STORAGE_PREFIXES: &[&str] = &["pdf-logos/", "logos/", "storage/"];

/// Filesystem existence check, swappable in tests.
pub trait PathProbe: Send + Sync {
    fn exists(&self, path: &Path) -> io::Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        match std::fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    pub remote_path: Option<String>,
    pub local_path: Option<PathBuf>,
}

impl AssetReference {
    pub fn remote(path: impl Into<String>) -> Self {
        Self {
            remote_path: Some(path.into()),
            local_path: None,
        }
    }

    pub fn local(path: PathBuf) -> Self {
        Self {
            remote_path: None,
            local_path: Some(path),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.remote_path.is_none() && self.local_path.is_none()
    }
}

impl fmt::Display for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.remote_path, &self.local_path) {
            (Some(remote), _) => write!(f, "remote:{}", remote),
            (None, Some(local)) => write!(f, "local:{}", local.display()),
            (None, None) => f.write_str("blank"),
        }
    }
}

/// Outcome of one classification; `probe_error` is set when the filesystem could not answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub reference: AssetReference,
    pub probe_error: Option<String>,
}

pub fn is_absolute_url(value: &str) -> bool {
    ABSOLUTE_URL.is_match(value)
}

pub fn has_storage_prefix(value: &str, prefixes: &[String]) -> bool {
    let relative = value.trim_start_matches('/');
    prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .any(|prefix| relative.starts_with(prefix.as_str()))
}

/// Expands a leading `~` and joins relative paths onto `base_dir`.
pub fn resolve_local_path(raw: &str, base_dir: &Path) -> PathBuf {
    let expanded = if raw == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw))
    } else if let Some(rest) = raw.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(raw),
        }
    } else {
        PathBuf::from(raw)
    };

    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

pub struct AssetClassifier<'a> {
    base_dir: &'a Path,
    storage_prefixes: &'a [String],
    probe: &'a dyn PathProbe,
}

impl<'a> AssetClassifier<'a> {
    pub fn new(base_dir: &'a Path, storage_prefixes: &'a [String], probe: &'a dyn PathProbe) -> Self {
        Self {
            base_dir,
            storage_prefixes,
            probe,
        }
    }

    pub fn classify(&self, raw: Option<&str>) -> Classified {
        let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Classified::default();
        };

        if is_absolute_url(value) || has_storage_prefix(value, self.storage_prefixes) {
            return Classified {
                reference: AssetReference::remote(value),
                probe_error: None,
            };
        }

        let resolved = resolve_local_path(value, self.base_dir);
        match self.probe.exists(&resolved) {
            Ok(true) => Classified {
                reference: AssetReference::local(resolved),
                probe_error: None,
            },
            Ok(false) => {
                debug!(
                    "Asset {} not found locally, keeping it as a remote reference",
                    resolved.display()
                );
                Classified {
                    reference: AssetReference::remote(value),
                    probe_error: None,
                }
            }
            Err(err) => Classified {
                reference: AssetReference::remote(value),
                probe_error: Some(format!("could not probe {}: {}", resolved.display(), err)),
            },
        }
    }
}

pub fn classify_asset(
    raw: Option<&str>,
    base_dir: &Path,
    storage_prefixes: &[String],
    probe: &dyn PathProbe,
) -> Classified {
    AssetClassifier::new(base_dir, storage_prefixes, probe).classify(raw)
}
