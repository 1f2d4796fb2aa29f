//! Deferred asset manifest
//!
//! Assets that were still local after classification are not uploaded inline. They are listed
//! in a manifest for a follow-up step; nothing here retries them.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{file_stamp, write_string_to_file};
use crate::errors::MigrationError;
use crate::normalize::NormalizedWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestEntryType {
    Workspace,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredManifestEntry {
    #[serde(rename = "type")]
    pub entry_type: ManifestEntryType,
    pub workspace_slug: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub profile_slug: Option<String>,
    pub local_path: PathBuf,
}

impl fmt::Display for DeferredManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.profile_slug {
            Some(profile) => write!(
                f,
                "profile {}/{}: {}",
                self.workspace_slug,
                profile,
                self.local_path.display()
            ),
            None => write!(
                f,
                "workspace {}: {}",
                self.workspace_slug,
                self.local_path.display()
            ),
        }
    }
}

/// One entry per asset that is still local, workspace logo first, then its profiles.
pub fn collect_deferred(workspaces: &[NormalizedWorkspace]) -> Vec<DeferredManifestEntry> {
    let mut entries = Vec::new();
    for normalized in workspaces {
        let workspace_slug = &normalized.workspace.slug;
        if let Some(local) = &normalized.logo.local_path {
            entries.push(DeferredManifestEntry {
                entry_type: ManifestEntryType::Workspace,
                workspace_slug: workspace_slug.clone(),
                profile_slug: None,
                local_path: local.clone(),
            });
        }
        for profile in &normalized.profiles {
            if let Some(local) = &profile.logo.local_path {
                entries.push(DeferredManifestEntry {
                    entry_type: ManifestEntryType::Profile,
                    workspace_slug: workspace_slug.clone(),
                    profile_slug: Some(profile.profile.slug.clone()),
                    local_path: local.clone(),
                });
            }
        }
    }
    entries
}

pub fn manifest_file_name(now: DateTime<Utc>) -> String {
    format!("deferred-assets-{}.json", file_stamp(now))
}

/// Writes the manifest into `dir`; returns `None` without touching disk when there is
/// nothing to defer.
pub fn write_manifest(
    entries: &[DeferredManifestEntry],
    dir: &Path,
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>, MigrationError> {
    if entries.is_empty() {
        return Ok(None);
    }
    let path = dir.join(manifest_file_name(now));
    let content = serde_json::to_string_pretty(entries)?;
    write_string_to_file(&path, &content).map_err(|source| MigrationError::Manifest {
        path: path.clone(),
        source,
    })?;
    Ok(Some(path))
}
