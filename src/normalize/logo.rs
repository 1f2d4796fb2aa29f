//! PDF logo normalization for discovered image files

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Component;

use super::NormalizeContext;
use crate::assets::AssetReference;
use crate::discovery::DiscoveredFile;
use crate::report::EntityKind;
use crate::sanitize::{sanitize_slug, sanitize_storage_file_name, Timestamp};

pub const SHARED_LOGO_FOLDER: &str = "shared";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfLogo {
    pub slug: String,
    pub name: String,
    pub workspace_slug: Option<String>,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub asset: AssetReference,
    pub created_at: String,
    pub updated_at: String,
}

impl PdfLogo {
    pub fn to_row(&self) -> Value {
        json!({
            "slug": self.slug,
            "name": self.name,
            "workspace_slug": self.workspace_slug,
            "storage_path": self.storage_path,
            "content_type": self.content_type,
            "size_bytes": self.size_bytes,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// The first directory under the discovery root names the owning workspace.
fn workspace_folder(file: &DiscoveredFile) -> Option<String> {
    let mut components = file.relative.components();
    let first = components.next()?;
    components.next()?;
    match first {
        Component::Normal(name) => Some(sanitize_slug(&name.to_string_lossy(), "workspace")),
        _ => None,
    }
}

/// `index` is 0-based.
pub fn normalize_logo(
    file: &DiscoveredFile,
    index: usize,
    ctx: &mut NormalizeContext<'_>,
) -> PdfLogo {
    let position = index + 1;
    let fallback = format!("logo-{}", position);
    let stem = file
        .path
        .file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| fallback.clone());
    let extension = file
        .path
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default();
    let workspace_slug = workspace_folder(file);

    let slug = match &workspace_slug {
        Some(workspace) => sanitize_slug(&format!("{}-{}", workspace, stem), &fallback),
        None => sanitize_slug(&stem, &fallback),
    };
    let file_name = file
        .path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let storage_path = format!(
        "{}/{}",
        workspace_slug.as_deref().unwrap_or(SHARED_LOGO_FOLDER),
        sanitize_storage_file_name(&file_name, &fallback)
    );

    let path = file.path.display().to_string();
    let asset = ctx.classify_asset(Some(path.as_str()), EntityKind::Logo, position, &slug);

    let stamp = file
        .modified
        .map(|modified| Timestamp::from_datetime(DateTime::<Utc>::from(modified)))
        .unwrap_or_else(|| Timestamp::from_datetime(ctx.now));
    let iso = stamp.iso.unwrap_or_default();

    PdfLogo {
        slug,
        name: stem,
        workspace_slug,
        storage_path,
        content_type: content_type_for(&extension).to_string(),
        size_bytes: file.size,
        asset,
        created_at: iso.clone(),
        updated_at: iso,
    }
}
