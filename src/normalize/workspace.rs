//! Workspace, profile, project and versioning-policy normalization

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::fields::{first_string, first_value, parse_count, prune_metadata, record_of, string_list, Record};
use super::NormalizeContext;
use crate::assets::{resolve_local_path, AssetReference};
use crate::identity::{is_uuid, resolve_identity, resolve_legacy_id};
use crate::report::EntityKind;
use crate::sanitize::{
    parse_boolean_like, parse_timestamp, sanitize_color, sanitize_slug,
    sanitize_storage_file_name, Timestamp, DEFAULT_COLOR,
};

pub const DEFAULT_STATUSES: &[&str] = &["To do", "In progress", "Done"];

const IDENTITY_CHAIN: &[&str] = &["supabaseId", "supabase_id", "remoteId", "id"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub color: String,
    pub statuses: Vec<String>,
    /// Epoch milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}

/// Sparse versioning options; absent keys inherit the store default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersioningPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_versions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

impl VersioningPolicy {
    /// `None` when no recognized key is present.
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        let policy = match value? {
            Value::Object(map) => VersioningPolicy {
                enabled: first_value(map, &["enabled", "isEnabled", "is_enabled"])
                    .and_then(parse_boolean_like),
                max_versions: parse_count(first_value(map, &["maxVersions", "max_versions"])),
                retention_days: parse_count(first_value(map, &["retentionDays", "retention_days"])),
            },
            other => VersioningPolicy {
                enabled: parse_boolean_like(other),
                ..Default::default()
            },
        };
        if policy == VersioningPolicy::default() {
            None
        } else {
            Some(policy)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalWorkspace {
    pub id: Option<Uuid>,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub logo_path: Option<String>,
    pub default_statuses: Vec<String>,
    pub projects: Vec<Project>,
    pub versioning_policy: Option<VersioningPolicy>,
    pub metadata: IndexMap<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl CanonicalWorkspace {
    /// Store payload; `id` is left out entirely when unresolved.
    pub fn to_row(&self) -> Value {
        let mut row = Map::new();
        if let Some(id) = &self.id {
            row.insert("id".into(), json!(id.to_string()));
        }
        row.insert("slug".into(), json!(self.slug));
        row.insert("name".into(), json!(self.name));
        row.insert("description".into(), json!(self.description));
        row.insert("color".into(), json!(self.color));
        row.insert("logo_path".into(), json!(self.logo_path));
        row.insert("default_statuses".into(), json!(self.default_statuses));
        row.insert("projects".into(), json!(self.projects));
        row.insert("versioning_policy".into(), json!(self.versioning_policy));
        row.insert("metadata".into(), json!(self.metadata));
        row.insert("created_at".into(), json!(self.created_at));
        row.insert("updated_at".into(), json!(self.updated_at));
        Value::Object(row)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalProfile {
    pub id: Option<Uuid>,
    pub slug: String,
    pub label: String,
    pub dest_dir: Option<String>,
    pub prompt_id: Option<String>,
    pub pdf_template: Option<String>,
    pub pdf_logo_url: Option<String>,
    pub metadata: IndexMap<String, Value>,
}

impl CanonicalProfile {
    /// Store payload with the parent id the store assigned to the owning workspace.
    pub fn to_row(&self, workspace_id: &str) -> Value {
        let mut row = Map::new();
        if let Some(id) = &self.id {
            row.insert("id".into(), json!(id.to_string()));
        }
        row.insert("workspace_id".into(), json!(workspace_id));
        row.insert("slug".into(), json!(self.slug));
        row.insert("label".into(), json!(self.label));
        row.insert("dest_dir".into(), json!(self.dest_dir));
        row.insert("prompt_id".into(), json!(self.prompt_id));
        row.insert("pdf_template".into(), json!(self.pdf_template));
        row.insert("pdf_logo_url".into(), json!(self.pdf_logo_url));
        row.insert("metadata".into(), json!(self.metadata));
        Value::Object(row)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedProfile {
    pub profile: CanonicalProfile,
    pub logo: AssetReference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedWorkspace {
    pub workspace: CanonicalWorkspace,
    pub logo: AssetReference,
    pub profiles: Vec<NormalizedProfile>,
}

impl NormalizedWorkspace {
    /// Preview shape used in dry runs: the workspace payload with its profiles nested.
    pub fn preview(&self) -> Value {
        let mut row = self.workspace.to_row();
        if let Value::Object(map) = &mut row {
            let profiles: Vec<Value> = self
                .profiles
                .iter()
                .map(|p| p.profile.to_row("<assigned by store>"))
                .collect();
            map.insert("profiles".into(), Value::Array(profiles));
        }
        row
    }
}

fn identity_candidates<'a>(record: &'a Record) -> Vec<&'a Value> {
    IDENTITY_CHAIN
        .iter()
        .filter_map(|key| record.get(*key))
        .collect()
}

fn statuses_or(record: &Record, chain: &[&str], fallback: &[String]) -> Vec<String> {
    let statuses = string_list(first_value(record, chain));
    if statuses.is_empty() {
        fallback.to_vec()
    } else {
        statuses
    }
}

fn normalize_project(
    raw: &Value,
    position: usize,
    workspace: &CanonicalWorkspace,
    workspace_times: (&Timestamp, &Timestamp),
    ctx: &mut NormalizeContext<'_>,
) -> Project {
    let record = record_of(raw);
    let id = first_string(record, &["id", "uuid", "key"])
        .unwrap_or_else(|| format!("{}-project-{}", workspace.slug, position));
    let name = first_string(record, &["name", "title", "label"])
        .unwrap_or_else(|| format!("Project {}", position));
    let color = sanitize_color(
        first_value(record, &["color", "colour"]).unwrap_or(&Value::Null),
        &workspace.color,
    );
    let statuses = statuses_or(record, &["statuses", "columns"], &workspace.default_statuses);

    let created = first_value(record, super::CREATED_AT_CHAIN)
        .map(parse_timestamp)
        .unwrap_or_default();
    let updated = first_value(record, super::UPDATED_AT_CHAIN)
        .map(parse_timestamp)
        .unwrap_or_default();
    let (workspace_created, workspace_updated) = workspace_times;
    let created = if created.is_empty() {
        workspace_created.clone()
    } else {
        created
    };
    let identifier = format!("{}/{}", workspace.slug, id);
    let (created, updated) = ctx.order_timestamps(
        created,
        updated,
        workspace_updated,
        EntityKind::Project,
        position,
        &identifier,
    );

    Project {
        id,
        name,
        color,
        statuses,
        created_at: created.ms.unwrap_or_default(),
        updated_at: updated.ms.unwrap_or_default(),
    }
}

fn normalize_profile(
    raw: &Value,
    position: usize,
    workspace_slug: &str,
    ctx: &mut NormalizeContext<'_>,
) -> NormalizedProfile {
    let record = record_of(raw);
    let id = resolve_identity(&identity_candidates(record));
    let legacy_id = resolve_legacy_id(record, id.as_ref());

    let label = first_string(record, &["label", "name", "title"])
        .unwrap_or_else(|| format!("Profile {}", position));
    let raw_slug = first_string(record, &["slug", "metadata.slug"])
        .or_else(|| first_string(record, &["id"]).filter(|v| !is_uuid(v)))
        .unwrap_or_else(|| label.clone());
    let slug = sanitize_slug(&raw_slug, &format!("profile-{}", position));
    let identifier = format!("{}/{}", workspace_slug, slug);

    let dest_dir = first_string(record, &["destDir", "dest_dir", "outputDir", "output_dir"])
        .map(|dir| resolve_local_path(&dir, ctx.base_dir()).display().to_string());
    let prompt_id = first_string(record, &["promptId", "prompt_id", "metadata.promptId"]);
    let pdf_template = first_string(record, &["pdfTemplate", "pdf_template"])
        .map(|name| sanitize_storage_file_name(&name, "template"));
    let logo_raw = first_string(
        record,
        &["pdfLogoUrl", "pdf_logo_url", "pdfLogo", "pdfLogoPath", "pdf_logo_path"],
    );
    let logo = ctx.classify_asset(logo_raw.as_deref(), EntityKind::Profile, position, &identifier);

    let mut metadata = prune_metadata(record.get("metadata"));
    if let Some(legacy) = legacy_id {
        metadata.entry("legacyId".to_string()).or_insert(Value::String(legacy));
    }

    NormalizedProfile {
        profile: CanonicalProfile {
            id,
            slug,
            label,
            dest_dir,
            prompt_id,
            pdf_template,
            pdf_logo_url: logo.remote_path.clone(),
            metadata,
        },
        logo,
    }
}

/// Normalizes one workspace with its nested projects and profiles. `index` is 0-based.
pub fn normalize_workspace(
    raw: &Value,
    index: usize,
    ctx: &mut NormalizeContext<'_>,
) -> NormalizedWorkspace {
    let position = index + 1;
    let record = record_of(raw);

    let id = resolve_identity(&identity_candidates(record));
    let legacy_id = resolve_legacy_id(record, id.as_ref());

    let name = first_string(record, &["name", "metadata.client", "metadata.name"])
        .unwrap_or_else(|| format!("Workspace {}", position));
    let slug = sanitize_slug(
        &first_string(record, &["slug", "metadata.slug"]).unwrap_or_else(|| name.clone()),
        &format!("workspace-{}", position),
    );
    let description = first_string(record, &["description", "metadata.description"]);
    let color = sanitize_color(
        first_value(record, &["color", "metadata.color"]).unwrap_or(&Value::Null),
        DEFAULT_COLOR,
    );

    let logo_raw = first_string(
        record,
        &["logoPath", "logo_path", "logo", "pdfLogo", "metadata.logoPath"],
    );
    let logo = ctx.classify_asset(logo_raw.as_deref(), EntityKind::Workspace, position, &slug);

    let default_fallback: Vec<String> = DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect();
    let default_statuses = statuses_or(
        record,
        &["defaultStatuses", "default_statuses", "statuses", "metadata.defaultStatuses"],
        &default_fallback,
    );

    let versioning_policy = VersioningPolicy::from_value(first_value(
        record,
        &["versioningPolicy", "versioning_policy", "versioning", "metadata.versioning"],
    ));

    let mut metadata = prune_metadata(record.get("metadata"));
    if let Some(legacy) = legacy_id {
        metadata.entry("legacyId".to_string()).or_insert(Value::String(legacy));
    }

    let (created, updated) = ctx.resolve_timestamps(record, EntityKind::Workspace, position, &slug);

    let mut workspace = CanonicalWorkspace {
        id,
        slug,
        name,
        description,
        color,
        logo_path: logo.remote_path.clone(),
        default_statuses,
        projects: Vec::new(),
        versioning_policy,
        metadata,
        created_at: created.iso.clone().unwrap_or_default(),
        updated_at: updated.iso.clone().unwrap_or_default(),
    };

    let first_child_issue = ctx.issues.len();
    let projects: Vec<Project> = first_value(record, &["projects", "metadata.projects"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(k, item)| {
                    normalize_project(item, k + 1, &workspace, (&created, &updated), ctx)
                })
                .collect()
        })
        .unwrap_or_default();
    workspace.projects = projects;

    let profiles = first_value(record, &["profiles", "metadata.profiles"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(j, item)| normalize_profile(item, j + 1, &workspace.slug, ctx))
                .collect()
        })
        .unwrap_or_default();
    for issue in &mut ctx.issues[first_child_issue..] {
        issue.parent = Some((EntityKind::Workspace, position));
    }

    NormalizedWorkspace {
        workspace,
        logo,
        profiles,
    }
}
