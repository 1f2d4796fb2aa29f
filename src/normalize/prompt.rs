//! Prompt template normalization

use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::fields::{first_string, first_value, parse_count, record_of, string_list, Record};
use super::NormalizeContext;
use crate::errors::MigrationError;
use crate::identity::{resolve_identity, resolve_legacy_id};
use crate::report::{EntityKind, IssueKind, RecordIssue};
use crate::sanitize::{
    parse_boolean_like, sanitize_color, sanitize_slug, sanitize_storage_file_name,
    sanitize_string, DEFAULT_COLOR,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CueCard {
    pub key: String,
    pub title: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistSection {
    pub title: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub sections: Vec<ChecklistSection>,
    pub focus_prompts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_summary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_timestamps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_speakers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_logo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_cover: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_mm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPrompt {
    pub id: String,
    pub legacy_id: Option<String>,
    pub workspace_id: Option<Uuid>,
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub persona: Option<String>,
    pub color: String,
    pub tags: Vec<String>,
    pub cue_cards: Vec<CueCard>,
    pub checklist: Option<Checklist>,
    pub markdown_rules: Option<MarkdownRules>,
    pub pdf_rules: Option<PdfRules>,
    pub built_in: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl CanonicalPrompt {
    pub fn to_row(&self) -> Value {
        let mut row = Map::new();
        row.insert("id".into(), json!(self.id));
        row.insert("legacy_id".into(), json!(self.legacy_id));
        row.insert(
            "workspace_id".into(),
            json!(self.workspace_id.map(|id| id.to_string())),
        );
        row.insert("slug".into(), json!(self.slug));
        row.insert("title".into(), json!(self.title));
        row.insert("summary".into(), json!(self.summary));
        row.insert("description".into(), json!(self.description));
        row.insert("persona".into(), json!(self.persona));
        row.insert("color".into(), json!(self.color));
        row.insert("tags".into(), json!(self.tags));
        row.insert("cue_cards".into(), json!(self.cue_cards));
        row.insert("checklist".into(), json!(self.checklist));
        row.insert("markdown_rules".into(), json!(self.markdown_rules));
        row.insert("pdf_rules".into(), json!(self.pdf_rules));
        row.insert("built_in".into(), json!(self.built_in));
        row.insert("created_at".into(), json!(self.created_at));
        row.insert("updated_at".into(), json!(self.updated_at));
        Value::Object(row)
    }
}

fn flag(map: &Record, chain: &[&str]) -> Option<bool> {
    first_value(map, chain).and_then(parse_boolean_like)
}

fn markdown_rules(value: Option<&Value>) -> Option<MarkdownRules> {
    let map = value?.as_object()?;
    let rules = MarkdownRules {
        include_summary: flag(map, &["includeSummary", "include_summary"]),
        include_timestamps: flag(map, &["includeTimestamps", "include_timestamps"]),
        include_speakers: flag(map, &["includeSpeakers", "include_speakers"]),
        heading_level: parse_count(first_value(map, &["headingLevel", "heading_level"]))
            .filter(|level| (1..=6).contains(level))
            .map(|level| level as u8),
        language: first_string(map, &["language", "lang"]).map(|l| l.to_lowercase()),
    };
    (rules != MarkdownRules::default()).then_some(rules)
}

fn page_size(value: &str) -> Option<String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "a4" => Some("A4".to_string()),
        "a5" => Some("A5".to_string()),
        "letter" => Some("Letter".to_string()),
        "legal" => Some("Legal".to_string()),
        _ => None,
    }
}

fn pdf_rules(value: Option<&Value>) -> Option<PdfRules> {
    let map = value?.as_object()?;
    let rules = PdfRules {
        include_logo: flag(map, &["includeLogo", "include_logo", "showLogo"]),
        include_cover: flag(map, &["includeCover", "include_cover", "coverPage"]),
        page_size: first_string(map, &["pageSize", "page_size", "format"])
            .and_then(|size| page_size(&size)),
        font_size: parse_count(first_value(map, &["fontSize", "font_size"]))
            .filter(|size| (6..=72).contains(size)),
        margin_mm: parse_count(first_value(map, &["marginMm", "margin_mm", "margin"])),
        template: first_string(map, &["template", "templateName", "template_name"])
            .map(|name| sanitize_storage_file_name(&name, "template")),
    };
    (rules != PdfRules::default()).then_some(rules)
}

fn checklist(value: Option<&Value>) -> Option<Checklist> {
    let map = value?.as_object()?;
    let sections = map
        .get("sections")
        .and_then(Value::as_array)
        .map(|sections| {
            sections
                .iter()
                .filter_map(|section| match section {
                    Value::Object(section) => {
                        let title = first_string(section, &["title", "label", "name"])?;
                        let items = string_list(first_value(section, &["items", "entries"]));
                        Some(ChecklistSection { title, items })
                    }
                    other => sanitize_string(other).map(|title| ChecklistSection {
                        title,
                        items: Vec::new(),
                    }),
                })
                .collect()
        })
        .unwrap_or_default();
    let focus_prompts = string_list(first_value(map, &["focusPrompts", "focus_prompts"]));
    let checklist = Checklist {
        sections,
        focus_prompts,
    };
    (checklist != Checklist::default()).then_some(checklist)
}

fn cue_cards(
    value: Option<&Value>,
    index: usize,
    slug: &str,
    ctx: &mut NormalizeContext<'_>,
) -> Vec<CueCard> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut cards = Vec::with_capacity(items.len());
    for (k, item) in items.iter().enumerate() {
        let card = record_of(item);
        let Some(title) = first_string(card, &["title", "label"]) else {
            ctx.push_issue(RecordIssue::new(
                EntityKind::Prompt,
                index,
                slug,
                IssueKind::SkippedEntry,
                format!("cue card #{} has no title and was dropped", k + 1),
            ));
            continue;
        };
        let key = sanitize_slug(
            &first_string(card, &["key", "id"]).unwrap_or_else(|| title.clone()),
            &format!("cue-{}", k + 1),
        );
        let hint = first_string(card, &["hint", "description", "prompt"]);
        cards.push(CueCard { key, title, hint });
    }
    cards
}

/// Normalizes one prompt. `index` is 0-based; a missing title is the only failure.
pub fn normalize_prompt(
    raw: &Value,
    index: usize,
    ctx: &mut NormalizeContext<'_>,
) -> Result<CanonicalPrompt, MigrationError> {
    let position = index + 1;
    let record = record_of(raw);

    let declared_slug = first_string(record, &["slug", "metadata.slug"]);
    let Some(title) = first_string(record, &["title", "name", "metadata.title"]) else {
        return Err(MigrationError::Validation {
            index: position,
            field: "title".to_string(),
            identifier: declared_slug
                .or_else(|| first_string(record, &["id"]))
                .unwrap_or_else(|| format!("prompt-{}", position)),
        });
    };
    let slug = sanitize_slug(
        declared_slug.as_deref().unwrap_or(&title),
        &format!("prompt-{}", position),
    );

    let candidates: Vec<&Value> = ["supabaseId", "supabase_id", "id"]
        .iter()
        .filter_map(|key| record.get(*key))
        .collect();
    let uuid = resolve_identity(&candidates);
    let declared_legacy = first_string(record, &["legacyId", "legacy_id"]);
    let own_legacy = resolve_legacy_id(record, uuid.as_ref());
    let id = uuid
        .map(|id| id.to_string())
        .or_else(|| declared_legacy.clone())
        .or_else(|| own_legacy.clone())
        .unwrap_or_else(|| slug.clone());
    let legacy_id = declared_legacy.or(own_legacy).filter(|legacy| *legacy != id);

    let workspace_raw = first_value(record, &["workspaceId", "workspace_id", "metadata.workspaceId"]);
    let workspace_id = workspace_raw.and_then(|value| resolve_identity(&[value]));
    if workspace_id.is_none() {
        if let Some(reference) = workspace_raw.and_then(sanitize_string) {
            ctx.push_issue(RecordIssue::new(
                EntityKind::Prompt,
                position,
                &slug,
                IssueKind::InvalidReference,
                format!(
                    "workspace reference \"{}\" is not a UUID; prompt migrated as global",
                    reference
                ),
            ));
        }
    }

    let cards = cue_cards(
        first_value(record, &["cueCards", "cue_cards"]),
        position,
        &slug,
        ctx,
    );
    let (created, updated) = ctx.resolve_timestamps(record, EntityKind::Prompt, position, &slug);

    Ok(CanonicalPrompt {
        id,
        legacy_id,
        workspace_id,
        summary: first_string(record, &["summary", "metadata.summary"]),
        description: first_string(record, &["description", "metadata.description"]),
        persona: first_string(record, &["persona", "metadata.persona"]),
        color: sanitize_color(
            first_value(record, &["color", "metadata.color"]).unwrap_or(&Value::Null),
            DEFAULT_COLOR,
        ),
        tags: string_list(first_value(record, &["tags", "metadata.tags"])),
        cue_cards: cards,
        checklist: checklist(first_value(record, &["checklist", "metadata.checklist"])),
        markdown_rules: markdown_rules(first_value(record, &["markdownRules", "markdown_rules"])),
        pdf_rules: pdf_rules(first_value(record, &["pdfRules", "pdf_rules"])),
        built_in: first_value(record, &["builtIn", "built_in", "isBuiltIn"])
            .and_then(parse_boolean_like)
            .unwrap_or(false),
        created_at: created.iso.unwrap_or_default(),
        updated_at: updated.iso.unwrap_or_default(),
        slug,
        title,
    })
}
