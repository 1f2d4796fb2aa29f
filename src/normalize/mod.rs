//! Entity normalizers
//!
//! Each normalizer maps an arbitrary JSON shape onto a typed canonical record. The only
//! failure mode is a missing required field ([`MigrationError::Validation`]); everything else
//! degrades to a default and, where the input was inconsistent, leaves a
//! [`RecordIssue`] on the context.

pub mod fields;
pub mod logo;
pub mod prompt;
pub mod workspace;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::assets::{AssetClassifier, AssetReference, PathProbe};
use crate::report::{EntityKind, IssueKind, RecordIssue};
use crate::sanitize::{parse_timestamp, Timestamp};

pub use logo::{normalize_logo, PdfLogo};
pub use prompt::{normalize_prompt, CanonicalPrompt};
pub use workspace::{
    normalize_workspace, CanonicalProfile, CanonicalWorkspace, NormalizedProfile,
    NormalizedWorkspace, Project, VersioningPolicy,
};

use fields::{first_value, Record};

pub(crate) const CREATED_AT_CHAIN: &[&str] = &["createdAt", "created_at", "metadata.createdAt"];
pub(crate) const UPDATED_AT_CHAIN: &[&str] = &["updatedAt", "updated_at", "metadata.updatedAt"];

/// Shared fallbacks for one batch plus the issues raised while normalizing it.
pub struct NormalizeContext<'a> {
    pub dataset_updated_at: Timestamp,
    pub now: DateTime<Utc>,
    pub base_dir: PathBuf,
    pub storage_prefixes: Vec<String>,
    probe: &'a dyn PathProbe,
    issues: Vec<RecordIssue>,
}

impl<'a> NormalizeContext<'a> {
    pub fn new(base_dir: impl Into<PathBuf>, probe: &'a dyn PathProbe) -> Self {
        Self {
            dataset_updated_at: Timestamp::default(),
            now: Utc::now(),
            base_dir: base_dir.into(),
            storage_prefixes: crate::assets::DEFAULT_STORAGE_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            probe,
            issues: Vec::new(),
        }
    }

    pub fn with_dataset_updated_at(mut self, value: Option<&Value>) -> Self {
        self.dataset_updated_at = value.map(parse_timestamp).unwrap_or_default();
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_storage_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.storage_prefixes = prefixes;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn push_issue(&mut self, issue: RecordIssue) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[RecordIssue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<RecordIssue> {
        std::mem::take(&mut self.issues)
    }

    /// Classifies an asset reference, recording probe failures against the record.
    pub fn classify_asset(
        &mut self,
        raw: Option<&str>,
        entity: EntityKind,
        index: usize,
        identifier: &str,
    ) -> AssetReference {
        let classified =
            AssetClassifier::new(&self.base_dir, &self.storage_prefixes, self.probe).classify(raw);
        if let Some(message) = classified.probe_error {
            self.push_issue(RecordIssue::new(
                entity,
                index,
                identifier,
                IssueKind::AssetProbeFailed,
                message,
            ));
        }
        classified.reference
    }

    /// Resolves `createdAt`/`updatedAt` with the dataset and run fallbacks, clamping an
    /// `updatedAt` that precedes `createdAt`.
    pub fn resolve_timestamps(
        &mut self,
        record: &Record,
        entity: EntityKind,
        index: usize,
        identifier: &str,
    ) -> (Timestamp, Timestamp) {
        let created = first_value(record, CREATED_AT_CHAIN)
            .map(parse_timestamp)
            .unwrap_or_default();
        let updated = first_value(record, UPDATED_AT_CHAIN)
            .map(parse_timestamp)
            .unwrap_or_default();
        let fallback = if self.dataset_updated_at.is_empty() {
            Timestamp::from_datetime(self.now)
        } else {
            self.dataset_updated_at.clone()
        };
        self.order_timestamps(created, updated, &fallback, entity, index, identifier)
    }

    pub(crate) fn order_timestamps(
        &mut self,
        created: Timestamp,
        updated: Timestamp,
        fallback: &Timestamp,
        entity: EntityKind,
        index: usize,
        identifier: &str,
    ) -> (Timestamp, Timestamp) {
        let (created, updated) = match (created.is_empty(), updated.is_empty()) {
            (false, false) => (created, updated),
            // a fallback older than the record's own createdAt is not an input error
            (false, true) => {
                let fallback_is_older = match (fallback.ms, created.ms) {
                    (Some(fallback_ms), Some(created_ms)) => fallback_ms < created_ms,
                    _ => false,
                };
                let updated = if fallback.is_empty() || fallback_is_older {
                    created.clone()
                } else {
                    fallback.clone()
                };
                (created, updated)
            }
            (true, false) => (updated.clone(), updated),
            (true, true) => (fallback.clone(), fallback.clone()),
        };

        match (created.ms, updated.ms) {
            (Some(created_ms), Some(updated_ms)) if updated_ms < created_ms => {
                self.push_issue(RecordIssue::new(
                    entity,
                    index,
                    identifier,
                    IssueKind::TimestampClamped,
                    format!(
                        "updatedAt {} precedes createdAt {}; clamped to createdAt",
                        updated.iso.as_deref().unwrap_or("?"),
                        created.iso.as_deref().unwrap_or("?")
                    ),
                ));
                (created.clone(), created)
            }
            _ => (created, updated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::FsProbe;
    use chrono::TimeZone;
    use serde_json::json;

    fn context() -> NormalizeContext<'static> {
        NormalizeContext::new("/tmp", &FsProbe)
            .with_now(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn inverted_timestamps_are_clamped_with_warning() {
        let mut ctx = context();
        let raw = json!({"createdAt": "2024-06-01", "updatedAt": "2024-01-01"});
        let (created, updated) =
            ctx.resolve_timestamps(fields::record_of(&raw), EntityKind::Workspace, 1, "acme");
        assert_eq!(created, updated);
        assert_eq!(created.iso.as_deref(), Some("2024-06-01T00:00:00.000Z"));
        assert_eq!(ctx.issues().len(), 1);
        assert_eq!(ctx.issues()[0].kind, IssueKind::TimestampClamped);
    }

    #[test]
    fn dataset_timestamp_fills_missing_updated_at() {
        let mut ctx = context().with_dataset_updated_at(Some(&json!("2024-08-01")));
        let raw = json!({"created_at": "2024-02-01"});
        let (created, updated) =
            ctx.resolve_timestamps(fields::record_of(&raw), EntityKind::Prompt, 1, "intro");
        assert_eq!(created.iso.as_deref(), Some("2024-02-01T00:00:00.000Z"));
        assert_eq!(updated.iso.as_deref(), Some("2024-08-01T00:00:00.000Z"));
        assert!(ctx.issues().is_empty());
    }

    #[test]
    fn missing_timestamps_use_run_time() {
        let mut ctx = context();
        let (created, updated) =
            ctx.resolve_timestamps(fields::record_of(&json!({})), EntityKind::Prompt, 1, "x");
        assert_eq!(created.iso.as_deref(), Some("2025-01-01T00:00:00.000Z"));
        assert_eq!(created, updated);
    }

    #[test]
    fn only_updated_at_sets_both() {
        let mut ctx = context();
        let raw = json!({"updatedAt": 1717200000000i64});
        let (created, updated) =
            ctx.resolve_timestamps(fields::record_of(&raw), EntityKind::Prompt, 1, "x");
        assert_eq!(created.ms, Some(1717200000000));
        assert_eq!(updated.ms, Some(1717200000000));
    }
}
