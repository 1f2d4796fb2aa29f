//! Structured diagnostics
//!
//! Everything the engine wants to tell the operator goes through a [`Reporter`]. The binary
//! uses [`TracingReporter`]; tests use [`MemoryReporter`] and assert on the captured events.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::duplicates::DuplicateIssue;
use crate::manifest::DeferredManifestEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Workspace,
    Profile,
    Project,
    Prompt,
    Logo,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Workspace => "workspace",
            EntityKind::Profile => "profile",
            EntityKind::Project => "project",
            EntityKind::Prompt => "prompt",
            EntityKind::Logo => "logo",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// `updatedAt` preceded `createdAt` and was clamped
    TimestampClamped,
    AssetProbeFailed,
    InvalidReference,
    SkippedEntry,
    StoreUpsert,
    /// A local asset could not be read for upload
    AssetUnreadable,
}

impl IssueKind {
    /// Failures mark the entity as not committed; the rest are auto-corrected.
    pub fn is_failure(&self) -> bool {
        matches!(self, IssueKind::StoreUpsert | IssueKind::AssetUnreadable)
    }

    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::TimestampClamped => "TIMESTAMP_CLAMPED",
            IssueKind::AssetProbeFailed => "ASSET_PROBE_FAILED",
            IssueKind::InvalidReference => "INVALID_REFERENCE",
            IssueKind::SkippedEntry => "SKIPPED_ENTRY",
            IssueKind::StoreUpsert => "STORE_UPSERT_FAILED",
            IssueKind::AssetUnreadable => "ASSET_UNREADABLE",
        }
    }
}

/// A per-record problem that is collected instead of unwinding the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordIssue {
    pub entity: EntityKind,
    /// 1-based position of the record in its batch
    pub index: usize,
    pub identifier: String,
    pub kind: IssueKind,
    pub message: String,
    /// Owning record for nested entities, e.g. the workspace of a profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<(EntityKind, usize)>,
}

impl RecordIssue {
    pub fn new(
        entity: EntityKind,
        index: usize,
        identifier: impl Into<String>,
        kind: IssueKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            index,
            identifier: identifier.into(),
            kind,
            message: message.into(),
            parent: None,
        }
    }

    pub fn within(mut self, entity: EntityKind, index: usize) -> Self {
        self.parent = Some((entity, index));
        self
    }
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.entity, self.index)?;
        if let Some((entity, index)) = &self.parent {
            write!(f, " of {} #{}", entity, index)?;
        }
        write!(f, " ({}): {}", self.identifier, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationSummary {
    pub total: usize,
    pub committed: usize,
    pub children_total: usize,
    pub children_committed: usize,
    pub dry_run: bool,
    pub failures: Vec<RecordIssue>,
    pub manifest_path: Option<PathBuf>,
}

impl MigrationSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Info(String),
    Issue(RecordIssue),
    Duplicate(DuplicateIssue),
    Preview {
        entity: EntityKind,
        records: Vec<Value>,
        omitted: usize,
    },
    PendingAssets(Vec<DeferredManifestEntry>),
    ManifestWritten(PathBuf),
    Summary {
        entity: EntityKind,
        summary: MigrationSummary,
    },
}

pub trait Reporter: Send + Sync {
    fn emit(&self, event: ReportEvent);

    fn info(&self, message: &str) {
        self.emit(ReportEvent::Info(message.to_string()));
    }

    fn issue(&self, issue: RecordIssue) {
        self.emit(ReportEvent::Issue(issue));
    }
}

/// Routes events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn emit(&self, event: ReportEvent) {
        match event {
            ReportEvent::Info(message) => info!("{}", message),
            ReportEvent::Issue(issue) if issue.kind.is_failure() => {
                error!(code = issue.kind.code(), "{}", issue)
            }
            ReportEvent::Issue(issue) => warn!(code = issue.kind.code(), "{}", issue),
            ReportEvent::Duplicate(duplicate) => error!("{}", duplicate),
            ReportEvent::Preview {
                entity,
                records,
                omitted,
            } => {
                info!("Dry run preview ({} {} shown)", records.len(), entity);
                for record in &records {
                    let rendered = serde_json::to_string_pretty(record)
                        .unwrap_or_else(|_| record.to_string());
                    info!("{}", rendered);
                }
                if omitted > 0 {
                    info!("... and {} more", omitted);
                }
            }
            ReportEvent::PendingAssets(entries) => {
                if entries.is_empty() {
                    info!("No local assets pending upload");
                } else {
                    warn!("{} local asset(s) pending upload:", entries.len());
                    for entry in &entries {
                        warn!("  {}", entry);
                    }
                }
            }
            ReportEvent::ManifestWritten(path) => {
                info!("Deferred asset manifest written to {}", path.display())
            }
            ReportEvent::Summary { entity, summary } => {
                if summary.has_failures() {
                    error!(
                        "{}/{} {} committed, {} failed",
                        summary.committed,
                        summary.total,
                        entity,
                        summary.failures.len()
                    );
                } else {
                    info!("{}/{} {} committed", summary.committed, summary.total, entity);
                }
            }
        }
    }
}

/// Captures events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn issues(&self) -> Vec<RecordIssue> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Issue(issue) => Some(issue),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reporter_keeps_issue_order() {
        let reporter = MemoryReporter::new();
        reporter.info("starting");
        reporter.emit(ReportEvent::Issue(RecordIssue::new(
            EntityKind::Prompt,
            2,
            "intro",
            IssueKind::TimestampClamped,
            "clamped",
        )));
        reporter.emit(ReportEvent::Issue(RecordIssue::new(
            EntityKind::Workspace,
            1,
            "acme",
            IssueKind::StoreUpsert,
            "boom",
        )));

        let issues = reporter.issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].identifier, "intro");
        assert!(issues[1].kind.is_failure());
        assert_eq!(reporter.events().len(), 3);
    }

    #[test]
    fn issue_display_names_index_and_identifier() {
        let issue = RecordIssue::new(
            EntityKind::Profile,
            3,
            "acme/sales",
            IssueKind::StoreUpsert,
            "duplicate key",
        );
        assert_eq!(issue.to_string(), "profile #3 (acme/sales): duplicate key");
        assert_eq!(issue.kind.code(), "STORE_UPSERT_FAILED");

        let nested = issue.within(EntityKind::Workspace, 2);
        assert_eq!(
            nested.to_string(),
            "profile #3 of workspace #2 (acme/sales): duplicate key"
        );
    }
}
