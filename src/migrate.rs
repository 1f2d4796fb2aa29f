//! End-to-end migration flows
//!
//! Every flow runs the same pipeline: load, normalize, detect duplicates, then either preview
//! (dry run, no store calls) or upsert and write the deferred manifest.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::assets::PathProbe;
use crate::config::MigratorConfig;
use crate::discovery::LogoDiscovery;
use crate::duplicates::{DuplicateDetector, IdentityKeys};
use crate::errors::{MigrationError, MigrationResult};
use crate::input::{load_dataset, DatasetKind};
use crate::manifest::{collect_deferred, write_manifest};
use crate::normalize::{
    normalize_logo, normalize_prompt, normalize_workspace, CanonicalPrompt, NormalizeContext,
    NormalizedWorkspace, PdfLogo,
};
use crate::orchestrator::UpsertOrchestrator;
use crate::report::{EntityKind, MigrationSummary, ReportEvent, Reporter};
use crate::store::RemoteStore;

/// Number of payloads shown in a dry-run preview.
pub const PREVIEW_LIMIT: usize = 3;

/// Everything a flow needs besides its input.
pub struct RunContext<'a> {
    pub config: &'a MigratorConfig,
    /// `None` for dry runs; a real run without a store is a configuration error.
    pub store: Option<&'a dyn RemoteStore>,
    pub reporter: &'a dyn Reporter,
    pub probe: &'a dyn PathProbe,
    pub dry_run: bool,
    pub now: DateTime<Utc>,
}

impl<'a> RunContext<'a> {
    fn normalize_context(&self, base_dir: &Path, updated_at: Option<&Value>) -> NormalizeContext<'a> {
        NormalizeContext::new(base_dir, self.probe)
            .with_now(self.now)
            .with_dataset_updated_at(updated_at)
            .with_storage_prefixes(self.config.storage_prefixes.clone())
    }

    fn store(&self) -> MigrationResult<&'a dyn RemoteStore> {
        self.store
            .ok_or_else(|| MigrationError::Config("no remote store configured".to_string()))
    }

    fn emit_issues(&self, ctx: &mut NormalizeContext<'_>) {
        for issue in ctx.take_issues() {
            self.reporter.issue(issue);
        }
    }

    fn preview(&self, entity: EntityKind, records: Vec<Value>) {
        let omitted = records.len().saturating_sub(PREVIEW_LIMIT);
        let records = records.into_iter().take(PREVIEW_LIMIT).collect();
        self.reporter.emit(ReportEvent::Preview {
            entity,
            records,
            omitted,
        });
    }

    fn finish(&self, entity: EntityKind, summary: MigrationSummary) -> MigrationSummary {
        self.reporter.emit(ReportEvent::Summary {
            entity,
            summary: summary.clone(),
        });
        summary
    }
}

fn abort_on_duplicates(
    detector: DuplicateDetector,
    reporter: &dyn Reporter,
) -> MigrationResult<()> {
    if detector.is_clean() {
        return Ok(());
    }
    let issues = detector.into_issues();
    for issue in &issues {
        reporter.emit(ReportEvent::Duplicate(issue.clone()));
    }
    Err(MigrationError::Duplicates(issues))
}

/// Workspaces by id and slug, then profiles and projects inside each workspace.
pub fn check_workspace_duplicates(workspaces: &[NormalizedWorkspace]) -> DuplicateDetector {
    let mut detector = DuplicateDetector::new();
    let ids: Vec<Option<String>> = workspaces
        .iter()
        .map(|w| w.workspace.id.map(|id| id.to_string()))
        .collect();
    detector.check(
        "workspaces",
        workspaces
            .iter()
            .zip(&ids)
            .map(|(w, id)| IdentityKeys::new(id.as_deref(), Some(w.workspace.slug.as_str()))),
    );

    for normalized in workspaces {
        let slug = &normalized.workspace.slug;
        let profile_ids: Vec<Option<String>> = normalized
            .profiles
            .iter()
            .map(|p| p.profile.id.map(|id| id.to_string()))
            .collect();
        detector.check(
            &format!("profiles of {}", slug),
            normalized
                .profiles
                .iter()
                .zip(&profile_ids)
                .map(|(p, id)| IdentityKeys::new(id.as_deref(), Some(p.profile.slug.as_str()))),
        );
        detector.check(
            &format!("projects of {}", slug),
            normalized
                .workspace
                .projects
                .iter()
                .map(|project| IdentityKeys::new(Some(project.id.as_str()), None)),
        );
    }
    detector
}

pub fn check_prompt_duplicates(prompts: &[CanonicalPrompt]) -> DuplicateDetector {
    let mut detector = DuplicateDetector::new();
    detector.check(
        "prompts",
        prompts
            .iter()
            .map(|p| IdentityKeys::new(Some(p.id.as_str()), Some(p.slug.as_str()))),
    );
    detector
}

/// Logos by slug and by storage path.
pub fn check_logo_duplicates(logos: &[PdfLogo]) -> DuplicateDetector {
    let mut detector = DuplicateDetector::new();
    detector.check(
        "logos",
        logos.iter().map(|logo| {
            IdentityKeys::new(None, Some(logo.slug.as_str()))
                .with_storage_path(logo.storage_path.as_str())
        }),
    );
    detector
}

pub async fn migrate_workspaces(
    path: &Path,
    run: &RunContext<'_>,
) -> MigrationResult<MigrationSummary> {
    let dataset = load_dataset(path, DatasetKind::Workspaces).await?;
    run.reporter.info(&format!(
        "Normalizing {} workspace(s) from {}",
        dataset.records.len(),
        path.display()
    ));
    let mut ctx = run.normalize_context(&dataset.base_dir, dataset.updated_at.as_ref());
    let workspaces: Vec<NormalizedWorkspace> = dataset
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_workspace(record, index, &mut ctx))
        .collect();
    run.emit_issues(&mut ctx);

    abort_on_duplicates(check_workspace_duplicates(&workspaces), run.reporter)?;
    let pending = collect_deferred(&workspaces);

    if run.dry_run {
        run.preview(
            EntityKind::Workspace,
            workspaces.iter().map(NormalizedWorkspace::preview).collect(),
        );
        run.reporter.emit(ReportEvent::PendingAssets(pending));
        let summary = MigrationSummary {
            total: workspaces.len(),
            children_total: workspaces.iter().map(|w| w.profiles.len()).sum(),
            dry_run: true,
            ..Default::default()
        };
        return Ok(run.finish(EntityKind::Workspace, summary));
    }

    let store = run.store()?;
    let mut summary = UpsertOrchestrator::new(store, run.reporter)
        .upsert_workspaces(&workspaces)
        .await;
    if let Some(manifest) = write_manifest(&pending, &run.config.manifest_dir, run.now)? {
        run.reporter
            .emit(ReportEvent::ManifestWritten(manifest.clone()));
        summary.manifest_path = Some(manifest);
    }
    Ok(run.finish(EntityKind::Workspace, summary))
}

pub async fn migrate_prompts(
    path: &Path,
    run: &RunContext<'_>,
) -> MigrationResult<MigrationSummary> {
    let dataset = load_dataset(path, DatasetKind::Prompts).await?;
    run.reporter.info(&format!(
        "Normalizing {} prompt(s) from {}",
        dataset.records.len(),
        path.display()
    ));
    let mut ctx = run.normalize_context(&dataset.base_dir, dataset.updated_at.as_ref());
    let mut prompts = Vec::with_capacity(dataset.records.len());
    for (index, record) in dataset.records.iter().enumerate() {
        match normalize_prompt(record, index, &mut ctx) {
            Ok(prompt) => prompts.push(prompt),
            Err(err) => {
                run.emit_issues(&mut ctx);
                return Err(err);
            }
        }
    }
    run.emit_issues(&mut ctx);

    abort_on_duplicates(check_prompt_duplicates(&prompts), run.reporter)?;

    if run.dry_run {
        run.preview(
            EntityKind::Prompt,
            prompts.iter().map(CanonicalPrompt::to_row).collect(),
        );
        let summary = MigrationSummary {
            total: prompts.len(),
            dry_run: true,
            ..Default::default()
        };
        return Ok(run.finish(EntityKind::Prompt, summary));
    }

    let store = run.store()?;
    let summary = UpsertOrchestrator::new(store, run.reporter)
        .upsert_prompts(&prompts)
        .await;
    Ok(run.finish(EntityKind::Prompt, summary))
}

pub async fn migrate_logos(
    dir: &Path,
    run: &RunContext<'_>,
) -> MigrationResult<MigrationSummary> {
    let discovery = LogoDiscovery::new(dir);
    let files = discovery
        .walk()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| MigrationError::Input {
            path: dir.to_path_buf(),
            source,
        })?;
    run.reporter.info(&format!(
        "Discovered {} logo file(s) under {}",
        files.len(),
        dir.display()
    ));

    let mut ctx = run.normalize_context(dir, None);
    let logos: Vec<PdfLogo> = files
        .iter()
        .enumerate()
        .map(|(index, file)| normalize_logo(file, index, &mut ctx))
        .collect();
    run.emit_issues(&mut ctx);

    abort_on_duplicates(check_logo_duplicates(&logos), run.reporter)?;

    if run.dry_run {
        run.preview(EntityKind::Logo, logos.iter().map(PdfLogo::to_row).collect());
        let summary = MigrationSummary {
            total: logos.len(),
            dry_run: true,
            ..Default::default()
        };
        return Ok(run.finish(EntityKind::Logo, summary));
    }

    let store = run.store()?;
    debug!("Uploading logos into bucket {}", run.config.logo_bucket);
    let summary = UpsertOrchestrator::new(store, run.reporter)
        .upsert_logos(&logos, &run.config.logo_bucket)
        .await;
    Ok(run.finish(EntityKind::Logo, summary))
}
