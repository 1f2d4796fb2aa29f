//! Upsert orchestration against the remote store
//!
//! Each entity moves `normalized -> upserted -> committed` or ends in `failed`. Workspaces
//! add a child step: their profiles are upserted one by one, after the workspace row came
//! back from the store, carrying the id the store assigned. A failing workspace skips its
//! own profiles but never stops its siblings.

use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::normalize::{CanonicalPrompt, NormalizedWorkspace, PdfLogo};
use crate::report::{EntityKind, IssueKind, MigrationSummary, RecordIssue, Reporter};
use crate::store::{
    persisted_id, ConflictTarget, RemoteStore, PDF_LOGOS_TABLE, PROFILES_TABLE, PROMPTS_TABLE,
    WORKSPACES_TABLE,
};

/// `id` when the record carries a resolved identity, `slug` otherwise.
pub fn conflict_target_for(id: Option<&Uuid>) -> ConflictTarget {
    if id.is_some() {
        ConflictTarget::Id
    } else {
        ConflictTarget::Slug
    }
}

/// Profiles without a resolved id are keyed by slug inside their workspace.
pub fn profile_conflict_target(id: Option<&Uuid>) -> ConflictTarget {
    if id.is_some() {
        ConflictTarget::Id
    } else {
        ConflictTarget::WorkspaceSlug
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityState {
    Committed { id: String },
    Failed,
}

pub struct UpsertOrchestrator<'a> {
    store: &'a dyn RemoteStore,
    reporter: &'a dyn Reporter,
}

impl<'a> UpsertOrchestrator<'a> {
    pub fn new(store: &'a dyn RemoteStore, reporter: &'a dyn Reporter) -> Self {
        Self { store, reporter }
    }

    fn fail(&self, summary: &mut MigrationSummary, issue: RecordIssue) -> EntityState {
        self.reporter.issue(issue.clone());
        summary.failures.push(issue);
        EntityState::Failed
    }

    fn store_failure(
        &self,
        entity: EntityKind,
        index: usize,
        identifier: &str,
        err: &StoreError,
        message: String,
    ) -> RecordIssue {
        debug!(code = err.error_code(), "{} {} rejected by store", entity, identifier);
        RecordIssue::new(entity, index, identifier, IssueKind::StoreUpsert, message)
    }

    pub async fn upsert_workspaces(&self, workspaces: &[NormalizedWorkspace]) -> MigrationSummary {
        let mut summary = MigrationSummary {
            total: workspaces.len(),
            children_total: workspaces.iter().map(|w| w.profiles.len()).sum(),
            ..Default::default()
        };
        for (position, normalized) in workspaces.iter().enumerate() {
            let state = self
                .upsert_workspace(position + 1, normalized, &mut summary)
                .await;
            if matches!(state, EntityState::Committed { .. }) {
                summary.committed += 1;
            }
        }
        summary
    }

    async fn upsert_workspace(
        &self,
        index: usize,
        normalized: &NormalizedWorkspace,
        summary: &mut MigrationSummary,
    ) -> EntityState {
        let workspace = &normalized.workspace;
        let conflict = conflict_target_for(workspace.id.as_ref());
        debug!("Workspace {} upserting on {}", workspace.slug, conflict);

        let persisted = self
            .store
            .upsert(WORKSPACES_TABLE, workspace.to_row(), conflict)
            .await
            .and_then(|row| persisted_id(WORKSPACES_TABLE, &row));
        let workspace_id = match persisted {
            Ok(id) => id,
            Err(err) => {
                let skipped = normalized.profiles.len();
                let message = if skipped > 0 {
                    format!("{}; {} profile(s) not attempted", err, skipped)
                } else {
                    err.to_string()
                };
                let issue =
                    self.store_failure(EntityKind::Workspace, index, &workspace.slug, &err, message);
                return self.fail(summary, issue);
            }
        };
        debug!("Workspace {} persisted as {}", workspace.slug, workspace_id);

        let mut children_ok = true;
        for (position, child) in normalized.profiles.iter().enumerate() {
            let profile = &child.profile;
            let identifier = format!("{}/{}", workspace.slug, profile.slug);
            let conflict = profile_conflict_target(profile.id.as_ref());
            let result = self
                .store
                .upsert(PROFILES_TABLE, profile.to_row(&workspace_id), conflict)
                .await
                .and_then(|row| persisted_id(PROFILES_TABLE, &row));
            match result {
                Ok(_) => summary.children_committed += 1,
                Err(err) => {
                    children_ok = false;
                    let issue = self
                        .store_failure(
                            EntityKind::Profile,
                            position + 1,
                            &identifier,
                            &err,
                            err.to_string(),
                        )
                        .within(EntityKind::Workspace, index);
                    self.fail(summary, issue);
                }
            }
        }

        if !children_ok {
            return EntityState::Failed;
        }
        info!(
            "Workspace {} committed with {} profile(s)",
            workspace.slug,
            normalized.profiles.len()
        );
        EntityState::Committed { id: workspace_id }
    }

    pub async fn upsert_prompts(&self, prompts: &[CanonicalPrompt]) -> MigrationSummary {
        let mut summary = MigrationSummary {
            total: prompts.len(),
            ..Default::default()
        };
        for (position, prompt) in prompts.iter().enumerate() {
            // prompts always carry an id: declared UUID, legacy id or slug
            let result = self
                .store
                .upsert(PROMPTS_TABLE, prompt.to_row(), ConflictTarget::Id)
                .await
                .and_then(|row| persisted_id(PROMPTS_TABLE, &row));
            match result {
                Ok(id) => {
                    debug!("Prompt {} committed as {}", prompt.slug, id);
                    summary.committed += 1;
                }
                Err(err) => {
                    let issue = self.store_failure(
                        EntityKind::Prompt,
                        position + 1,
                        &prompt.slug,
                        &err,
                        err.to_string(),
                    );
                    self.fail(&mut summary, issue);
                }
            }
        }
        summary
    }

    /// Uploads each logo's bytes, then upserts its row by slug.
    pub async fn upsert_logos(&self, logos: &[PdfLogo], bucket: &str) -> MigrationSummary {
        let mut summary = MigrationSummary {
            total: logos.len(),
            ..Default::default()
        };
        for (position, logo) in logos.iter().enumerate() {
            let index = position + 1;
            let mut row = logo.to_row();

            if let Some(local) = &logo.asset.local_path {
                let bytes = match tokio::fs::read(local).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let issue = RecordIssue::new(
                            EntityKind::Logo,
                            index,
                            &logo.slug,
                            IssueKind::AssetUnreadable,
                            format!("could not read {}: {}", local.display(), err),
                        );
                        self.fail(&mut summary, issue);
                        continue;
                    }
                };
                match self
                    .store
                    .upload_object(bucket, &logo.storage_path, bytes, &logo.content_type)
                    .await
                {
                    Ok(stored) => row["storage_path"] = serde_json::Value::String(stored),
                    Err(err) => {
                        let issue = self.store_failure(
                            EntityKind::Logo,
                            index,
                            &logo.slug,
                            &err,
                            err.to_string(),
                        );
                        self.fail(&mut summary, issue);
                        continue;
                    }
                }
            }

            let result = self
                .store
                .upsert(PDF_LOGOS_TABLE, row, ConflictTarget::Slug)
                .await
                .and_then(|row| persisted_id(PDF_LOGOS_TABLE, &row));
            match result {
                Ok(_) => summary.committed += 1,
                Err(err) => {
                    let issue = self.store_failure(
                        EntityKind::Logo,
                        index,
                        &logo.slug,
                        &err,
                        err.to_string(),
                    );
                    self.fail(&mut summary, issue);
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::FsProbe;
    use crate::normalize::{normalize_workspace, NormalizeContext};
    use crate::report::MemoryReporter;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn workspaces(raw: serde_json::Value) -> Vec<NormalizedWorkspace> {
        let mut ctx = NormalizeContext::new("/tmp", &FsProbe);
        raw.as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, w)| normalize_workspace(w, i, &mut ctx))
            .collect()
    }

    #[test]
    fn conflict_target_follows_identity() {
        let id = Uuid::parse_str("3f1c2b9a-8d4e-4f7a-9b2c-1d0e5f6a7b8c").unwrap();
        assert_eq!(conflict_target_for(Some(&id)), ConflictTarget::Id);
        assert_eq!(conflict_target_for(None), ConflictTarget::Slug);
        assert_eq!(profile_conflict_target(Some(&id)), ConflictTarget::Id);
        assert_eq!(profile_conflict_target(None), ConflictTarget::WorkspaceSlug);
    }

    #[tokio::test]
    async fn failed_workspace_skips_children_but_not_siblings() {
        let store = InMemoryStore::new().reject_slug("workspaces", "broken", "rejected");
        let reporter = MemoryReporter::new();
        let batch = workspaces(json!([
            {"slug": "broken", "profiles": [{"slug": "a"}]},
            {"slug": "healthy", "profiles": [{"slug": "b"}, {"slug": "c"}]}
        ]));

        let summary = UpsertOrchestrator::new(&store, &reporter)
            .upsert_workspaces(&batch)
            .await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.children_total, 3);
        assert_eq!(summary.children_committed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].message.contains("1 profile(s) not attempted"));

        let profile_calls: Vec<_> = store
            .upserts()
            .into_iter()
            .filter(|call| call.table == PROFILES_TABLE)
            .collect();
        assert_eq!(profile_calls.len(), 2);
    }

    #[tokio::test]
    async fn failed_profile_marks_workspace_failed() {
        let store = InMemoryStore::new().reject_slug("profiles", "bad", "nope");
        let reporter = MemoryReporter::new();
        let batch = workspaces(json!([{"slug": "acme", "profiles": [{"slug": "bad"}, {"slug": "ok"}]}]));

        let summary = UpsertOrchestrator::new(&store, &reporter)
            .upsert_workspaces(&batch)
            .await;
        assert_eq!(summary.committed, 0);
        assert_eq!(summary.children_committed, 1);
        assert_eq!(summary.failures[0].identifier, "acme/bad");
        assert_eq!(summary.failures[0].parent, Some((EntityKind::Workspace, 1)));
        assert!(summary.failures[0]
            .to_string()
            .starts_with("profile #1 of workspace #1 (acme/bad)"));
        assert_eq!(reporter.issues().len(), 1);
    }

    #[tokio::test]
    async fn slug_upsert_omits_id() {
        let store = InMemoryStore::new();
        let reporter = MemoryReporter::new();
        let batch = workspaces(json!([{"slug": "acme"}]));
        UpsertOrchestrator::new(&store, &reporter)
            .upsert_workspaces(&batch)
            .await;
        let calls = store.upserts();
        assert_eq!(calls[0].conflict, ConflictTarget::Slug);
        assert!(calls[0].row.get("id").is_none());
    }
}
