//! Workspace flow integration tests
//!
//! Runs the full load -> normalize -> upsert pipeline against the in-memory store

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use cloud_migrate::assets::FsProbe;
use cloud_migrate::config::MigratorConfig;
use cloud_migrate::errors::MigrationError;
use cloud_migrate::manifest::DeferredManifestEntry;
use cloud_migrate::migrate::{migrate_workspaces, RunContext};
use cloud_migrate::report::{MemoryReporter, ReportEvent};
use cloud_migrate::store::{ConflictTarget, InMemoryStore, RemoteStore};
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_input(dir: &Path, document: &Value) -> Result<PathBuf> {
    let path = dir.join("workspaces.json");
    std::fs::write(&path, serde_json::to_string_pretty(document)?)?;
    Ok(path)
}

fn config_for(dir: &TempDir) -> MigratorConfig {
    let mut config = MigratorConfig::default();
    config.manifest_dir = dir.path().join("manifests");
    config
}

fn run_context<'a>(
    config: &'a MigratorConfig,
    store: Option<&'a dyn RemoteStore>,
    reporter: &'a MemoryReporter,
    dry_run: bool,
) -> RunContext<'a> {
    RunContext {
        config,
        store,
        reporter,
        probe: &FsProbe,
        dry_run,
        now: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
    }
}

#[tokio::test]
async fn profiles_link_to_store_assigned_workspace_id() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(
        dir.path(),
        &json!({
            "updatedAt": "2024-03-01T00:00:00Z",
            "workspaces": [
                {"name": "Acme Corp", "profiles": [{"label": "Sales"}, {"label": "Support"}]},
                {"name": "Globex", "profiles": []}
            ]
        }),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();

    let summary =
        migrate_workspaces(&input, &run_context(&config, Some(&store), &reporter, false)).await?;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.children_committed, 2);
    assert!(!summary.has_failures());
    assert!(summary.manifest_path.is_none());

    let workspaces = store.rows("workspaces");
    let acme = workspaces
        .iter()
        .find(|row| row["slug"] == json!("acme_corp"))
        .expect("acme persisted");
    let profiles = store.rows("profiles");
    assert_eq!(profiles.len(), 2);
    for profile in &profiles {
        assert_eq!(profile["workspace_id"], acme["id"]);
    }
    Ok(())
}

#[tokio::test]
async fn same_profile_slug_in_two_workspaces_stays_separate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(
        dir.path(),
        &json!([
            {"slug": "acme", "profiles": [{"slug": "sales", "label": "Acme Sales"}]},
            {"slug": "globex", "profiles": [{"slug": "sales", "label": "Globex Sales"}]}
        ]),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();
    let run = run_context(&config, Some(&store), &reporter, false);

    let summary = migrate_workspaces(&input, &run).await?;
    assert_eq!(summary.children_committed, 2);
    // a second pass must update both rows, not merge them
    migrate_workspaces(&input, &run).await?;

    let workspaces = store.rows("workspaces");
    let profiles = store.rows("profiles");
    assert_eq!(profiles.len(), 2);
    for (workspace, label) in [("acme", "Acme Sales"), ("globex", "Globex Sales")] {
        let owner = workspaces
            .iter()
            .find(|row| row["slug"] == json!(workspace))
            .expect("workspace persisted");
        let profile = profiles
            .iter()
            .find(|row| row["label"] == json!(label))
            .expect("profile persisted");
        assert_eq!(profile["workspace_id"], owner["id"]);
    }
    assert!(store
        .upserts()
        .iter()
        .filter(|call| call.table == "profiles")
        .all(|call| call.conflict == ConflictTarget::WorkspaceSlug));
    Ok(())
}

#[tokio::test]
async fn rerun_updates_rows_in_place() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(
        dir.path(),
        &json!([{"slug": "acme", "name": "Acme", "profiles": [{"slug": "sales"}]}]),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();
    let run = run_context(&config, Some(&store), &reporter, false);

    migrate_workspaces(&input, &run).await?;
    migrate_workspaces(&input, &run).await?;

    assert_eq!(store.rows("workspaces").len(), 1);
    assert_eq!(store.rows("profiles").len(), 1);
    Ok(())
}

#[tokio::test]
async fn dry_run_makes_no_store_calls_and_lists_pending_assets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("acme.png"), b"png")?;
    let input = write_input(
        dir.path(),
        &json!([
            {"slug": "acme", "logoPath": "acme.png"},
            {"slug": "b"}, {"slug": "c"}, {"slug": "d"}
        ]),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();

    let summary =
        migrate_workspaces(&input, &run_context(&config, Some(&store), &reporter, true)).await?;
    assert!(summary.dry_run);
    assert_eq!(summary.total, 4);
    assert_eq!(store.call_count(), 0);
    assert!(!config.manifest_dir.exists());

    let events = reporter.events();
    assert!(matches!(&events[0], ReportEvent::Info(message) if message.starts_with("Normalizing 4 workspace(s)")));
    let preview = events.iter().find_map(|event| match event {
        ReportEvent::Preview {
            records, omitted, ..
        } => Some((records.len(), *omitted)),
        _ => None,
    });
    assert_eq!(preview, Some((3, 1)));

    let pending: Vec<DeferredManifestEntry> = events
        .iter()
        .find_map(|event| match event {
            ReportEvent::PendingAssets(entries) => Some(entries.clone()),
            _ => None,
        })
        .unwrap_or_default();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].workspace_slug, "acme");
    assert_eq!(pending[0].local_path, dir.path().join("acme.png"));
    Ok(())
}

#[tokio::test]
async fn real_run_writes_deferred_manifest() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("sales.png"), b"png")?;
    let input = write_input(
        dir.path(),
        &json!([{"slug": "acme", "profiles": [{"slug": "sales", "pdfLogo": "sales.png"}]}]),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();

    let summary =
        migrate_workspaces(&input, &run_context(&config, Some(&store), &reporter, false)).await?;
    let manifest = summary.manifest_path.expect("manifest written");
    assert_eq!(
        manifest,
        config.manifest_dir.join("deferred-assets-20240506-070809.json")
    );

    let entries: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&manifest)?)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["type"], json!("profile"));
    assert_eq!(entries[0]["workspaceSlug"], json!("acme"));
    assert_eq!(entries[0]["profileSlug"], json!("sales"));
    Ok(())
}

#[tokio::test]
async fn duplicate_slugs_abort_before_any_write() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(
        dir.path(),
        &json!([{"slug": "acme"}, {"slug": "other"}, {"name": "Acme"}]),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();

    let err = migrate_workspaces(&input, &run_context(&config, Some(&store), &reporter, false))
        .await
        .unwrap_err();
    match err {
        MigrationError::Duplicates(issues) => {
            assert_eq!(issues.len(), 1);
            assert_eq!((issues[0].first_index, issues[0].duplicate_index), (1, 3));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn one_failing_workspace_does_not_stop_the_batch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(
        dir.path(),
        &json!([
            {"slug": "first", "profiles": [{"slug": "a"}]},
            {"slug": "broken", "profiles": [{"slug": "b"}]},
            {"slug": "last"}
        ]),
    )?;
    let config = config_for(&dir);
    let store = InMemoryStore::new().reject_slug("workspaces", "broken", "constraint violated");
    let reporter = MemoryReporter::new();

    let summary =
        migrate_workspaces(&input, &run_context(&config, Some(&store), &reporter, false)).await?;
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].index, 2);
    assert_eq!(summary.failures[0].identifier, "broken");
    assert!(summary.failures[0].message.contains("constraint violated"));

    let slugs: Vec<Value> = store
        .rows("workspaces")
        .into_iter()
        .map(|row| row["slug"].clone())
        .collect();
    assert_eq!(slugs, vec![json!("first"), json!("last")]);
    assert_eq!(store.rows("profiles").len(), 1);
    Ok(())
}

#[tokio::test]
async fn real_run_without_store_is_a_config_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(dir.path(), &json!([{"slug": "acme"}]))?;
    let config = config_for(&dir);
    let reporter = MemoryReporter::new();

    let err = migrate_workspaces(&input, &run_context(&config, None, &reporter, false))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    Ok(())
}
