//! Logo flow integration tests

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use cloud_migrate::assets::FsProbe;
use cloud_migrate::config::MigratorConfig;
use cloud_migrate::duplicates::DuplicateField;
use cloud_migrate::errors::MigrationError;
use cloud_migrate::migrate::{migrate_logos, RunContext};
use cloud_migrate::report::{IssueKind, MemoryReporter};
use cloud_migrate::store::{ConflictTarget, InMemoryStore};
use serde_json::json;

fn touch(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(path.parent().expect("parent"))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[tokio::test]
async fn logos_are_uploaded_then_upserted_by_slug() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(&dir.path().join("Default.png"), b"default")?;
    touch(&dir.path().join("Acme/Header Logo.SVG"), b"<svg/>")?;
    touch(&dir.path().join("notes.txt"), b"ignored")?;

    let config = MigratorConfig::default();
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();
    let run = RunContext {
        config: &config,
        store: Some(&store),
        reporter: &reporter,
        probe: &FsProbe,
        dry_run: false,
        now: Utc::now(),
    };

    let summary = migrate_logos(dir.path(), &run).await?;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.committed, 2);

    let mut uploaded: Vec<String> = store.uploads().into_iter().map(|call| call.path).collect();
    uploaded.sort();
    assert_eq!(uploaded, vec!["acme/header_logo.svg", "shared/default.png"]);
    assert!(store
        .uploads()
        .iter()
        .all(|call| call.bucket == "pdf-logos"));

    let calls = store.upserts();
    assert!(calls.iter().all(|call| call.conflict == ConflictTarget::Slug));
    let rows = store.rows("pdf_logos");
    let acme = rows
        .iter()
        .find(|row| row["slug"] == json!("acme-header_logo"))
        .expect("acme logo row");
    assert_eq!(acme["workspace_slug"], json!("acme"));
    assert_eq!(acme["content_type"], json!("image/svg+xml"));
    Ok(())
}

#[tokio::test]
async fn failed_upload_skips_only_that_logo() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(&dir.path().join("a.png"), b"a")?;
    touch(&dir.path().join("b.png"), b"b")?;

    let config = MigratorConfig::default();
    let store = InMemoryStore::new().reject_upload("shared/a.png", "bucket full");
    let reporter = MemoryReporter::new();
    let run = RunContext {
        config: &config,
        store: Some(&store),
        reporter: &reporter,
        probe: &FsProbe,
        dry_run: false,
        now: Utc::now(),
    };

    let summary = migrate_logos(dir.path(), &run).await?;
    assert_eq!(summary.committed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].identifier, "a");
    assert_eq!(summary.failures[0].kind, IssueKind::StoreUpsert);
    assert_eq!(store.rows("pdf_logos").len(), 1);
    Ok(())
}

#[tokio::test]
async fn colliding_storage_paths_abort_before_upload() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(&dir.path().join("x.png"), b"root")?;
    touch(&dir.path().join("shared/x.png"), b"shared folder")?;

    let config = MigratorConfig::default();
    let store = InMemoryStore::new();
    let reporter = MemoryReporter::new();
    let run = RunContext {
        config: &config,
        store: Some(&store),
        reporter: &reporter,
        probe: &FsProbe,
        dry_run: false,
        now: Utc::now(),
    };

    let err = migrate_logos(dir.path(), &run).await.unwrap_err();
    match err {
        MigrationError::Duplicates(issues) => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].field, DuplicateField::StoragePath);
            assert_eq!(issues[0].value, "shared/x.png");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn dry_run_discovers_without_uploading() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(&dir.path().join("brand/mark.webp"), b"webp")?;

    let config = MigratorConfig::default();
    let reporter = MemoryReporter::new();
    let run = RunContext {
        config: &config,
        store: None,
        reporter: &reporter,
        probe: &FsProbe,
        dry_run: true,
        now: Utc::now(),
    };

    let summary = migrate_logos(dir.path(), &run).await?;
    assert!(summary.dry_run);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.committed, 0);
    Ok(())
}

#[tokio::test]
async fn missing_directory_is_an_input_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = MigratorConfig::default();
    let reporter = MemoryReporter::new();
    let run = RunContext {
        config: &config,
        store: None,
        reporter: &reporter,
        probe: &FsProbe,
        dry_run: true,
        now: Utc::now(),
    };

    let err = migrate_logos(&dir.path().join("missing"), &run)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INPUT_UNREADABLE");
    Ok(())
}
