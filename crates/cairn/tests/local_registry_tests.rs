//! Integration tests for the registry as the CLI opens it
//!
//! Uses a local directory source so the whole install and update flow runs
//! without network access.

use cairn_core::types::{InstallOptions, InstallScope, Source, SourceType};
use cairn_core::SettingsLoader;
use cairn_registry::{BundleQuery, MigrationRunner, RegistryManager, RegistryStorage};
use camino::Utf8PathBuf;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_bundle(root: &Path, id: &str, version: &str) {
    let dir = root.join(id);
    fs::create_dir_all(dir.join("prompts")).unwrap();
    fs::write(
        dir.join("deployment-manifest.yml"),
        format!(
            "id: {id}\nversion: {version}\nname: {id}\ntags: [prompts]\nitems:\n  - path: prompts/review.md\n    kind: prompt\n"
        ),
    )
    .unwrap();
    fs::write(dir.join("prompts/review.md"), format!("review {version}")).unwrap();
}

/// Registry home and a bundle directory, both temporary
fn open(home: &TempDir) -> RegistryManager {
    let dir = Utf8PathBuf::from_path_buf(home.path().to_path_buf()).unwrap();
    let settings = SettingsLoader::with_dir(dir).load().unwrap();
    RegistryManager::from_settings(RegistryStorage::new(home.path()), settings).unwrap()
}

#[tokio::test]
async fn test_local_source_install_and_update() {
    let home = TempDir::new().unwrap();
    let bundles = TempDir::new().unwrap();
    write_bundle(bundles.path(), "code-review", "1.0.0");
    write_bundle(bundles.path(), "release-notes", "0.3.0");

    let manager = open(&home);
    let source = manager
        .add_source(Source::new(
            "Team",
            SourceType::Local,
            bundles.path().display().to_string(),
        ))
        .unwrap();

    let found = manager
        .search_bundles(&BundleQuery::text("review"))
        .await
        .unwrap();
    let ids: Vec<_> = found.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["code-review"]);

    let record = manager
        .install_bundle(&source.id, "code-review", &InstallOptions::new(InstallScope::User))
        .await
        .unwrap();
    assert_eq!(record.version, "1.0.0");
    assert!(record.install_path.starts_with(home.path()));
    assert_eq!(
        fs::read_to_string(record.install_path.join("prompts/review.md")).unwrap(),
        "review 1.0.0"
    );

    write_bundle(bundles.path(), "code-review", "1.1.0");
    let report = manager.sync_source(&source.id).await.unwrap();
    assert_eq!(report.bundle_count, 2);
    // Local sources never update installed bundles on sync
    assert!(report.updated.is_empty());

    let updates = manager.check_updates().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].latest_version, "1.1.0");

    let updated = manager
        .update_bundle("code-review", InstallScope::User)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.version, "1.1.0");
    assert_eq!(
        fs::read_to_string(updated.install_path.join("prompts/review.md")).unwrap(),
        "review 1.1.0"
    );

    let listed = manager.list_installed(None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].version, "1.1.0");
}

#[tokio::test]
async fn test_sources_persist_across_reopen() {
    let home = TempDir::new().unwrap();
    let bundles = TempDir::new().unwrap();
    write_bundle(bundles.path(), "code-review", "1.0.0");

    let source_id = {
        let manager = open(&home);
        let source = manager
            .add_source(
                Source::new("Team", SourceType::Local, bundles.path().display().to_string())
                    .with_priority(90),
            )
            .unwrap();
        manager.set_source_enabled(&source.id, false).unwrap();
        source.id
    };

    let manager = open(&home);
    let sources = manager.list_sources().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].id, source_id);
    assert_eq!(sources[0].priority, 90);
    assert!(!sources[0].enabled);

    // Disabled sources are left out of search
    let found = manager.search_bundles(&BundleQuery::default()).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_fresh_home_runs_migrations_once() {
    let home = TempDir::new().unwrap();
    let storage = RegistryStorage::new(home.path());
    let runner = MigrationRunner::standard();

    let first = runner.run(&storage).await.unwrap();
    assert!(first.iter().all(|r| r.outcome.is_some()));
    assert!(runner.pending(&storage).unwrap().is_empty());

    let second = runner.run(&storage).await.unwrap();
    assert!(second.iter().all(|r| r.outcome.is_none()));
}
