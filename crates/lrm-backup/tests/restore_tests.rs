//! Diff and restore integration tests.
//!
//! Walks resource files through edit, backup, compare, and rollback cycles.

use lrm_backup::{
    BackupConfig, ChangeType, CodecRegistry, DiffEngine, DiffResult, ResourceCodec,
    RestoreService, VersionManager, PRE_RESTORE_OPERATION,
};
use lrm_test_utils::assertions::assert_file_equals;
use lrm_test_utils::fixtures::{content, BuiltTestProject, TestProject};
use lrm_test_utils::init_test_logging;

const FILE: &str = "locales/en.json";
const NAME: &str = "en.json";

fn services() -> (VersionManager, DiffEngine, RestoreService) {
    let manager = VersionManager::new(BackupConfig::default(), CodecRegistry::with_defaults())
        .expect("valid config");
    (
        manager.clone(),
        DiffEngine::new(manager.clone()),
        RestoreService::new(manager),
    )
}

fn kinds(result: &DiffResult) -> Vec<(String, ChangeType)> {
    result
        .changes
        .iter()
        .map(|c| (c.key.clone(), c.change_type))
        .collect()
}

async fn backup(manager: &VersionManager, project: &BuiltTestProject, operation: &str) -> u32 {
    manager
        .create_backup(&project.file_path(FILE), operation, project.path())
        .await
        .expect("create backup")
        .version
}

/// Backup, edit, backup, compare, and roll back to the first version.
#[tokio::test]
async fn test_end_to_end_backup_compare_restore() {
    init_test_logging();
    let project = TestProject::new().with_resource(FILE, content::EN_V1).build();
    let original = project.read_file(FILE);
    let (manager, diff, restore) = services();

    assert_eq!(backup(&manager, &project, "initial").await, 1);
    project.write_resource(FILE, content::EN_V2);
    assert_eq!(backup(&manager, &project, "edit").await, 2);

    let changes = diff
        .compare_versions(NAME, 1, 2, project.path(), false)
        .await
        .expect("compare versions");
    assert_eq!(
        kinds(&changes),
        vec![
            ("Key1".to_string(), ChangeType::Modified),
            ("Key3".to_string(), ChangeType::Deleted),
            ("Key4".to_string(), ChangeType::Added),
        ]
    );
    let key1 = changes.get("Key1").expect("Key1 change");
    assert_eq!(key1.old_value.as_deref(), Some("Hello"));
    assert_eq!(key1.new_value.as_deref(), Some("Hello there"));

    let with_unchanged = diff
        .compare_versions(NAME, 1, 2, project.path(), true)
        .await
        .expect("compare versions");
    assert_eq!(with_unchanged.summary().unchanged, 1);
    assert_eq!(
        with_unchanged.get("Key2").map(|c| c.change_type),
        Some(ChangeType::Unchanged)
    );

    restore
        .restore(NAME, 1, &project.file_path(FILE), project.path(), true)
        .await
        .expect("restore");
    assert_file_equals(&project.file_path(FILE), &original);

    let restored = CodecRegistry::with_defaults()
        .extract(&project.read_file(FILE), &lrm_backup::FormatHint::new("json"))
        .expect("extract restored file");
    assert_eq!(restored.value("Key1"), Some("Hello"));
    assert_eq!(restored.value("Key3"), Some("Goodbye"));
    assert!(!restored.contains_key("Key4"));
}

/// A safeguarded restore leaves a "pre-restore" backup of what was replaced.
#[tokio::test]
async fn test_restore_creates_pre_restore_backup() {
    let project = TestProject::new().with_resource(FILE, content::EN_V1).build();
    let (manager, _, restore) = services();

    backup(&manager, &project, "initial").await;
    project.write_resource(FILE, content::EN_V2);
    let edited = project.read_file(FILE);

    let outcome = restore
        .restore(NAME, 1, &project.file_path(FILE), project.path(), true)
        .await
        .expect("restore");

    let safeguard = outcome.pre_restore_backup.expect("pre-restore backup");
    assert_eq!(safeguard.operation, PRE_RESTORE_OPERATION);

    let latest = manager
        .latest_backup(NAME, project.path())
        .await
        .expect("latest backup")
        .expect("some backup");
    assert_eq!(latest.version, safeguard.version);
    assert_eq!(latest.operation, "pre-restore");

    let saved = manager
        .read_backup(NAME, latest.version, project.path())
        .await
        .expect("read pre-restore backup");
    assert_eq!(saved, edited.as_bytes());
}

/// Selective restore touches only the named keys.
#[tokio::test]
async fn test_restore_keys_leaves_other_keys_alone() {
    let project = TestProject::new()
        .with_resource(
            FILE,
            &[("K1", "one"), ("K2", "two"), ("K3", "three")],
        )
        .build();
    let (manager, _, restore) = services();
    backup(&manager, &project, "initial").await;

    project.write_resource(
        FILE,
        &[("K1", "uno"), ("K2", "dos"), ("K3", "tres"), ("K5", "cinco")],
    );

    let outcome = restore
        .restore_keys(
            NAME,
            1,
            &["K1", "K2"],
            &project.file_path(FILE),
            project.path(),
            true,
        )
        .await
        .expect("restore keys");
    assert_eq!(outcome.restored_keys, vec!["K1", "K2"]);

    let entries = lrm_backup::JsonCodec
        .extract_entries(&project.read_file(FILE))
        .expect("extract merged file");
    assert_eq!(entries.value("K1"), Some("one"));
    assert_eq!(entries.value("K2"), Some("two"));
    assert_eq!(entries.value("K3"), Some("tres"));
    assert_eq!(entries.value("K5"), Some("cinco"));
    assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["K1", "K2", "K3", "K5"]);
}

/// Selective restore re-inserts a key that was deleted since the backup.
#[tokio::test]
async fn test_restore_keys_reinserts_deleted_key() {
    let project = TestProject::new().with_resource(FILE, content::EN_V1).build();
    let (manager, _, restore) = services();
    backup(&manager, &project, "initial").await;
    project.write_resource(FILE, content::EN_V2);

    let outcome = restore
        .restore_keys(
            NAME,
            1,
            &["Key3", "Missing"],
            &project.file_path(FILE),
            project.path(),
            false,
        )
        .await
        .expect("restore keys");
    assert_eq!(outcome.restored_keys, vec!["Key3"]);
    assert_eq!(outcome.skipped_keys, vec!["Missing"]);
    assert!(outcome.pre_restore_backup.is_none());

    let entries = lrm_backup::JsonCodec
        .extract_entries(&project.read_file(FILE))
        .expect("extract merged file");
    assert_eq!(entries.value("Key3"), Some("Goodbye"));
    assert_eq!(entries.value("Key1"), Some("Hello there"));
    assert!(!entries.contains_key("Missing"));
}

/// Preview matches comparing the live file (old) against the backup (new).
#[tokio::test]
async fn test_preview_restore_matches_compare_and_mutates_nothing() {
    let project = TestProject::new().with_resource(FILE, content::EN_V1).build();
    let (manager, diff, restore) = services();
    backup(&manager, &project, "initial").await;
    project.write_resource(FILE, content::EN_V2);
    let live_before = project.read_file(FILE);
    let manifest_before = project.read_file(".lrm/backups/en.json/manifest.json");

    let preview = restore
        .preview_restore(NAME, 1, &project.file_path(FILE), project.path())
        .await
        .expect("preview restore");

    let snapshot = String::from_utf8(
        manager
            .read_backup(NAME, 1, project.path())
            .await
            .expect("read backup"),
    )
    .expect("utf-8 snapshot");
    let expected = diff
        .compare(&live_before, &snapshot, &lrm_backup::FormatHint::new("json"), false)
        .expect("compare");
    assert_eq!(preview, expected);
    assert_eq!(
        kinds(&preview),
        vec![
            ("Key1".to_string(), ChangeType::Modified),
            ("Key3".to_string(), ChangeType::Added),
            ("Key4".to_string(), ChangeType::Deleted),
        ]
    );

    assert_file_equals(&project.file_path(FILE), &live_before);
    assert_eq!(
        project.read_file(".lrm/backups/en.json/manifest.json"),
        manifest_before
    );
}

/// Comparing with the live file always reflects its current content.
#[tokio::test]
async fn test_compare_with_current_is_fresh() {
    let project = TestProject::new().with_resource(FILE, content::EN_V1).build();
    let (manager, diff, _) = services();
    backup(&manager, &project, "initial").await;

    let live = project.file_path(FILE);
    let unchanged = diff
        .compare_with_current(NAME, 1, &live, project.path(), false)
        .await
        .expect("compare with current");
    assert!(!unchanged.has_changes());

    project.write_resource(FILE, content::EN_V2);
    let changed = diff
        .compare_with_current(NAME, 1, &live, project.path(), false)
        .await
        .expect("compare with current");
    assert_eq!(changed.summary().added, 1);
    assert_eq!(changed.summary().deleted, 1);
    assert_eq!(changed.summary().modified, 1);

    let text = diff
        .unified_diff_with_current(NAME, 1, &live, project.path())
        .await
        .expect("unified diff");
    assert!(text.contains("-  \"Key3\": \"Goodbye\""));
    assert!(text.contains("+  \"Key4\": \"New entry\""));
}
