#![allow(clippy::unwrap_used, clippy::expect_used)]

use cronsync::condition::ContextConditionEvaluator;
use cronsync::registry::load_registries;
use cronsync::{
    Reconciler, SqliteTaskStore, SyncSummary, TaskBuilder, TaskDocument, TaskInstance, TaskStore,
    export_tasks,
};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "cronsync-int-{name}-{}-{}",
        std::process::id(),
        now_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("create temp test dir");
    dir
}

fn write_tasks_yaml(root: &Path, content: &str) {
    let dir = root.join("config/scheduler");
    std::fs::create_dir_all(&dir).expect("create scheduler dir");
    std::fs::write(dir.join("tasks.yaml"), content).expect("write tasks.yaml");
}

fn write_registry_yaml(root: &Path) {
    let dir = root.join("config/scheduler");
    std::fs::create_dir_all(&dir).expect("create scheduler dir");
    std::fs::write(
        dir.join("registry.yaml"),
        r#"
classes:
  Acme\Jobs\PruneSessionsTask:
    defaults:
      maxAge: 86400
      dryRun: false
commands:
  - cache:flush
  - report:build
"#,
    )
    .expect("write registry.yaml");
}

/// One sync pass the way the CLI runs it: fresh store handle, document and
/// registries loaded from disk, context from KEY=VALUE pairs.
fn sync(root: &Path, context: &[(&str, &str)]) -> SyncSummary {
    let config_root = root.join("config");
    let document = TaskDocument::load(&config_root).expect("load document");
    let (types, commands) = load_registries(&config_root).expect("load registries");
    let evaluator = ContextConditionEvaluator::new(
        context
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );

    let store = SqliteTaskStore::open(&root.join("tasks.db")).expect("open store");
    let builder = TaskBuilder::new(&types, &commands);
    Reconciler::new(&store, builder, &evaluator)
        .run(&document)
        .expect("sync pass")
}

fn open_store(root: &Path) -> SqliteTaskStore {
    SqliteTaskStore::open(&root.join("tasks.db")).expect("open store")
}

const INITIAL_TASKS: &str = r#"
tasks:
  flush-caches:
    command: 'cache:flush'
    interval: 300
  prune-sessions:
    class: 'Acme\Jobs\PruneSessionsTask'
    cronCmd: '0 3 * * *'
    description: 'drop stale sessions'
    properties:
      maxAge: 43200
"#;

#[test]
fn first_pass_inserts_then_converges() {
    let root = temp_root("converges");
    write_registry_yaml(&root);
    write_tasks_yaml(&root, INITIAL_TASKS);

    let first = sync(&root, &[]);
    assert_eq!(first.added, 2);
    assert_eq!(first.updated + first.deleted + first.unchanged + first.skipped, 0);

    // Second pass over identical inputs writes nothing.
    let second = sync(&root, &[]);
    assert_eq!(second.unchanged, 2);
    assert_eq!(second.added + second.updated + second.deleted, 0);

    let store = open_store(&root);
    let managed = store.list_managed().expect("list managed");
    assert_eq!(managed.len(), 2);

    let prune = &managed["prune-sessions"];
    assert_eq!(prune.description, "prune-sessions: drop stale sessions");
    let instance = TaskInstance::from_stored_json(&prune.serialized_task).expect("blob");
    assert_eq!(instance.uid, Some(prune.uid));
    assert_eq!(instance.recurrence.cron.as_deref(), Some("0 3 * * *"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn document_edits_update_delete_and_add() {
    let root = temp_root("edits");
    write_registry_yaml(&root);
    write_tasks_yaml(&root, INITIAL_TASKS);
    sync(&root, &[]);

    let store = open_store(&root);
    let flush_uid = store.list_managed().expect("list")["flush-caches"].uid;
    let flush_crdate = store.list_managed().expect("list")["flush-caches"].crdate;
    drop(store);

    // flush-caches changes, prune-sessions disappears, report-weekly is new.
    write_tasks_yaml(
        &root,
        r#"
tasks:
  flush-caches:
    command: 'cache:flush'
    interval: 600
  report-weekly:
    command: 'report:build'
    cronCmd: '@weekly'
"#,
    );

    let summary = sync(&root, &[]);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.added, 1);

    let store = open_store(&root);
    let managed = store.list_managed().expect("list managed");
    assert_eq!(managed.len(), 2);
    assert!(!managed.contains_key("prune-sessions"));

    // The updated row kept its identity and creation time.
    let flush = &managed["flush-caches"];
    assert_eq!(flush.uid, flush_uid);
    assert_eq!(flush.crdate, flush_crdate);

    // And another pass settles.
    let third = sync(&root, &[]);
    assert_eq!(third.unchanged, 2);
    assert_eq!(third.added + third.updated + third.deleted, 0);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn rows_created_by_hand_are_never_touched() {
    let root = temp_root("foreign-rows");
    write_registry_yaml(&root);
    write_tasks_yaml(&root, INITIAL_TASKS);
    sync(&root, &[]);

    // A task created through some other channel: empty owner marker.
    let conn = rusqlite::Connection::open(root.join("tasks.db")).expect("open raw");
    conn.execute(
        "INSERT INTO scheduler_task (crdate, description, serialized_task) \
         VALUES (1000, 'added by an operator', '{\"kind\":{\"type\":\"command\",\
         \"command\":\"manual:job\"},\"recurrence\":{\"interval_secs\":60},\
         \"disabled\":false,\"description\":\"added by an operator\",\"task_group\":0}')",
        [],
    )
    .expect("insert foreign row");
    drop(conn);

    // Declare nothing: every managed row goes away, the foreign row stays.
    write_tasks_yaml(&root, "tasks: {}\n");
    let summary = sync(&root, &[]);
    assert_eq!(summary.deleted, 2);

    let store = open_store(&root);
    let all = store.list_all().expect("list all");
    assert_eq!(all.len(), 1);
    assert!(!all[0].is_managed());
    assert_eq!(all[0].description, "added by an operator");

    // The foreign row still shows up in the export draft.
    let draft = export_tasks(&store).expect("export");
    assert!(draft.tasks.contains_key("manual-job"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn conditions_follow_the_invocation_context() {
    let root = temp_root("conditions");
    write_registry_yaml(&root);
    write_tasks_yaml(
        &root,
        r#"
tasks:
  flush-caches:
    command: 'cache:flush'
    interval: 300
  production-report:
    command: 'report:build'
    cronCmd: '@daily'
    condition: stage == 'production'
"#,
    );

    let prod = sync(&root, &[("stage", "production")]);
    assert_eq!(prod.added, 2);

    // Same document on a staging host: the conditioned task counts as
    // absent and its previously synced row is removed.
    let staging = sync(&root, &[("stage", "staging")]);
    assert_eq!(staging.skipped, 1);
    assert_eq!(staging.deleted, 1);
    assert_eq!(staging.unchanged, 1);

    let store = open_store(&root);
    let managed = store.list_managed().expect("list managed");
    assert_eq!(managed.len(), 1);
    assert!(managed.contains_key("flush-caches"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn export_draft_reflects_the_declared_state() {
    let root = temp_root("export");
    write_registry_yaml(&root);
    write_tasks_yaml(&root, INITIAL_TASKS);
    sync(&root, &[]);

    let store = open_store(&root);
    let draft = export_tasks(&store).expect("export");

    // Identifiers are derived from what each task runs, not from the
    // original document keys.
    let identifiers: Vec<&String> = draft.tasks.keys().collect();
    assert_eq!(identifiers, ["cache-flush", "PruneSessions"]);

    let flush = &draft.tasks["cache-flush"];
    assert_eq!(flush.command.as_deref(), Some("cache:flush"));
    assert_eq!(flush.interval, Some(300));

    let prune = &draft.tasks["PruneSessions"];
    assert_eq!(prune.class.as_deref(), Some("Acme\\Jobs\\PruneSessionsTask"));
    assert_eq!(prune.cron_cmd.as_deref(), Some("0 3 * * *"));
    let properties = prune.properties.as_ref().expect("properties");
    assert_eq!(properties["maxAge"], serde_json::json!(43200));
    assert_eq!(properties["dryRun"], serde_json::json!(false));

    // The draft serializes to a loadable document shape.
    let yaml = serde_yaml::to_string(&draft).expect("yaml");
    assert!(yaml.starts_with("tasks:"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn reopened_store_preserves_identity_across_processes() {
    let root = temp_root("reopen");
    write_registry_yaml(&root);
    write_tasks_yaml(&root, INITIAL_TASKS);
    sync(&root, &[]);

    let before: Vec<(String, i64)> = {
        let store = open_store(&root);
        store
            .list_managed()
            .expect("list managed")
            .into_iter()
            .map(|(identifier, record)| (identifier, record.uid))
            .collect()
    };

    // A later run in a fresh process sees the same rows and changes nothing.
    let summary = sync(&root, &[]);
    assert_eq!(summary.unchanged, 2);

    let store = open_store(&root);
    let after: Vec<(String, i64)> = store
        .list_managed()
        .expect("list managed")
        .into_iter()
        .map(|(identifier, record)| (identifier, record.uid))
        .collect();
    assert_eq!(before, after);

    let _ = std::fs::remove_dir_all(root);
}
