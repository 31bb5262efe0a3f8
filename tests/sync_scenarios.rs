//! End-to-end coverage of the scenarios spec.md section 8 lists literally,
//! run against in-memory SQLite pools for both source and target. SQLite is
//! the one engine guaranteed runnable without an external service; the
//! dialect abstraction means the same orchestrator path that would run
//! against Postgres/MySQL in production runs here too.

use sqlx::any::AnyPool;
use sqlx::Row;
use table_syncer::SyncConfig;

async fn memory_pool() -> AnyPool {
    sqlx::any::install_default_drivers();
    AnyPool::connect("sqlite::memory:").await.expect("connect sqlite memory pool")
}

async fn seed_widgets(source: &AnyPool, rows: &[(i64, &str)]) {
    sqlx::query("CREATE TABLE widgets (id INTEGER PRIMARY KEY, payload TEXT)")
        .execute(source)
        .await
        .unwrap();
    for (id, payload) in rows {
        sqlx::query("INSERT INTO widgets (id, payload) VALUES (?, ?)")
            .bind(id)
            .bind(*payload)
            .execute(source)
            .await
            .unwrap();
    }
}

fn widgets_config(source: AnyPool, target: AnyPool) -> SyncConfig {
    SyncConfig::builder(source, target, "widgets", "widgets_live")
        .primary_key_column("id", "id")
        .data_column("id", "id")
        .data_column("payload", "payload")
        .hash_columns(["payload".to_string()])
        .build()
        .unwrap()
}

async fn live_row(target: &AnyPool, id: i64) -> Option<(String, i64, i64, String)> {
    let row = sqlx::query(
        "SELECT payload, _syncer_created_revision_id, _syncer_last_modified_revision_id, _syncer_content_hash \
         FROM widgets_live WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(target)
    .await
    .unwrap()?;
    Some((
        row.try_get::<String, _>(0).unwrap(),
        row.try_get::<i64, _>(1).unwrap(),
        row.try_get::<i64, _>(2).unwrap(),
        row.try_get::<String, _>(3).unwrap(),
    ))
}

async fn live_row_count(target: &AnyPool) -> i64 {
    let row = sqlx::query("SELECT COUNT(*) FROM widgets_live")
        .fetch_one(target)
        .await
        .unwrap();
    row.try_get(0).unwrap()
}

#[tokio::test]
async fn scenario_1_initial_load() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a"), (2, "b"), (3, "c")]).await;

    let config = widgets_config(source, target.clone());
    let report = table_syncer::sync(&config, 10).await.unwrap();

    assert_eq!(report.initial_insert_count, 3);
    assert_eq!(report.inserted_count, 0);
    assert_eq!(report.updated_count, 0);
    assert_eq!(report.deleted_count, 0);

    let mut hashes = Vec::new();
    for id in [1, 2, 3] {
        let (payload, created, modified, hash) = live_row(&target, id).await.unwrap();
        assert_eq!(created, 10);
        assert_eq!(modified, 10);
        assert_eq!(hash.len(), 64);
        hashes.push(hash);
        assert!(!payload.is_empty());
    }
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), 3, "each row must have a distinct content hash");
}

#[tokio::test]
async fn scenario_2_pure_update_leaves_unrelated_rows_untouched() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a"), (2, "b"), (3, "c")]).await;

    let config = widgets_config(source.clone(), target.clone());
    table_syncer::sync(&config, 10).await.unwrap();
    let (_, _, _, hash_before) = live_row(&target, 2).await.unwrap();

    sqlx::query("UPDATE widgets SET payload = 'B' WHERE id = 2")
        .execute(&source)
        .await
        .unwrap();

    let report = table_syncer::sync(&config, 11).await.unwrap();
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.inserted_count, 0);
    assert_eq!(report.deleted_count, 0);

    let (payload, created, modified, hash_after) = live_row(&target, 2).await.unwrap();
    assert_eq!(payload, "B");
    assert_eq!(created, 10);
    assert_eq!(modified, 11);
    assert_ne!(hash_after, hash_before);

    for id in [1, 3] {
        let (_, created, modified, _) = live_row(&target, id).await.unwrap();
        assert_eq!(created, 10);
        assert_eq!(modified, 10, "untouched row must keep its original last-modified revision");
    }
}

#[tokio::test]
async fn scenario_3_delete_with_logging_off() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a"), (2, "B"), (3, "c")]).await;

    let config = widgets_config(source.clone(), target.clone());
    table_syncer::sync(&config, 10).await.unwrap();

    sqlx::query("DELETE FROM widgets WHERE id = 3").execute(&source).await.unwrap();
    let report = table_syncer::sync(&config, 12).await.unwrap();

    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.logged_deletions_count, 0);
    assert!(live_row(&target, 3).await.is_none());
    assert_eq!(live_row_count(&target).await, 2);

    let exists = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'widgets_live_deleted_log'")
        .fetch_optional(&target)
        .await
        .unwrap();
    assert!(exists.is_none(), "no deletion-log table should exist when logging is disabled");
}

#[tokio::test]
async fn scenario_4_delete_with_logging_on() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a"), (2, "B"), (3, "c")]).await;

    let config = SyncConfig::builder(source.clone(), target.clone(), "widgets", "widgets_live")
        .primary_key_column("id", "id")
        .data_column("id", "id")
        .data_column("payload", "payload")
        .hash_columns(["payload".to_string()])
        .enable_deletion_logging(true)
        .build()
        .unwrap();

    table_syncer::sync(&config, 10).await.unwrap();
    let (_, _, _, _) = live_row(&target, 3).await.unwrap();
    let syncer_id: i64 = sqlx::query("SELECT _syncer_id FROM widgets_live WHERE id = 3")
        .fetch_one(&target)
        .await
        .unwrap()
        .try_get(0)
        .unwrap();

    sqlx::query("DELETE FROM widgets WHERE id = 3").execute(&source).await.unwrap();
    let report = table_syncer::sync(&config, 12).await.unwrap();

    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.logged_deletions_count, 1);

    let log_row = sqlx::query("SELECT deleted_syncer_id, deleted_at_revision_id FROM widgets_live_deleted_log")
        .fetch_one(&target)
        .await
        .unwrap();
    let logged_id: i64 = log_row.try_get(0).unwrap();
    let logged_revision: i64 = log_row.try_get(1).unwrap();
    assert_eq!(logged_id, syncer_id);
    assert_eq!(logged_revision, 12);
}

#[tokio::test]
async fn scenario_5_mixed_insert_update_delete() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a"), (2, "b"), (3, "c")]).await;

    let config = widgets_config(source.clone(), target.clone());
    table_syncer::sync(&config, 10).await.unwrap();

    sqlx::query("UPDATE widgets SET payload = 'B' WHERE id = 2")
        .execute(&source)
        .await
        .unwrap();
    sqlx::query("DELETE FROM widgets WHERE id = 3").execute(&source).await.unwrap();
    sqlx::query("INSERT INTO widgets (id, payload) VALUES (4, 'd')")
        .execute(&source)
        .await
        .unwrap();

    let report = table_syncer::sync(&config, 13).await.unwrap();
    assert_eq!(report.inserted_count, 1);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.initial_insert_count, 0);

    assert!(live_row(&target, 3).await.is_none());
    let (payload, _, _, _) = live_row(&target, 4).await.unwrap();
    assert_eq!(payload, "d");
}

#[tokio::test]
async fn scenario_6_datetime_placeholder_sanitization() {
    let source = memory_pool().await;
    let target = memory_pool().await;

    sqlx::query("CREATE TABLE events (id INTEGER PRIMARY KEY, happened_at TEXT)")
        .execute(&source)
        .await
        .unwrap();
    sqlx::query("INSERT INTO events (id, happened_at) VALUES (1, NULL)")
        .execute(&source)
        .await
        .unwrap();
    sqlx::query("INSERT INTO events (id, happened_at) VALUES (2, '0000-00-00 00:00:00')")
        .execute(&source)
        .await
        .unwrap();
    sqlx::query("INSERT INTO events (id, happened_at) VALUES (3, '2024-05-01 10:00:00')")
        .execute(&source)
        .await
        .unwrap();

    let config = SyncConfig::builder(source, target.clone(), "events", "events_live")
        .primary_key_column("id", "id")
        .data_column("id", "id")
        .data_column("happened_at", "happened_at")
        .hash_columns(["happened_at".to_string()])
        .non_nullable_datetime_columns(["happened_at".to_string()])
        .build()
        .unwrap();

    table_syncer::sync(&config, 1).await.unwrap();

    for id in [1, 2] {
        let row = sqlx::query("SELECT happened_at FROM events_live WHERE id = ?")
            .bind(id)
            .fetch_one(&target)
            .await
            .unwrap();
        let value: String = row.try_get(0).unwrap();
        assert_eq!(value, "2222-02-22 00:00:00");
    }

    let row = sqlx::query("SELECT happened_at FROM events_live WHERE id = 3")
        .fetch_one(&target)
        .await
        .unwrap();
    let value: String = row.try_get(0).unwrap();
    assert_eq!(value, "2024-05-01 10:00:00");
}

#[tokio::test]
async fn idempotent_resync_with_unchanged_source_yields_zero_counts() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a"), (2, "b")]).await;

    let config = widgets_config(source, target);
    table_syncer::sync(&config, 1).await.unwrap();
    let report = table_syncer::sync(&config, 2).await.unwrap();

    assert_eq!(report.inserted_count, 0);
    assert_eq!(report.updated_count, 0);
    assert_eq!(report.deleted_count, 0);
}

#[tokio::test]
async fn temp_table_does_not_survive_a_successful_run() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    seed_widgets(&source, &[(1, "a")]).await;

    let config = widgets_config(source, target.clone());
    table_syncer::sync(&config, 1).await.unwrap();

    let exists = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'widgets_live_temp'")
        .fetch_optional(&target)
        .await
        .unwrap();
    assert!(exists.is_none(), "temp table must be dropped after a successful sync");
}

#[tokio::test]
async fn rejects_source_object_that_does_not_exist() {
    let source = memory_pool().await;
    let target = memory_pool().await;
    sqlx::query("CREATE TABLE placeholder (id INTEGER PRIMARY KEY)")
        .execute(&source)
        .await
        .unwrap();

    let config = SyncConfig::builder(source, target, "does_not_exist", "does_not_exist_live")
        .primary_key_column("id", "id")
        .data_column("id", "id")
        .hash_columns(["id".to_string()])
        .build()
        .unwrap();

    let err = table_syncer::sync(&config, 1).await.unwrap_err();
    assert!(matches!(err, table_syncer::SyncError::Introspection { .. }));
}
