//! Tests for database initialization

use prefab_common::db::init::{init_database, init_schema};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("prefab.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("prefab.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());
    drop(pool1);

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    for table in [
        "projects",
        "components",
        "parts",
        "sheathing",
        "connectors",
        "framing_segments",
        "staging_records",
    ] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }

    // Idempotent
    init_schema(&pool).await.unwrap();
}

#[tokio::test]
async fn test_component_identifier_unique_per_project() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    sqlx::query("INSERT INTO projects (project_id, created_at) VALUES ('P', '2024-01-01T00:00:00Z')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO components (id, project_id, component_id) VALUES ('a', 'P', 'C')")
        .execute(&pool)
        .await
        .unwrap();

    let err = sqlx::query("INSERT INTO components (id, project_id, component_id) VALUES ('b', 'P', 'C')")
        .execute(&pool)
        .await
        .unwrap_err();
    let err = prefab_common::Error::from(err);
    assert!(err.is_unique_violation());
}
