//! Database initialization
//!
//! Creates the database file on first run and brings the schema up with
//! idempotent `CREATE TABLE IF NOT EXISTS` statements.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets review reads proceed while an approval writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by the ingest pipeline
///
/// Safe to call repeatedly. Also used directly by tests on in-memory pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_projects_table(pool).await?;
    create_components_table(pool).await?;
    create_parts_table(pool).await?;
    create_sheathing_table(pool).await?;
    create_connectors_table(pool).await?;
    create_framing_segments_table(pool).await?;
    create_staging_records_table(pool).await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            project_id TEXT PRIMARY KEY,
            name TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// The UNIQUE(project_id, component_id) constraint is the final authority on
/// identifier uniqueness; concurrent approvals that both pass the advisory
/// duplicate check are stopped here.
async fn create_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS components (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(project_id),
            component_id TEXT NOT NULL,
            panel_kind TEXT,
            component_type TEXT,
            design_url TEXT,
            sequence INTEGER,
            length REAL,
            height REAL,
            weight REAL,
            area REAL,
            current_status TEXT NOT NULL DEFAULT '',
            percent_complete REAL NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, component_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parts (
            id TEXT PRIMARY KEY,
            component_ref TEXT NOT NULL REFERENCES components(id) ON DELETE CASCADE,
            size TEXT,
            label TEXT,
            count INTEGER,
            cut_length TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_parts_component ON parts(component_ref)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sheathing_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sheathing (
            id TEXT PRIMARY KEY,
            component_ref TEXT NOT NULL REFERENCES components(id) ON DELETE CASCADE,
            description TEXT,
            panel_area TEXT,
            panel_count REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sheathing_component ON sheathing(component_ref)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_connectors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connectors (
            id TEXT PRIMARY KEY,
            component_ref TEXT NOT NULL REFERENCES components(id) ON DELETE CASCADE,
            label TEXT,
            description TEXT,
            count INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connectors_component ON connectors(component_ref)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_framing_segments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS framing_segments (
            id TEXT PRIMARY KEY,
            component_ref TEXT NOT NULL REFERENCES components(id) ON DELETE CASCADE,
            ftype TEXT,
            total_length TEXT,
            count INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_framing_component ON framing_segments(component_ref)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_staging_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staging_records (
            id TEXT PRIMARY KEY,
            raw_data TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            reviewed_at TEXT,
            reviewed_by TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_staging_status ON staging_records(status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
