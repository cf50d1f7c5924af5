//! SQLite implementation of the production store
//!
//! Approval plans are applied inside a single transaction: either every
//! component, sub-assembly, project and staging change lands, or none does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use prefab_common::db::{
    ComponentRecord, ComponentWithParts, ConnectorRecord, FramingSegmentRecord, PartRecord,
    SheathingRecord, StagingRecord, StagingStatus,
};
use prefab_common::{time, Error, Result};

use super::ProductionStore;
use crate::reconcile::approval_committer::{CommitPlan, ComponentWrite, WriteMode};
use crate::reconcile::duplicate_detector::ComponentKey;

const COMPONENT_COLUMNS: &str = "id, project_id, component_id, panel_kind, component_type, \
     design_url, sequence, length, height, weight, area, current_status, percent_complete";

const STAGING_COLUMNS: &str =
    "id, raw_data, status, created_at, updated_at, reviewed_at, reviewed_by";

/// Store backed by the SQLite pool from `prefab_common::db::init_database`
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ProductionStore for SqliteStore {
    async fn project_exists(&self, project_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn component_ids(&self, project_id: &str) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT component_id FROM components WHERE project_id = ?")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn find_component(
        &self,
        project_id: &str,
        component_id: &str,
    ) -> Result<Option<ComponentRecord>> {
        let sql = format!(
            "SELECT {} FROM components WHERE project_id = ? AND component_id = ?",
            COMPONENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(component_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(component_from_row).transpose()
    }

    async fn find_component_by_id(&self, id: &str) -> Result<Option<ComponentRecord>> {
        let sql = format!("SELECT {} FROM components WHERE id = ?", COMPONENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(component_from_row).transpose()
    }

    async fn load_component_with_parts(&self, id: &str) -> Result<Option<ComponentWithParts>> {
        let Some(component) = self.find_component_by_id(id).await? else {
            return Ok(None);
        };

        let parts = sqlx::query(
            "SELECT id, component_ref, size, label, count, cut_length \
             FROM parts WHERE component_ref = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(part_from_row)
        .collect::<Result<Vec<_>>>()?;

        let sheathing = sqlx::query(
            "SELECT id, component_ref, description, panel_area, panel_count \
             FROM sheathing WHERE component_ref = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(sheathing_from_row)
        .collect::<Result<Vec<_>>>()?;

        let connectors = sqlx::query(
            "SELECT id, component_ref, label, description, count \
             FROM connectors WHERE component_ref = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(connector_from_row)
        .collect::<Result<Vec<_>>>()?;

        let framing = sqlx::query(
            "SELECT id, component_ref, ftype, total_length, count \
             FROM framing_segments WHERE component_ref = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(framing_from_row)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(ComponentWithParts {
            component,
            parts,
            sheathing,
            connectors,
            framing,
        }))
    }

    async fn production_keys(&self) -> Result<HashSet<ComponentKey>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT project_id, component_id FROM components")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(project, component)| ComponentKey::new(project, component))
            .collect())
    }

    async fn apply_plan(&self, plan: &CommitPlan) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if plan.create_project {
            sqlx::query(
                "INSERT INTO projects (project_id, name, created_at) VALUES (?, ?, ?) \
                 ON CONFLICT(project_id) DO NOTHING",
            )
            .bind(&plan.project_id)
            .bind(&plan.project_id)
            .bind(time::now())
            .execute(&mut *tx)
            .await?;
            info!(project_id = %plan.project_id, "Created placeholder project");
        }

        for write in &plan.writes {
            apply_write(&mut *tx, write).await?;
        }

        if let Some(staging) = &plan.staging {
            mark_reviewed(
                &mut *tx,
                staging.id,
                StagingStatus::Approved,
                staging.reviewed_by.as_deref(),
            )
            .await?;
        }

        tx.commit().await?;

        debug!(
            project_id = %plan.project_id,
            writes = plan.writes.len(),
            "Commit plan applied"
        );
        Ok(())
    }

    async fn insert_staging(&self, record: &StagingRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO staging_records (id, raw_data, status, created_at, updated_at, reviewed_at, reviewed_by)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(serde_json::to_string(&record.raw_data)?)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.reviewed_at)
        .bind(&record.reviewed_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_staging(&self, id: Uuid) -> Result<Option<StagingRecord>> {
        let sql = format!("SELECT {} FROM staging_records WHERE id = ?", STAGING_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(staging_from_row).transpose()
    }

    async fn list_staging(&self, status: Option<StagingStatus>) -> Result<Vec<StagingRecord>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM staging_records WHERE status = ? ORDER BY created_at DESC",
                    STAGING_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM staging_records ORDER BY created_at DESC",
                    STAGING_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(staging_from_row).collect()
    }

    async fn update_staging_raw(&self, id: Uuid, raw_data: &Value) -> Result<()> {
        let result = sqlx::query(
            "UPDATE staging_records SET raw_data = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(serde_json::to_string(raw_data)?)
        .bind(time::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_reviewed(id).await);
        }
        Ok(())
    }

    async fn transition_staging(
        &self,
        id: Uuid,
        to: StagingStatus,
        reviewed_by: Option<&str>,
    ) -> Result<()> {
        let outcome = {
            let mut conn = self.pool.acquire().await?;
            mark_reviewed(&mut *conn, id, to, reviewed_by).await
        };
        match outcome {
            Err(Error::InvalidInput(_)) => Err(self.missing_or_reviewed(id).await),
            other => other,
        }
    }
}

impl SqliteStore {
    async fn missing_or_reviewed(&self, id: Uuid) -> Error {
        match self.find_staging(id).await {
            Ok(Some(record)) => Error::InvalidInput(format!(
                "Staging record {} is {}",
                id,
                record.status.as_str()
            )),
            Ok(None) => Error::NotFound(format!("Staging record {}", id)),
            Err(err) => err,
        }
    }
}

/// Conditional `pending → to` update; `InvalidInput` when nothing matched
async fn mark_reviewed(
    conn: &mut SqliteConnection,
    id: Uuid,
    to: StagingStatus,
    reviewed_by: Option<&str>,
) -> Result<()> {
    let now = time::now();
    let result = sqlx::query(
        "UPDATE staging_records SET status = ?, reviewed_at = ?, reviewed_by = ?, updated_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(to.as_str())
    .bind(now)
    .bind(reviewed_by)
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidInput(format!(
            "Staging record {} is not pending",
            id
        )));
    }
    Ok(())
}

async fn apply_write(conn: &mut SqliteConnection, write: &ComponentWrite) -> Result<()> {
    let record = &write.record;
    let component = &record.component;

    match write.mode {
        WriteMode::Create => {
            write_component(conn, component, "").await?;
            write_children(conn, record, false).await?;
        }
        WriteMode::Replace => {
            sqlx::query(
                r#"
                UPDATE components SET
                    component_id = ?, panel_kind = ?, component_type = ?, design_url = ?,
                    sequence = ?, length = ?, height = ?, weight = ?, area = ?,
                    current_status = ?, percent_complete = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(&component.component_id)
            .bind(&component.panel_kind)
            .bind(&component.component_type)
            .bind(&component.design_url)
            .bind(component.sequence)
            .bind(component.length)
            .bind(component.height)
            .bind(component.weight)
            .bind(component.area)
            .bind(&component.current_status)
            .bind(component.percent_complete)
            .bind(&component.id)
            .execute(&mut *conn)
            .await?;

            for table in ["parts", "sheathing", "connectors", "framing_segments"] {
                sqlx::query(&format!("DELETE FROM {} WHERE component_ref = ?", table))
                    .bind(&component.id)
                    .execute(&mut *conn)
                    .await?;
            }
            write_children(conn, record, false).await?;
            info!(
                component_id = %component.component_id,
                internal_id = %component.id,
                "Replaced production component and its sub-assemblies"
            );
        }
        WriteMode::Upsert => {
            write_component(
                conn,
                component,
                r#"
                ON CONFLICT(id) DO UPDATE SET
                    project_id = excluded.project_id,
                    component_id = excluded.component_id,
                    panel_kind = excluded.panel_kind,
                    component_type = excluded.component_type,
                    design_url = excluded.design_url,
                    sequence = excluded.sequence,
                    length = excluded.length,
                    height = excluded.height,
                    weight = excluded.weight,
                    area = excluded.area,
                    current_status = excluded.current_status,
                    percent_complete = excluded.percent_complete,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .await?;
            write_children(conn, record, true).await?;
        }
    }
    Ok(())
}

async fn write_component(
    conn: &mut SqliteConnection,
    component: &ComponentRecord,
    on_conflict: &str,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO components ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) {}",
        COMPONENT_COLUMNS, on_conflict
    );
    sqlx::query(&sql)
        .bind(&component.id)
        .bind(&component.project_id)
        .bind(&component.component_id)
        .bind(&component.panel_kind)
        .bind(&component.component_type)
        .bind(&component.design_url)
        .bind(component.sequence)
        .bind(component.length)
        .bind(component.height)
        .bind(component.weight)
        .bind(component.area)
        .bind(&component.current_status)
        .bind(component.percent_complete)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert every sub-assembly row; with `upsert`, rows whose id already
/// exists are updated in place
async fn write_children(
    conn: &mut SqliteConnection,
    record: &ComponentWithParts,
    upsert: bool,
) -> Result<()> {
    let conflict = |columns: &[&str]| -> String {
        if !upsert {
            return String::new();
        }
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!("ON CONFLICT(id) DO UPDATE SET {}", assignments.join(", "))
    };

    let sql = format!(
        "INSERT INTO parts (id, component_ref, size, label, count, cut_length) \
         VALUES (?, ?, ?, ?, ?, ?) {}",
        conflict(&["size", "label", "count", "cut_length"])
    );
    for part in &record.parts {
        sqlx::query(&sql)
            .bind(&part.id)
            .bind(&part.component_ref)
            .bind(&part.size)
            .bind(&part.label)
            .bind(part.count)
            .bind(&part.cut_length)
            .execute(&mut *conn)
            .await?;
    }

    let sql = format!(
        "INSERT INTO sheathing (id, component_ref, description, panel_area, panel_count) \
         VALUES (?, ?, ?, ?, ?) {}",
        conflict(&["description", "panel_area", "panel_count"])
    );
    for sheet in &record.sheathing {
        sqlx::query(&sql)
            .bind(&sheet.id)
            .bind(&sheet.component_ref)
            .bind(&sheet.description)
            .bind(&sheet.panel_area)
            .bind(sheet.panel_count)
            .execute(&mut *conn)
            .await?;
    }

    let sql = format!(
        "INSERT INTO connectors (id, component_ref, label, description, count) \
         VALUES (?, ?, ?, ?, ?) {}",
        conflict(&["label", "description", "count"])
    );
    for connector in &record.connectors {
        sqlx::query(&sql)
            .bind(&connector.id)
            .bind(&connector.component_ref)
            .bind(&connector.label)
            .bind(&connector.description)
            .bind(connector.count)
            .execute(&mut *conn)
            .await?;
    }

    let sql = format!(
        "INSERT INTO framing_segments (id, component_ref, ftype, total_length, count) \
         VALUES (?, ?, ?, ?, ?) {}",
        conflict(&["ftype", "total_length", "count"])
    );
    for segment in &record.framing {
        sqlx::query(&sql)
            .bind(&segment.id)
            .bind(&segment.component_ref)
            .bind(&segment.ftype)
            .bind(&segment.total_length)
            .bind(segment.count)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

fn component_from_row(row: &SqliteRow) -> Result<ComponentRecord> {
    Ok(ComponentRecord {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        component_id: row.try_get("component_id")?,
        panel_kind: row.try_get("panel_kind")?,
        component_type: row.try_get("component_type")?,
        design_url: row.try_get("design_url")?,
        sequence: row.try_get("sequence")?,
        length: row.try_get("length")?,
        height: row.try_get("height")?,
        weight: row.try_get("weight")?,
        area: row.try_get("area")?,
        current_status: row.try_get("current_status")?,
        percent_complete: row.try_get("percent_complete")?,
    })
}

fn part_from_row(row: &SqliteRow) -> Result<PartRecord> {
    Ok(PartRecord {
        id: row.try_get("id")?,
        component_ref: row.try_get("component_ref")?,
        size: row.try_get("size")?,
        label: row.try_get("label")?,
        count: row.try_get("count")?,
        cut_length: row.try_get("cut_length")?,
    })
}

fn sheathing_from_row(row: &SqliteRow) -> Result<SheathingRecord> {
    Ok(SheathingRecord {
        id: row.try_get("id")?,
        component_ref: row.try_get("component_ref")?,
        description: row.try_get("description")?,
        panel_area: row.try_get("panel_area")?,
        panel_count: row.try_get("panel_count")?,
    })
}

fn connector_from_row(row: &SqliteRow) -> Result<ConnectorRecord> {
    Ok(ConnectorRecord {
        id: row.try_get("id")?,
        component_ref: row.try_get("component_ref")?,
        label: row.try_get("label")?,
        description: row.try_get("description")?,
        count: row.try_get("count")?,
    })
}

fn framing_from_row(row: &SqliteRow) -> Result<FramingSegmentRecord> {
    Ok(FramingSegmentRecord {
        id: row.try_get("id")?,
        component_ref: row.try_get("component_ref")?,
        ftype: row.try_get("ftype")?,
        total_length: row.try_get("total_length")?,
        count: row.try_get("count")?,
    })
}

fn staging_from_row(row: &SqliteRow) -> Result<StagingRecord> {
    let id: String = row.try_get("id")?;
    let raw_data: String = row.try_get("raw_data")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    let reviewed_at: Option<DateTime<Utc>> = row.try_get("reviewed_at")?;

    Ok(StagingRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid staging id {}: {}", id, e)))?,
        raw_data: serde_json::from_str(&raw_data)?,
        status: StagingStatus::parse(&status)?,
        created_at,
        updated_at,
        reviewed_at,
        reviewed_by: row.try_get("reviewed_by")?,
    })
}
