//! Persistence seam for the approval pipeline
//!
//! The pipeline reads and writes production data only through
//! [`ProductionStore`]; [`SqliteStore`] is the shipped implementation.

pub mod sqlite_store;

pub use sqlite_store::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

use prefab_common::db::{ComponentRecord, ComponentWithParts, StagingRecord, StagingStatus};
use prefab_common::Result;

use crate::reconcile::approval_committer::CommitPlan;
use crate::reconcile::duplicate_detector::ComponentKey;

/// Repository over projects, components, sub-assemblies and staging records
#[async_trait]
pub trait ProductionStore: Send + Sync + 'static {
    async fn project_exists(&self, project_id: &str) -> Result<bool>;

    /// Every component identifier currently used in a project
    async fn component_ids(&self, project_id: &str) -> Result<HashSet<String>>;

    async fn find_component(
        &self,
        project_id: &str,
        component_id: &str,
    ) -> Result<Option<ComponentRecord>>;

    async fn find_component_by_id(&self, id: &str) -> Result<Option<ComponentRecord>>;

    async fn load_component_with_parts(&self, id: &str) -> Result<Option<ComponentWithParts>>;

    /// (project, component identifier) of every production component
    async fn production_keys(&self) -> Result<HashSet<ComponentKey>>;

    /// Apply every write of an approval atomically
    ///
    /// Fails with a unique-violation database error when another writer
    /// claimed one of the identifiers first; nothing is written in that case.
    async fn apply_plan(&self, plan: &CommitPlan) -> Result<()>;

    async fn insert_staging(&self, record: &StagingRecord) -> Result<()>;

    async fn find_staging(&self, id: Uuid) -> Result<Option<StagingRecord>>;

    /// Newest first; all statuses when `status` is `None`
    async fn list_staging(&self, status: Option<StagingStatus>) -> Result<Vec<StagingRecord>>;

    /// Replace the raw data of a pending record
    async fn update_staging_raw(&self, id: Uuid, raw_data: &Value) -> Result<()>;

    /// Move a pending record to `to`, stamping the reviewer
    async fn transition_staging(
        &self,
        id: Uuid,
        to: StagingStatus,
        reviewed_by: Option<&str>,
    ) -> Result<()>;
}
