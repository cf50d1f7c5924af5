//! Review workflow over staged submissions
//!
//! Ingestion, reviewer queries, corrections, rejection and approval. Each
//! operation runs to completion within the calling request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use prefab_common::config::IngestConfig;
use prefab_common::db::{ComponentWithParts, StagingRecord, StagingStatus};

use crate::db::ProductionStore;
use crate::reconcile::approval_committer::{ensure_transition, ApprovalCommitter};
use crate::reconcile::confidence_scorer::ConfidenceScorer;
use crate::reconcile::duplicate_detector::{
    analyze_staging_duplicates, conflicts, detect, submission_key, ComponentKey, DuplicateReport,
};
use crate::reconcile::error::{ReconcileError, ReconcileResult};
use crate::reconcile::identity_allocator::IdentityAllocator;
use crate::reconcile::types::{ApprovalOptions, ApprovalOutcome, RawSubmission, ScoreBreakdown};

/// One row of the review queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingSummary {
    pub id: Uuid,
    pub status: StagingStatus,
    pub created_at: DateTime<Utc>,
    pub project_id: Option<String>,
    pub panel_label: Option<String>,
    pub confidence: f64,
    /// Present when the submission has a (project, label) pair
    pub duplicates: Option<DuplicateReport>,
}

/// Side-by-side view of a submission and what it would collide with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub staging: StagingRecord,
    pub production: Option<ComponentWithParts>,
    /// Other staged submissions with the same pair, oldest first
    pub related_staging: Vec<StagingRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdSuggestion {
    pub project_id: String,
    pub requested: String,
    pub suggested: String,
}

pub struct ReviewService<S: ProductionStore> {
    store: Arc<S>,
    committer: ApprovalCommitter<S>,
    scorer: ConfidenceScorer,
    allocator: IdentityAllocator,
}

impl<S: ProductionStore> ReviewService<S> {
    pub fn new(store: Arc<S>, config: &IngestConfig) -> Self {
        let allocator = IdentityAllocator::from_config(&config.allocator);
        Self {
            committer: ApprovalCommitter::new(Arc::clone(&store), allocator.clone()),
            scorer: ConfidenceScorer::from_config(&config.scoring),
            allocator,
            store,
        }
    }

    /// Persist a parsed submission as a new pending record
    pub async fn ingest(&self, raw_data: Value) -> ReconcileResult<StagingRecord> {
        let raw = RawSubmission::from_value(raw_data)?;
        let record = StagingRecord::new(raw.into_value());
        self.store.insert_staging(&record).await?;

        info!(
            staging_id = %record.id,
            project_id = ?submission_key(&record.raw_data).map(|k| k.project_id),
            "Submission staged"
        );
        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> ReconcileResult<StagingRecord> {
        self.store
            .find_staging(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("Staging record {}", id)))
    }

    /// Number of submissions awaiting review
    pub async fn pending_backlog(&self) -> ReconcileResult<usize> {
        Ok(self
            .store
            .list_staging(Some(StagingStatus::Pending))
            .await?
            .len())
    }

    /// Pending queue with confidence and duplicate annotations, newest first
    pub async fn list_pending(&self) -> ReconcileResult<Vec<StagingSummary>> {
        let staged = self.store.list_staging(None).await?;
        let production = self.store.production_keys().await?;
        let reports = analyze_staging_duplicates(&staged, &production);

        let summaries = staged
            .iter()
            .filter(|record| record.status == StagingStatus::Pending)
            .map(|record| {
                let key = submission_key(&record.raw_data);
                let confidence = RawSubmission::from_value(record.raw_data.clone())
                    .map(|raw| self.scorer.score(&raw).overall)
                    .unwrap_or(0.0);
                let duplicates = key.as_ref().and_then(|key| {
                    reports
                        .iter()
                        .find(|r| r.project_id == key.project_id && r.component_id == key.component_id)
                        .cloned()
                });
                StagingSummary {
                    id: record.id,
                    status: record.status,
                    created_at: record.created_at,
                    project_id: key.as_ref().map(|k| k.project_id.clone()),
                    panel_label: key.map(|k| k.component_id),
                    confidence,
                    duplicates,
                }
            })
            .collect();
        Ok(summaries)
    }

    /// Replace a pending record's raw data with a reviewer's correction
    pub async fn update_raw_data(&self, id: Uuid, raw_data: Value) -> ReconcileResult<StagingRecord> {
        let raw = RawSubmission::from_value(raw_data)?;
        let record = self.get(id).await?;
        if record.status != StagingStatus::Pending {
            return Err(ReconcileError::InvalidTransition {
                id,
                from: record.status,
                to: StagingStatus::Pending,
            });
        }

        self.store.update_staging_raw(id, &raw.into_value()).await?;
        info!(staging_id = %id, "Staging data corrected");
        self.get(id).await
    }

    pub async fn score(&self, id: Uuid) -> ReconcileResult<ScoreBreakdown> {
        let record = self.get(id).await?;
        let raw = RawSubmission::from_value(record.raw_data)?;
        Ok(self.scorer.score(&raw))
    }

    pub async fn duplicates(&self, id: Uuid) -> ReconcileResult<DuplicateReport> {
        let record = self.get(id).await?;
        let key = self.require_key(&record)?;
        let staged = self.store.list_staging(None).await?;
        let production = self.store.production_keys().await?;
        Ok(detect(&key.project_id, &key.component_id, &staged, &production))
    }

    /// Pairs shared by several staged submissions or already in production
    pub async fn duplicate_summary(&self) -> ReconcileResult<Vec<DuplicateReport>> {
        let staged = self.store.list_staging(None).await?;
        let production = self.store.production_keys().await?;
        Ok(conflicts(analyze_staging_duplicates(&staged, &production)))
    }

    pub async fn comparison(&self, id: Uuid) -> ReconcileResult<Comparison> {
        let staging = self.get(id).await?;
        let key = self.require_key(&staging)?;

        let production = match self
            .store
            .find_component(&key.project_id, &key.component_id)
            .await?
        {
            Some(component) => self.store.load_component_with_parts(&component.id).await?,
            None => None,
        };

        let mut related_staging: Vec<StagingRecord> = self
            .store
            .list_staging(None)
            .await?
            .into_iter()
            .filter(|other| other.id != id)
            .filter(|other| submission_key(&other.raw_data).as_ref() == Some(&key))
            .collect();
        related_staging.sort_by_key(|other| other.created_at);

        Ok(Comparison {
            staging,
            production,
            related_staging,
        })
    }

    /// Identifier the allocator would hand out now; nothing is reserved
    pub async fn suggest_component_id(&self, id: Uuid) -> ReconcileResult<IdSuggestion> {
        let record = self.get(id).await?;
        let key = self.require_key(&record)?;
        let existing = self.store.component_ids(&key.project_id).await?;
        let suggested = self.allocator.suggest(&key.component_id, None, &existing)?;
        Ok(IdSuggestion {
            project_id: key.project_id,
            requested: key.component_id,
            suggested,
        })
    }

    pub async fn approve_staging(
        &self,
        id: Uuid,
        options: &ApprovalOptions,
    ) -> ReconcileResult<ApprovalOutcome> {
        self.committer.approve_staging(id, options).await
    }

    pub async fn approve_raw(
        &self,
        raw_data: Value,
        options: &ApprovalOptions,
    ) -> ReconcileResult<ApprovalOutcome> {
        let raw = RawSubmission::from_value(raw_data)?;
        self.committer.approve(&raw, options).await
    }

    pub async fn reject(&self, id: Uuid, reviewer: Option<&str>) -> ReconcileResult<StagingRecord> {
        let record = self.get(id).await?;
        ensure_transition(&record, StagingStatus::Rejected)?;

        self.store
            .transition_staging(id, StagingStatus::Rejected, reviewer)
            .await?;
        info!(staging_id = %id, reviewer = ?reviewer, "Submission rejected");
        self.get(id).await
    }

    fn require_key(&self, record: &StagingRecord) -> ReconcileResult<ComponentKey> {
        submission_key(&record.raw_data).ok_or_else(|| {
            ReconcileError::Validation(format!(
                "Staging record {} has no {} / {} pair",
                record.id,
                RawSubmission::PROJECT_TAG,
                RawSubmission::PANEL_LABEL
            ))
        })
    }
}
