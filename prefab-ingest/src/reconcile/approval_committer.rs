// Reconcile stage 5: Approval Committer
//
// Concept: Turn a reconciled submission into canonical production records
// Synchronization: Accepts RawSubmission + ApprovalOptions, reads the
// ProductionStore, outputs a CommitPlan applied in one transaction
//
// Algorithm:
// 1. Validate the project tag; for staged input, require a pending record
// 2. Normalize and plan one draft per component:
//    schedule pair → one draft per Schedule A row (merge may fail as a whole)
//    other panel kinds → one draft per kind
//    no panel sections → one legacy draft keyed by the submission's own id
// 3. Duplicate gate: without override/overwrite/auto-suffix, any candidate
//    already in production is reported back to the caller
// 4. Allocate identifiers against production ∪ this batch
// 5. Dry run stops here; otherwise apply the plan and approve the staging record

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use prefab_common::db::{
    ComponentRecord, ComponentWithParts, ConnectorRecord, FramingSegmentRecord, PartRecord,
    SheathingRecord, StagingRecord, StagingStatus,
};

use super::duplicate_detector::detect;
use super::error::{ReconcileError, ReconcileResult};
use super::identity_allocator::{candidate, IdentityAllocator};
use super::sections::PanelKind;
use super::schedule_merge::{has_schedules, merge_schedules, supports_schedules};
use super::section_normalizer::normalize;
use super::types::{
    ApprovalOptions, ApprovalOutcome, ApprovedComponent, CommitAction, ComponentDraft,
    DraftContext, NormalizedSubmission, RawSubmission, SubAssemblies,
};
use super::values::{parse_measure, scalar_text};
use crate::db::ProductionStore;

/// Status given to newly created components
pub const DEFAULT_COMPONENT_STATUS: &str = "Scheduling";

/// How the store writes one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Insert a new component and its sub-assemblies
    Create,
    /// Rewrite an existing component; its sub-assemblies are deleted and recreated
    Replace,
    /// Insert or update by internal id; sub-assemblies likewise
    Upsert,
}

impl WriteMode {
    fn action(self) -> CommitAction {
        match self {
            Self::Create => CommitAction::Created,
            Self::Replace => CommitAction::Replaced,
            Self::Upsert => CommitAction::Upserted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentWrite {
    pub mode: WriteMode,
    pub panel_kind: Option<PanelKind>,
    pub record: ComponentWithParts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingTransition {
    pub id: Uuid,
    pub reviewed_by: Option<String>,
}

/// Every mutation one approval performs; applied atomically or not at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub project_id: String,
    pub create_project: bool,
    pub writes: Vec<ComponentWrite>,
    pub staging: Option<StagingTransition>,
}

/// Reject anything but `pending → next`
pub fn ensure_transition(record: &StagingRecord, next: StagingStatus) -> ReconcileResult<()> {
    if record.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(ReconcileError::InvalidTransition {
            id: record.id,
            from: record.status,
            to: next,
        })
    }
}

/// Plan component drafts for a normalized submission
///
/// Both the paired-schedule path and the single-record path produce the same
/// `ComponentDraft`, so allocation and commit never branch on which one ran.
pub fn plan_drafts(
    normalized: &NormalizedSubmission,
    options: &ApprovalOptions,
) -> ReconcileResult<Vec<ComponentDraft>> {
    let raw = &normalized.raw;
    let kinds = normalized.panel_kinds_present();
    let override_id = options
        .override_component_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let mut context = DraftContext {
        base_label: String::new(),
        component_type: raw.sheet_title(),
        design_url: raw.media_link(),
    };

    if kinds.is_empty() {
        let legacy_id = raw.legacy_id().ok_or_else(|| {
            ReconcileError::Validation(
                "Submission has no panel sections and no id for a legacy record".to_string(),
            )
        })?;
        context.base_label = override_id
            .or_else(|| raw.panel_label())
            .unwrap_or_else(|| legacy_id.clone());
        return Ok(vec![ComponentDraft::single(
            &context,
            None,
            SubAssemblies::legacy(normalized),
        )]);
    }

    context.base_label = override_id.or_else(|| raw.panel_label()).ok_or_else(|| {
        ReconcileError::Validation(format!("Missing {}", RawSubmission::PANEL_LABEL))
    })?;

    let mut drafts = Vec::new();
    for kind in kinds {
        let shared = SubAssemblies::for_panel_kind(normalized, kind);
        if supports_schedules(kind) && has_schedules(normalized) {
            drafts.extend(merge_schedules(normalized, &context, &shared)?);
        } else {
            drafts.push(ComponentDraft::single(&context, Some(kind), shared));
        }
    }
    Ok(drafts)
}

/// Approval committer
pub struct ApprovalCommitter<S: ProductionStore> {
    store: Arc<S>,
    allocator: IdentityAllocator,
}

impl<S: ProductionStore> ApprovalCommitter<S> {
    pub fn new(store: Arc<S>, allocator: IdentityAllocator) -> Self {
        Self { store, allocator }
    }

    /// Approve a staged submission by id
    pub async fn approve_staging(
        &self,
        id: Uuid,
        options: &ApprovalOptions,
    ) -> ReconcileResult<ApprovalOutcome> {
        let record = self
            .store
            .find_staging(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("Staging record {}", id)))?;
        ensure_transition(&record, StagingStatus::Approved)?;

        let raw = RawSubmission::from_value(record.raw_data.clone())?;
        self.commit(&raw, Some(record.id), options).await
    }

    /// Approve a submission that was never staged
    pub async fn approve(
        &self,
        raw: &RawSubmission,
        options: &ApprovalOptions,
    ) -> ReconcileResult<ApprovalOutcome> {
        self.commit(raw, None, options).await
    }

    async fn commit(
        &self,
        raw: &RawSubmission,
        staging_id: Option<Uuid>,
        options: &ApprovalOptions,
    ) -> ReconcileResult<ApprovalOutcome> {
        let plan = self.plan(raw, staging_id, options).await?;
        let outcome = outcome_of(&plan, options.dry_run, self.staging_count(raw, &plan).await?);

        if options.dry_run {
            info!(
                project_id = %plan.project_id,
                components = plan.writes.len(),
                "Dry-run approval computed"
            );
            return Ok(outcome);
        }

        if let Err(err) = self.store.apply_plan(&plan).await {
            if err.is_unique_violation() {
                let component_id = plan
                    .writes
                    .iter()
                    .map(|w| w.record.component.component_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ReconcileError::DuplicateComponent {
                    project_id: plan.project_id,
                    component_id,
                    staging_count: outcome.staging_duplicates,
                    production_exists: true,
                });
            }
            error!(
                project_id = %plan.project_id,
                staging_id = ?staging_id,
                error = %err,
                "Approval commit failed"
            );
            return Err(err.into());
        }

        info!(
            project_id = %plan.project_id,
            staging_id = ?staging_id,
            assigned = ?outcome.assigned_ids(),
            "Approval committed"
        );
        Ok(outcome)
    }

    /// Compute every write without performing any
    pub async fn plan(
        &self,
        raw: &RawSubmission,
        staging_id: Option<Uuid>,
        options: &ApprovalOptions,
    ) -> ReconcileResult<CommitPlan> {
        let project_id = raw.project_tag().ok_or_else(|| {
            ReconcileError::Validation(format!("Missing {}", RawSubmission::PROJECT_TAG))
        })?;

        let normalized = normalize(raw);
        let drafts = plan_drafts(&normalized, options)?;
        let legacy_id = if drafts.iter().all(|d| d.panel_kind.is_none()) {
            raw.legacy_id()
        } else {
            None
        };

        let create_project = !self.store.project_exists(&project_id).await?;
        let mut production_ids = self.store.component_ids(&project_id).await?;

        // Re-approving a legacy record must not collide with itself
        if let Some(id) = &legacy_id {
            if let Some(existing) = self.store.find_component_by_id(id).await? {
                if existing.project_id == project_id {
                    production_ids.remove(&existing.component_id);
                }
            }
        }

        if !options.resolves_duplicates() {
            self.duplicate_gate(&project_id, &drafts, &production_ids)
                .await?;
        }

        let mut taken = production_ids.clone();
        let mut writes = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            let wanted = candidate(&draft.base_label, draft.row_key.as_deref());

            // A legacy record's own identifier was removed from production_ids
            // above, so only a different component can be replaced here
            let write = if options.overwrite_production && production_ids.contains(&wanted) {
                let existing = self
                    .store
                    .find_component(&project_id, &wanted)
                    .await?
                    .ok_or_else(|| ReconcileError::NotFound(format!("Component {}", wanted)))?;
                // Claimed: a later draft in this batch must suffix instead
                production_ids.remove(&wanted);
                let record = build_record(
                    raw,
                    &project_id,
                    draft,
                    existing.id.clone(),
                    &wanted,
                    Some(&existing),
                    false,
                );
                ComponentWrite {
                    mode: WriteMode::Replace,
                    panel_kind: draft.panel_kind,
                    record,
                }
            } else {
                let component_id =
                    self.allocator
                        .allocate(&draft.base_label, draft.row_key.as_deref(), &mut taken)?;
                let (mode, internal_id) = match &legacy_id {
                    Some(id) => (WriteMode::Upsert, id.clone()),
                    None => (WriteMode::Create, Uuid::new_v4().to_string()),
                };
                let stable_children = mode == WriteMode::Upsert;
                ComponentWrite {
                    mode,
                    panel_kind: draft.panel_kind,
                    record: build_record(
                        raw,
                        &project_id,
                        draft,
                        internal_id,
                        &component_id,
                        None,
                        stable_children,
                    ),
                }
            };
            taken.insert(write.record.component.component_id.clone());
            writes.push(write);
        }

        debug!(
            project_id = %project_id,
            drafts = drafts.len(),
            create_project,
            "Approval planned"
        );

        Ok(CommitPlan {
            project_id,
            create_project,
            writes,
            staging: staging_id.map(|id| StagingTransition {
                id,
                reviewed_by: options.approver.clone(),
            }),
        })
    }

    async fn duplicate_gate(
        &self,
        project_id: &str,
        drafts: &[ComponentDraft],
        production_ids: &HashSet<String>,
    ) -> ReconcileResult<()> {
        let Some(conflict) = drafts
            .iter()
            .map(|d| candidate(&d.base_label, d.row_key.as_deref()))
            .find(|c| production_ids.contains(c))
        else {
            return Ok(());
        };

        let staged = self.store.list_staging(None).await?;
        let label = drafts
            .first()
            .map(|d| d.base_label.as_str())
            .unwrap_or_default();
        let report = detect(project_id, label, &staged, &HashSet::new());
        info!(
            project_id = %project_id,
            component_id = %conflict,
            staging_count = report.staging_count,
            "Approval blocked by existing component"
        );
        Err(ReconcileError::DuplicateComponent {
            project_id: project_id.to_string(),
            component_id: conflict,
            staging_count: report.staging_count,
            production_exists: true,
        })
    }

    async fn staging_count(&self, raw: &RawSubmission, plan: &CommitPlan) -> ReconcileResult<usize> {
        let Some(label) = raw.panel_label() else {
            return Ok(0);
        };
        let staged = self.store.list_staging(None).await?;
        Ok(detect(&plan.project_id, &label, &staged, &HashSet::new()).staging_count)
    }
}

fn outcome_of(plan: &CommitPlan, dry_run: bool, staging_duplicates: usize) -> ApprovalOutcome {
    ApprovalOutcome {
        project_id: plan.project_id.clone(),
        components: plan
            .writes
            .iter()
            .map(|w| ApprovedComponent {
                panel_kind: w.panel_kind,
                internal_id: w.record.component.id.clone(),
                assigned_component_id: w.record.component.component_id.clone(),
                action: w.mode.action(),
            })
            .collect(),
        dry_run,
        staging_duplicates,
    }
}

/// Assemble the persisted records for one draft
///
/// `existing` keeps the production status and progress of a replaced
/// component. `stable_children` derives sub-assembly ids from their source
/// ids so a repeated legacy approval updates rows instead of appending.
fn build_record(
    raw: &RawSubmission,
    project_id: &str,
    draft: &ComponentDraft,
    internal_id: String,
    component_id: &str,
    existing: Option<&ComponentRecord>,
    stable_children: bool,
) -> ComponentWithParts {
    let (current_status, percent_complete) = match existing {
        Some(record) => (record.current_status.clone(), record.percent_complete),
        None => (
            raw.text(RawSubmission::CURRENT_STATUS)
                .unwrap_or_else(|| DEFAULT_COMPONENT_STATUS.to_string()),
            raw.get(RawSubmission::PERCENT_COMPLETE)
                .and_then(scalar_text)
                .and_then(|t| parse_measure(&t))
                .unwrap_or(0.0),
        ),
    };

    let child_id = |source: &Option<String>| match source {
        Some(source) if stable_children => format!("{}-{}", internal_id, source),
        _ => Uuid::new_v4().to_string(),
    };
    let subs = &draft.sub_assemblies;

    ComponentWithParts {
        parts: subs
            .parts
            .iter()
            .map(|p| PartRecord {
                id: child_id(&p.source_id),
                component_ref: internal_id.clone(),
                size: p.size.clone(),
                label: p.label.clone(),
                count: p.count,
                cut_length: p.cut_length.clone(),
            })
            .collect(),
        sheathing: subs
            .sheathing
            .iter()
            .map(|s| SheathingRecord {
                id: child_id(&s.source_id),
                component_ref: internal_id.clone(),
                description: s.description.clone(),
                panel_area: s.panel_area.clone(),
                panel_count: s.panel_count,
            })
            .collect(),
        connectors: subs
            .connectors
            .iter()
            .map(|c| ConnectorRecord {
                id: child_id(&c.source_id),
                component_ref: internal_id.clone(),
                label: c.label.clone(),
                description: c.description.clone(),
                count: c.count,
            })
            .collect(),
        framing: subs
            .framing
            .iter()
            .map(|f| FramingSegmentRecord {
                id: child_id(&f.source_id),
                component_ref: internal_id.clone(),
                ftype: f.ftype.clone(),
                total_length: f.total_length.clone(),
                count: f.count,
            })
            .collect(),
        component: ComponentRecord {
            id: internal_id.clone(),
            project_id: project_id.to_string(),
            component_id: component_id.to_string(),
            panel_kind: draft.panel_kind.map(|k| k.as_str().to_string()),
            component_type: draft.component_type.clone(),
            design_url: draft.design_url.clone(),
            sequence: draft.sequence,
            length: draft.length,
            height: draft.height,
            weight: draft.weight,
            area: draft.area,
            current_status,
            percent_complete,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::types::PartDraft;
    use serde_json::{json, Value};

    fn normalized(value: Value) -> NormalizedSubmission {
        normalize(&RawSubmission::from_value(value).unwrap())
    }

    #[test]
    fn test_wall_schedule_produces_draft_per_row() {
        let submission = normalized(json!({
            "projectnametag": "P",
            "panellabel": "WP-1",
            "WPScheduleA": [{"key_0": "1"}, {"key_0": "2"}],
            "WPPartList": [{"key_0": "2x4", "key_1": "Stud", "key_2": "10"}]
        }));

        let drafts = plan_drafts(&submission, &ApprovalOptions::default()).unwrap();

        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.panel_kind == Some(PanelKind::Wall)));
        assert_eq!(drafts[1].row_key.as_deref(), Some("2"));
        assert_eq!(drafts[1].sub_assemblies.parts.len(), 1);
    }

    #[test]
    fn test_one_draft_per_panel_kind_in_fixed_order() {
        let submission = normalized(json!({
            "projectnametag": "P",
            "panellabel": "MIX-1",
            "WPConnectors": [{"key_0": "A35", "key_1": "4"}],
            "RPSheathing": [{"key_0": "OSB", "key_1": "512", "key_2": "16"}]
        }));

        let drafts = plan_drafts(&submission, &ApprovalOptions::default()).unwrap();

        let kinds: Vec<_> = drafts.iter().map(|d| d.panel_kind).collect();
        assert_eq!(kinds, vec![Some(PanelKind::Roof), Some(PanelKind::Wall)]);
        assert!(drafts[0].sub_assemblies.connectors.is_empty());
        assert_eq!(drafts[1].sub_assemblies.connectors.len(), 1);
    }

    #[test]
    fn test_override_replaces_panel_label() {
        let submission = normalized(json!({
            "panellabel": "FP-1",
            "FPPartList": [{"key_0": "2x10"}]
        }));
        let options = ApprovalOptions {
            override_component_id: Some("FP-1-REV".to_string()),
            ..Default::default()
        };

        let drafts = plan_drafts(&submission, &options).unwrap();

        assert_eq!(drafts[0].base_label, "FP-1-REV");
    }

    #[test]
    fn test_panel_path_requires_label() {
        let submission = normalized(json!({"RPPartList": [{"key_0": "2x8"}]}));
        assert!(matches!(
            plan_drafts(&submission, &ApprovalOptions::default()),
            Err(ReconcileError::Validation(_))
        ));
    }

    #[test]
    fn test_legacy_path_uses_submission_id() {
        let submission = normalized(json!({
            "id": "legacy-9",
            "assemblypartlist": [{"key_0": "2x6", "key_1": "Plate", "key_2": "2", "id": "p1"}],
            "framingtl": [{"key_0": "stud", "key_1": "96'", "key_2": "12"}]
        }));

        let drafts = plan_drafts(&submission, &ApprovalOptions::default()).unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].panel_kind, None);
        assert_eq!(drafts[0].base_label, "legacy-9");
        assert_eq!(drafts[0].sub_assemblies.parts[0].source_id.as_deref(), Some("p1"));
        assert_eq!(drafts[0].sub_assemblies.framing.len(), 1);
    }

    #[test]
    fn test_legacy_path_without_id_is_invalid() {
        let submission = normalized(json!({"panellabel": "X"}));
        assert!(matches!(
            plan_drafts(&submission, &ApprovalOptions::default()),
            Err(ReconcileError::Validation(_))
        ));
    }

    #[test]
    fn test_orphans_abort_planning() {
        let submission = normalized(json!({
            "panellabel": "WP-1",
            "WPScheduleA": [{"key_0": "1"}],
            "WPScheduleB": [{"key_0": "5"}]
        }));
        assert!(matches!(
            plan_drafts(&submission, &ApprovalOptions::default()),
            Err(ReconcileError::OrphanScheduleRows { .. })
        ));
    }

    #[test]
    fn test_build_record_defaults_and_stable_children() {
        let raw = RawSubmission::from_value(json!({"percentComplete": "40%"})).unwrap();
        let draft = ComponentDraft {
            base_label: "L".into(),
            sub_assemblies: SubAssemblies {
                parts: vec![PartDraft {
                    source_id: Some("p1".into()),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };

        let record = build_record(&raw, "P", &draft, "legacy-1".into(), "L", None, true);

        assert_eq!(record.component.current_status, DEFAULT_COMPONENT_STATUS);
        assert_eq!(record.component.percent_complete, 40.0);
        assert_eq!(record.parts[0].id, "legacy-1-p1");
        assert_eq!(record.parts[0].component_ref, "legacy-1");
    }

    #[test]
    fn test_ensure_transition() {
        let mut record = StagingRecord::new(json!({}));
        assert!(ensure_transition(&record, StagingStatus::Approved).is_ok());
        record.status = StagingStatus::Rejected;
        assert!(matches!(
            ensure_transition(&record, StagingStatus::Approved),
            Err(ReconcileError::InvalidTransition { .. })
        ));
    }
}
