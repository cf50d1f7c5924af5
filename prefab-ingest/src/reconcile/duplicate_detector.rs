// Reconcile stage 4: Duplicate Detector
//
// Concept: Advisory duplicate check over staged submissions and production
// Synchronization: Accepts (project, identifier) + staging pool + production keys,
// outputs DuplicateReport
//
// The report informs operator choice only. The components table's
// UNIQUE(project_id, component_id) constraint is what actually prevents
// duplicates under concurrent approvals.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use prefab_common::db::{StagingRecord, StagingStatus};

use super::types::RawSubmission;
use super::values::scalar_text;

/// (project, component identifier) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentKey {
    pub project_id: String,
    pub component_id: String,
}

impl ComponentKey {
    pub fn new(project_id: impl AsRef<str>, component_id: impl AsRef<str>) -> Self {
        Self {
            project_id: project_id.as_ref().trim().to_string(),
            component_id: component_id.as_ref().trim().to_string(),
        }
    }
}

/// Key a submission would be approved under: project tag + panel label
pub fn submission_key(raw_data: &Value) -> Option<ComponentKey> {
    let project = raw_data.get(RawSubmission::PROJECT_TAG).and_then(scalar_text)?;
    let label = raw_data.get(RawSubmission::PANEL_LABEL).and_then(scalar_text)?;
    Some(ComponentKey::new(project, label))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub project_id: String,
    pub component_id: String,
    /// Staged submissions with this pair in any status, the inspected one included
    pub staging_count: usize,
    /// The subset of `staging_count` still awaiting review
    pub pending_count: usize,
    pub staging_ids: Vec<Uuid>,
    pub production_exists: bool,
}

impl DuplicateReport {
    fn from_group(key: ComponentKey, group: &[&StagingRecord], production_exists: bool) -> Self {
        Self {
            staging_count: group.len(),
            pending_count: group
                .iter()
                .filter(|record| record.status == StagingStatus::Pending)
                .count(),
            staging_ids: group.iter().map(|record| record.id).collect(),
            production_exists,
            project_id: key.project_id,
            component_id: key.component_id,
        }
    }

    /// More than one staged submission, or already in production
    pub fn has_conflict(&self) -> bool {
        self.staging_count > 1 || self.production_exists
    }
}

/// Scan the staging pool and production keys for one pair
///
/// Every staged record with the pair counts, whatever its review status.
pub fn detect(
    project_id: &str,
    component_id: &str,
    staging: &[StagingRecord],
    production: &HashSet<ComponentKey>,
) -> DuplicateReport {
    let key = ComponentKey::new(project_id, component_id);
    let group: Vec<&StagingRecord> = staging
        .iter()
        .filter(|record| submission_key(&record.raw_data).as_ref() == Some(&key))
        .collect();

    let production_exists = production.contains(&key);
    DuplicateReport::from_group(key, &group, production_exists)
}

/// One report per distinct pair among the staged records, in key order
pub fn analyze_staging_duplicates(
    staging: &[StagingRecord],
    production: &HashSet<ComponentKey>,
) -> Vec<DuplicateReport> {
    let mut groups: BTreeMap<ComponentKey, Vec<&StagingRecord>> = BTreeMap::new();
    for record in staging {
        if let Some(key) = submission_key(&record.raw_data) {
            groups.entry(key).or_default().push(record);
        }
    }

    groups
        .into_iter()
        .map(|(key, group)| {
            let production_exists = production.contains(&key);
            DuplicateReport::from_group(key, &group, production_exists)
        })
        .collect()
}

/// Reports that need operator attention
pub fn conflicts(reports: Vec<DuplicateReport>) -> Vec<DuplicateReport> {
    reports.into_iter().filter(DuplicateReport::has_conflict).collect()
}
