// Reconcile stage 2: Schedule Merge Reconciler
//
// Concept: Join Schedule A (one row per component) with Schedule B
// (secondary attributes) on the shared row key
// Synchronization: Accepts NormalizedSubmission + DraftContext, outputs ComponentDrafts
//
// Algorithm:
// 1. Index non-blank B rows by join key
// 2. Collect every B key without an A match; any orphan aborts the merge
// 3. One draft per non-blank A row: geometry from A, weight from B,
//    shared sub-assemblies carried forward

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::error::{ReconcileError, ReconcileResult};
use super::sections::{PanelKind, SectionKind};
use super::types::{ComponentDraft, DraftContext, NormalizedSubmission, SectionRow, SubAssemblies};

const SCHEDULE_A: SectionKind = SectionKind::WallScheduleA;
const SCHEDULE_B: SectionKind = SectionKind::WallScheduleB;

/// Panel kinds whose submissions can carry a Schedule A/B pair
pub fn supports_schedules(kind: PanelKind) -> bool {
    kind == PanelKind::Wall
}

/// True when either schedule section has rows
pub fn has_schedules(normalized: &NormalizedSubmission) -> bool {
    normalized.has(SCHEDULE_A) || normalized.has(SCHEDULE_B)
}

/// B keys with no A row, in B order, without repeats
///
/// A blank B key is reported as `""`; it can never match an A row.
pub fn find_orphans(a_rows: &[SectionRow], b_rows: &[SectionRow]) -> Vec<String> {
    let a_keys: HashSet<String> = non_blank(a_rows)
        .map(|row| row.join_key(SCHEDULE_A))
        .filter(|key| !key.is_empty())
        .collect();

    let mut seen = HashSet::new();
    non_blank(b_rows)
        .map(|row| row.join_key(SCHEDULE_B))
        .filter(|key| !a_keys.contains(key))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Merge the schedule pair into one draft per Schedule A row
///
/// Fails as a whole on any orphan B row; no draft is produced in that case.
pub fn merge_schedules(
    normalized: &NormalizedSubmission,
    context: &DraftContext,
    shared: &SubAssemblies,
) -> ReconcileResult<Vec<ComponentDraft>> {
    let a_rows = normalized.rows(SCHEDULE_A);
    let b_rows = normalized.rows(SCHEDULE_B);

    let orphans = find_orphans(a_rows, b_rows);
    if !orphans.is_empty() {
        warn!(
            orphan_count = orphans.len(),
            orphans = ?orphans,
            "Schedule merge aborted: B rows without A match"
        );
        return Err(ReconcileError::OrphanScheduleRows { keys: orphans });
    }

    // Last B row wins when a key repeats
    let b_index: HashMap<String, &SectionRow> = non_blank(b_rows)
        .map(|row| (row.join_key(SCHEDULE_B), row))
        .collect();

    let drafts: Vec<ComponentDraft> = non_blank(a_rows)
        .map(|a_row| {
            let row_key = a_row.join_key(SCHEDULE_A);
            let b_row = b_index.get(&row_key);
            ComponentDraft {
                panel_kind: Some(PanelKind::Wall),
                base_label: context.base_label.clone(),
                row_key: Some(row_key).filter(|k| !k.is_empty()),
                sequence: Some(a_row.position as i64 + 1),
                length: a_row.measure("length"),
                height: a_row.measure("height"),
                area: a_row.measure("area"),
                weight: b_row.and_then(|b| b.measure("weight")),
                component_type: context.component_type.clone(),
                design_url: context.design_url.clone(),
                sub_assemblies: shared.clone(),
            }
        })
        .collect();

    debug!(
        a_rows = a_rows.len(),
        b_rows = b_rows.len(),
        drafts = drafts.len(),
        "Schedule merge complete"
    );
    Ok(drafts)
}

fn non_blank(rows: &[SectionRow]) -> impl Iterator<Item = &SectionRow> {
    rows.iter().filter(|row| !row.is_blank())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::section_normalizer::normalize;
    use crate::reconcile::types::RawSubmission;
    use serde_json::{json, Value};

    fn normalized(value: Value) -> NormalizedSubmission {
        normalize(&RawSubmission::from_value(value).unwrap())
    }

    fn context() -> DraftContext {
        DraftContext {
            base_label: "WP-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_orphan_b_key_aborts_merge() {
        let submission = normalized(json!({
            "WPScheduleA": [{"key_0": 1}, {"key_0": 2}, {"key_0": 3}],
            "WPScheduleB": [{"key_0": 2}, {"key_0": 3}, {"key_0": 4}]
        }));

        let err = merge_schedules(&submission, &context(), &SubAssemblies::default()).unwrap_err();

        match err {
            ReconcileError::OrphanScheduleRows { keys } => assert_eq!(keys, vec!["4"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_every_orphan_reported_once() {
        let submission = normalized(json!({
            "WPScheduleA": [{"key_0": "1"}],
            "WPScheduleB": [{"key_0": "9"}, {"key_0": " 7 "}, {"key_0": "9"}, {"key_1": "120"}]
        }));

        let a = submission.rows(SectionKind::WallScheduleA);
        let b = submission.rows(SectionKind::WallScheduleB);
        assert_eq!(find_orphans(a, b), vec!["9", "7", ""]);
    }

    #[test]
    fn test_b_without_a_orphans_everything() {
        let submission = normalized(json!({
            "WPScheduleB": [{"key_0": "1", "key_1": "100"}]
        }));

        let result = merge_schedules(&submission, &context(), &SubAssemblies::default());
        assert!(matches!(
            result,
            Err(ReconcileError::OrphanScheduleRows { ref keys }) if keys == &vec!["1".to_string()]
        ));
    }

    #[test]
    fn test_one_draft_per_a_row_with_b_weight() {
        let submission = normalized(json!({
            "WPScheduleA": [
                {"key_0": "1", "key_1": "12'", "key_2": "9", "key_3": "108 sqft"},
                {"key_0": "2", "key_1": "8", "key_2": "9", "key_3": "72"}
            ],
            "WPScheduleB": [{"key_0": "2", "key_1": "640 lb"}],
            "WPConnectors": [{"key_0": "A35", "key_1": "4"}]
        }));
        let shared = SubAssemblies::for_panel_kind(&submission, PanelKind::Wall);

        let drafts = merge_schedules(&submission, &context(), &shared).unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].row_key.as_deref(), Some("1"));
        assert_eq!(drafts[0].sequence, Some(1));
        assert_eq!(drafts[0].length, Some(12.0));
        assert_eq!(drafts[0].area, Some(108.0));
        assert_eq!(drafts[0].weight, None);
        assert_eq!(drafts[1].weight, Some(640.0));
        assert!(drafts
            .iter()
            .all(|d| d.sub_assemblies.connectors.len() == 1 && d.base_label == "WP-1"));
    }

    #[test]
    fn test_blank_rows_ignored() {
        let submission = normalized(json!({
            "WPScheduleA": [{"key_0": "1"}, {}, {"key_0": " "}],
            "WPScheduleB": [{}]
        }));

        let drafts =
            merge_schedules(&submission, &context(), &SubAssemblies::default()).unwrap();

        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn test_has_schedules() {
        assert!(!has_schedules(&normalized(json!({"WPConnectors": []}))));
        assert!(has_schedules(&normalized(json!({"wpscheduleb": [{"key_0": "1"}]}))));
    }
}
