// Reconcile stage 1: Section Normalizer
//
// Concept: Map arbitrarily-cased, aliased or tag-labeled input onto the
// canonical section catalogue
// Synchronization: Accepts RawSubmission, outputs NormalizedSubmission
//
// Algorithm:
// 1. Resolve every array-valued key against the alias table
// 2. Copy recognized aliases under their canonical name (originals kept)
// 3. Route flat tagged records found in unrecognized arrays to their section,
//    rebuilding positional rows from semantic hints then leftovers
// 4. Read each canonical section through its schema into typed SectionRows

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::sections::{normalize_key, resolve_section, SectionKind, SectionLookup};
use super::types::{NormalizedSubmission, RawRow, RawSubmission, SectionRow};
use super::values::scalar_text;

/// Fields that name a tagged record's section
const DISCRIMINATORS: [&str; 3] = ["tag", "section", "type"];

/// Identity/administrative fields never placed into a data slot
const SKIPPED_FIELDS: [&str; 4] = ["id", "tag", "type", "section"];

/// Produce the canonical view of a submission
///
/// Pure: the input is not modified and nothing outside the returned value
/// is touched.
pub fn normalize(raw: &RawSubmission) -> NormalizedSubmission {
    let mut out = raw.clone();
    let mut section_rows: BTreeMap<SectionKind, Vec<Value>> = BTreeMap::new();
    let mut tagged_rows: BTreeMap<SectionKind, Vec<Value>> = BTreeMap::new();
    let mut unrecognized = Vec::new();

    for (key, value) in raw.as_map() {
        let Value::Array(items) = value else {
            continue;
        };

        match resolve_section(key) {
            SectionLookup::Recognized(kind) => {
                // The canonical spelling wins over aliases; among aliases the
                // first (in key order) wins
                let is_canonical = key == kind.canonical_name();
                if is_canonical || !section_rows.contains_key(&kind) {
                    section_rows.insert(kind, items.clone());
                }
            }
            SectionLookup::Unrecognized(name) => {
                let mut routed = 0usize;
                for record in items.iter().filter_map(Value::as_object) {
                    if let Some(kind) = tagged_section(record) {
                        tagged_rows
                            .entry(kind)
                            .or_default()
                            .push(Value::Object(rebuild_row(kind, record)));
                        routed += 1;
                    }
                }
                if routed == 0 {
                    unrecognized.push(name);
                } else {
                    debug!(source = %name, routed, "Routed tagged records");
                }
            }
        }
    }

    for (kind, rows) in tagged_rows {
        section_rows.entry(kind).or_default().extend(rows);
    }

    let mut sections = BTreeMap::new();
    for (kind, rows) in section_rows {
        let typed: Vec<SectionRow> = rows
            .iter()
            .enumerate()
            .filter_map(|(position, row)| {
                row.as_object()
                    .map(|object| SectionRow::from_raw(kind, position, object))
            })
            .collect();
        out.insert(kind.canonical_name(), Value::Array(rows));
        sections.insert(kind, typed);
    }

    NormalizedSubmission {
        raw: out,
        sections,
        unrecognized,
    }
}

/// Section named by a record's discriminator field, if it is a known one
fn tagged_section(record: &RawRow) -> Option<SectionKind> {
    DISCRIMINATORS.iter().find_map(|field| {
        let name = record
            .iter()
            .find(|(key, _)| normalize_key(key) == *field)
            .and_then(|(_, value)| scalar_text(value))?;
        match resolve_section(&name) {
            SectionLookup::Recognized(kind) => Some(kind),
            SectionLookup::Unrecognized(_) => None,
        }
    })
}

fn is_row_shaped(record: &RawRow) -> bool {
    record.keys().any(|k| k.starts_with("key_"))
}

/// Rebuild a flat tagged record into a positional row
///
/// Slots are filled first from the section's per-slot hints (highest
/// priority hint first), then any unused fields go into the remaining free
/// slots in sorted field order, continuing past the schema width if needed.
/// A carried `id` is kept under `id`.
pub fn rebuild_row(kind: SectionKind, record: &RawRow) -> RawRow {
    if is_row_shaped(record) {
        return record.clone();
    }

    // Normalized name → value; first spelling in key order wins
    let mut available: BTreeMap<String, Value> = BTreeMap::new();
    for (name, value) in record {
        let normalized = normalize_key(name);
        if SKIPPED_FIELDS.contains(&normalized.as_str()) || scalar_text(value).is_none() {
            continue;
        }
        available.entry(normalized).or_insert_with(|| value.clone());
    }

    let hints = kind.config().hints;
    let mut slots: Vec<Option<Value>> = vec![None; hints.len()];
    for (slot, slot_hints) in slots.iter_mut().zip(hints) {
        for hint in slot_hints.iter() {
            if let Some(value) = available.remove(*hint) {
                *slot = Some(value);
                break;
            }
        }
    }

    let mut leftovers = available.into_values();
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        match leftovers.next() {
            Some(value) => *slot = Some(value),
            None => break,
        }
    }
    slots.extend(leftovers.map(Some));

    let mut row = Map::new();
    for (index, slot) in slots.into_iter().enumerate() {
        if let Some(value) = slot {
            row.insert(format!("key_{}", index), value);
        }
    }
    if let Some(id) = record.get("id").filter(|v| scalar_text(v).is_some()) {
        row.insert("id".to_string(), id.clone());
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(value: Value) -> RawSubmission {
        RawSubmission::from_value(value).unwrap()
    }

    #[test]
    fn test_lowercase_alias_copied_to_canonical_name() {
        let raw = submission(json!({
            "projectnametag": "P-1",
            "wppartlist": [{"key_0": "2x4", "key_1": "Stud", "key_2": "10", "key_3": "92\""}]
        }));

        let normalized = normalize(&raw);

        assert!(normalized.raw.contains_key("wppartlist"));
        assert!(normalized.raw.contains_key("WPPartList"));
        assert_eq!(normalized.rows(SectionKind::WallPartList).len(), 1);
        assert_eq!(
            normalized.rows(SectionKind::WallPartList)[0].get("label"),
            Some("Stud")
        );
        // Input untouched
        assert!(!raw.contains_key("WPPartList"));
    }

    #[test]
    fn test_canonical_key_wins_over_alias() {
        let raw = submission(json!({
            "WPConnectors": [{"key_0": "A35", "key_1": "4"}],
            "wallconnectors": [{"key_0": "H1", "key_1": "9"}, {"key_0": "H2", "key_1": "1"}]
        }));

        let normalized = normalize(&raw);

        let rows = normalized.rows(SectionKind::WallConnectors);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("label"), Some("A35"));
    }

    #[test]
    fn test_unrecognized_arrays_reported() {
        let raw = submission(json!({
            "annotations": [{"note": "see detail 4"}],
            "media_link": "https://example.test/sheet.pdf"
        }));

        let normalized = normalize(&raw);

        assert_eq!(normalized.unrecognized, vec!["annotations".to_string()]);
        assert!(normalized.sections.is_empty());
    }

    #[test]
    fn test_tagged_records_rebuilt_from_hints() {
        let raw = submission(json!({
            "items": [
                {"tag": "WPFramingTL", "Count": "6", "Total Length": "144'", "FType": "2x6 plate", "id": 11},
                {"type": "timestamps", "date": "2024-03-01", "event": "Drawn"}
            ]
        }));

        let normalized = normalize(&raw);

        let framing = normalized.rows(SectionKind::WallFramingTotals);
        assert_eq!(framing.len(), 1);
        assert_eq!(framing[0].get("ftype"), Some("2x6 plate"));
        assert_eq!(framing[0].get("total_length"), Some("144'"));
        assert_eq!(framing[0].count("count"), Some(6));
        assert_eq!(framing[0].source_id.as_deref(), Some("11"));

        let stamps = normalized.rows(SectionKind::Timestamps);
        assert_eq!(stamps[0].get("description"), Some("Drawn"));
        assert!(normalized.unrecognized.is_empty());
    }

    #[test]
    fn test_leftover_fields_fill_free_slots_in_key_order() {
        let record = json!({"section": "WPConnectors", "zeta": "z", "alpha": "a"});
        let row = rebuild_row(SectionKind::WallConnectors, record.as_object().unwrap());

        assert_eq!(row.get("key_0"), Some(&json!("a")));
        assert_eq!(row.get("key_1"), Some(&json!("z")));
        assert!(!row.contains_key("section"));
    }

    #[test]
    fn test_leftovers_extend_past_schema_width() {
        let record = json!({"tag": "WPConnectors", "label": "H1", "qty": 2, "note": "galv", "finish": "zinc"});
        let row = rebuild_row(SectionKind::WallConnectors, record.as_object().unwrap());

        assert_eq!(row.get("key_0"), Some(&json!("H1")));
        assert_eq!(row.get("key_1"), Some(&json!(2)));
        assert_eq!(row.get("key_2"), Some(&json!("zinc")));
        assert_eq!(row.get("key_3"), Some(&json!("galv")));
    }

    #[test]
    fn test_discriminator_matched_case_insensitively() {
        let raw = submission(json!({
            "extras": [
                {"Tag": "WPConnectors", "label": "A35", "count": 4},
                {"SECTION": "rpsheathing", "key_0": "OSB 7/16", "key_1": "512", "key_2": "16"}
            ]
        }));

        let normalized = normalize(&raw);

        let connectors = normalized.rows(SectionKind::WallConnectors);
        assert_eq!(connectors.len(), 1);
        assert!(!connectors[0].fields.values().any(|v| v == "WPConnectors"));
        assert_eq!(normalized.rows(SectionKind::RoofSheathing).len(), 1);
    }

    #[test]
    fn test_row_shaped_tagged_record_copied() {
        let raw = submission(json!({
            "items": [{"tag": "RPSheathing", "key_0": "OSB 7/16", "key_1": "512", "key_2": "16"}]
        }));

        let normalized = normalize(&raw);

        let rows = normalized.rows(SectionKind::RoofSheathing);
        assert_eq!(rows[0].get("description"), Some("OSB 7/16"));
        assert_eq!(rows[0].measure("panel_count"), Some(16.0));
    }

    #[test]
    fn test_tagged_rows_appended_after_existing_section_rows() {
        let raw = submission(json!({
            "WPConnectors": [{"key_0": "A35", "key_1": "4"}],
            "extras": [{"tag": "wallconnectors", "label": "H1", "count": 2}]
        }));

        let normalized = normalize(&raw);

        let rows = normalized.rows(SectionKind::WallConnectors);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].position, 1);
        assert_eq!(rows[1].get("label"), Some("H1"));
    }

    #[test]
    fn test_positions_follow_source_order() {
        let raw = submission(json!({
            "wpschedulea": [{"key_0": "3"}, {"key_0": "1"}, {"key_0": "2"}]
        }));

        let normalized = normalize(&raw);

        let keys: Vec<(usize, String)> = normalized
            .rows(SectionKind::WallScheduleA)
            .iter()
            .map(|r| (r.position, r.join_key(SectionKind::WallScheduleA)))
            .collect();
        assert_eq!(
            keys,
            vec![(0, "3".into()), (1, "1".into()), (2, "2".into())]
        );
    }
}
