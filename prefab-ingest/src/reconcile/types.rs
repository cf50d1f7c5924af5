// Shared types and data contracts between the reconciliation stages
//
// RawSubmission (parser output) → NormalizedSubmission (typed sections)
// → ComponentDraft (one per component to write) → ApprovalOutcome.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::error::ReconcileError;
use super::sections::{PanelKind, SectionKind, SubAssemblyKind};
use super::values::{parse_count, parse_measure, scalar_text};

/// One generic parser row: positional keys (`key_0`, `key_1`, …) to scalars
pub type RawRow = Map<String, Value>;

// ============================================================================
// Raw submission
// ============================================================================

/// Machine-parsed document submission
///
/// A JSON object mixing flat descriptive fields (project tag, panel label,
/// sheet title, media link, document metadata) with arrays of rows keyed by
/// section name. Section names arrive in arbitrary casing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSubmission(Map<String, Value>);

impl RawSubmission {
    pub const PROJECT_TAG: &'static str = "projectnametag";
    pub const PANEL_LABEL: &'static str = "panellabel";
    pub const SHEET_TITLE: &'static str = "sheettitle";
    pub const MEDIA_LINK: &'static str = "media_link";
    pub const LEGACY_ID: &'static str = "id";
    pub const CURRENT_STATUS: &'static str = "currentStatus";
    pub const PERCENT_COMPLETE: &'static str = "percentComplete";

    /// Identity fields scored as the "core details" pseudo-section
    pub const DETAIL_FIELDS: [&'static str; 3] =
        [Self::PROJECT_TAG, Self::PANEL_LABEL, Self::SHEET_TITLE];

    /// Accept only JSON objects
    pub fn from_value(value: Value) -> Result<Self, ReconcileError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ReconcileError::Validation(format!(
                "Submission must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Trimmed, non-empty text of a flat field
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(scalar_text)
    }

    pub fn project_tag(&self) -> Option<String> {
        self.text(Self::PROJECT_TAG)
    }

    pub fn panel_label(&self) -> Option<String> {
        self.text(Self::PANEL_LABEL)
    }

    pub fn sheet_title(&self) -> Option<String> {
        self.text(Self::SHEET_TITLE)
    }

    pub fn media_link(&self) -> Option<String> {
        self.text(Self::MEDIA_LINK)
    }

    pub fn legacy_id(&self) -> Option<String> {
        self.text(Self::LEGACY_ID)
    }

    /// Object rows stored under `key`; non-object elements are skipped
    pub fn rows(&self, key: &str) -> Vec<&RawRow> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Normalized, typed view
// ============================================================================

/// A section row with named fields
///
/// `position` is the row's index in its source array; schedule rows use it
/// as the component sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionRow {
    pub position: usize,
    /// Identifier carried by the source row, if any (legacy upserts key on it)
    pub source_id: Option<String>,
    /// Non-empty field values, keyed by schema field name
    pub fields: BTreeMap<String, String>,
}

impl SectionRow {
    /// Read a raw row through a section's schema
    ///
    /// Positional `key_N` maps to the schema's Nth field; a field already
    /// carried under its schema name is accepted when the positional key is
    /// absent or blank.
    pub fn from_raw(kind: SectionKind, position: usize, raw: &RawRow) -> Self {
        let mut fields = BTreeMap::new();
        for (index, name) in kind.config().fields.iter().enumerate() {
            let positional = raw.get(&format!("key_{}", index)).and_then(scalar_text);
            let value = positional.or_else(|| raw.get(*name).and_then(scalar_text));
            if let Some(value) = value {
                fields.insert((*name).to_string(), value);
            }
        }
        Self {
            position,
            source_id: raw.get("id").and_then(scalar_text),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_filled(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_blank(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn count(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(parse_count)
    }

    pub fn measure(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(parse_measure)
    }

    /// Join key used by the schedule reconciler: the first field, trimmed
    pub fn join_key(&self, kind: SectionKind) -> String {
        kind.config()
            .fields
            .first()
            .and_then(|f| self.get(f))
            .unwrap_or_default()
            .to_string()
    }
}

/// Output of the section normalizer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSubmission {
    /// Submission with canonical section names added beside the originals
    pub raw: RawSubmission,
    /// Recognized sections, typed
    pub sections: BTreeMap<SectionKind, Vec<SectionRow>>,
    /// Array-valued keys that matched no known section
    pub unrecognized: Vec<String>,
}

impl NormalizedSubmission {
    pub fn rows(&self, kind: SectionKind) -> &[SectionRow] {
        self.sections.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the section exists with at least one row
    pub fn has(&self, kind: SectionKind) -> bool {
        !self.rows(kind).is_empty()
    }

    /// Panel kinds with at least one populated section
    pub fn panel_kinds_present(&self) -> BTreeSet<PanelKind> {
        self.sections
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .filter_map(|(kind, _)| kind.panel_kind())
            .collect()
    }
}

// ============================================================================
// Component drafts
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartDraft {
    pub source_id: Option<String>,
    pub size: Option<String>,
    pub label: Option<String>,
    pub count: Option<i64>,
    pub cut_length: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheathingDraft {
    pub source_id: Option<String>,
    pub description: Option<String>,
    pub panel_area: Option<String>,
    pub panel_count: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDraft {
    pub source_id: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FramingDraft {
    pub source_id: Option<String>,
    pub ftype: Option<String>,
    pub total_length: Option<String>,
    pub count: Option<i64>,
}

/// Sub-assembly rows shared by every component drafted from one submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubAssemblies {
    pub parts: Vec<PartDraft>,
    pub sheathing: Vec<SheathingDraft>,
    pub connectors: Vec<ConnectorDraft>,
    pub framing: Vec<FramingDraft>,
}

impl SubAssemblies {
    /// Collect the sub-assembly rows of every section matching `include`
    pub fn collect(
        normalized: &NormalizedSubmission,
        include: impl Fn(SectionKind) -> bool,
    ) -> Self {
        let mut out = Self::default();
        for (kind, rows) in &normalized.sections {
            if !include(*kind) {
                continue;
            }
            let Some(target) = kind.sub_assembly() else {
                continue;
            };
            for row in rows.iter().filter(|r| !r.is_blank()) {
                out.push_row(target, row);
            }
        }
        out
    }

    /// Rows of the given panel kind's sections
    pub fn for_panel_kind(normalized: &NormalizedSubmission, panel_kind: PanelKind) -> Self {
        Self::collect(normalized, |kind| kind.panel_kind() == Some(panel_kind))
    }

    /// Rows of the legacy sections
    pub fn legacy(normalized: &NormalizedSubmission) -> Self {
        Self::collect(normalized, SectionKind::is_legacy)
    }

    fn push_row(&mut self, target: SubAssemblyKind, row: &SectionRow) {
        let text = |field: &str| row.get(field).map(str::to_string);
        let source_id = row.source_id.clone();
        match target {
            SubAssemblyKind::Part => self.parts.push(PartDraft {
                source_id,
                size: text("size"),
                label: text("label"),
                count: row.count("count"),
                cut_length: text("cut_length"),
            }),
            SubAssemblyKind::Sheathing => self.sheathing.push(SheathingDraft {
                source_id,
                description: text("description"),
                panel_area: text("panel_area"),
                panel_count: row.measure("panel_count"),
            }),
            SubAssemblyKind::Connector => self.connectors.push(ConnectorDraft {
                source_id,
                label: text("label"),
                description: text("description"),
                count: row.count("count"),
            }),
            SubAssemblyKind::Framing => self.framing.push(FramingDraft {
                source_id,
                ftype: text("ftype"),
                total_length: text("total_length"),
                count: row.count("count"),
            }),
        }
    }
}

/// Submission-level attributes every draft inherits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftContext {
    pub base_label: String,
    pub component_type: Option<String>,
    pub design_url: Option<String>,
}

/// One component about to be written, before its identifier is allocated
///
/// Schedule-paired drafts carry a row key and geometry; single drafts carry
/// neither. Both go through the same allocation and commit path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentDraft {
    /// `None` for the legacy single-record path
    pub panel_kind: Option<PanelKind>,
    pub base_label: String,
    pub row_key: Option<String>,
    pub sequence: Option<i64>,
    pub length: Option<f64>,
    pub height: Option<f64>,
    pub area: Option<f64>,
    pub weight: Option<f64>,
    pub component_type: Option<String>,
    pub design_url: Option<String>,
    pub sub_assemblies: SubAssemblies,
}

impl ComponentDraft {
    /// Draft without a schedule pairing
    pub fn single(
        context: &DraftContext,
        panel_kind: Option<PanelKind>,
        sub_assemblies: SubAssemblies,
    ) -> Self {
        Self {
            panel_kind,
            base_label: context.base_label.clone(),
            component_type: context.component_type.clone(),
            design_url: context.design_url.clone(),
            sub_assemblies,
            ..Default::default()
        }
    }
}

// ============================================================================
// Approval contract
// ============================================================================

/// Caller-selected duplicate resolution and execution options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApprovalOptions {
    /// Use this identifier instead of the panel label
    pub override_component_id: Option<String>,
    /// Replace an existing same-identifier component and its sub-assemblies
    pub overwrite_production: bool,
    /// Resolve identifier collisions by suffixing
    pub auto_suffix: bool,
    /// Compute the outcome without writing anything
    pub dry_run: bool,
    /// Identity recorded on the staging record
    pub approver: Option<String>,
}

impl ApprovalOptions {
    /// Any explicit resolution strategy bypasses the duplicate gate
    pub fn resolves_duplicates(&self) -> bool {
        self.override_component_id.is_some() || self.overwrite_production || self.auto_suffix
    }
}

/// How a component was (or would be) written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitAction {
    Created,
    Replaced,
    Upserted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedComponent {
    pub panel_kind: Option<PanelKind>,
    pub internal_id: String,
    pub assigned_component_id: String,
    pub action: CommitAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub project_id: String,
    pub components: Vec<ApprovedComponent>,
    pub dry_run: bool,
    /// Staged submissions in any status sharing this submission's (project, label) pair
    pub staging_duplicates: usize,
}

impl ApprovalOutcome {
    pub fn assigned_ids(&self) -> Vec<&str> {
        self.components
            .iter()
            .map(|c| c.assigned_component_id.as_str())
            .collect()
    }
}

/// Completeness breakdown shown to reviewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// 0–100 per section, keyed by canonical name
    pub section_scores: BTreeMap<String, f64>,
    pub present_sections: Vec<String>,
    pub missing_sections: Vec<String>,
    pub overall: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(RawSubmission::from_value(json!([1, 2])).is_err());
        assert!(RawSubmission::from_value(json!("x")).is_err());
        assert!(RawSubmission::from_value(json!({})).is_ok());
    }

    #[test]
    fn test_header_accessors_trim_and_stringify() {
        let raw = RawSubmission::from_value(json!({
            "projectnametag": "  P-100 ",
            "panellabel": 42,
            "sheettitle": "   ",
        }))
        .unwrap();
        assert_eq!(raw.project_tag().as_deref(), Some("P-100"));
        assert_eq!(raw.panel_label().as_deref(), Some("42"));
        assert_eq!(raw.sheet_title(), None);
        assert!(raw.contains_key("sheettitle"));
    }

    #[test]
    fn test_section_row_reads_positional_keys() {
        let raw = row(json!({"key_0": "2x6", "key_1": "Stud", "key_2": "25", "key_3": " ", "id": 7}));
        let section_row = SectionRow::from_raw(SectionKind::WallPartList, 3, &raw);
        assert_eq!(section_row.position, 3);
        assert_eq!(section_row.get("size"), Some("2x6"));
        assert_eq!(section_row.get("label"), Some("Stud"));
        assert_eq!(section_row.count("count"), Some(25));
        assert!(!section_row.is_filled("cut_length"));
        assert_eq!(section_row.source_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_section_row_accepts_named_fields() {
        let raw = row(json!({"row_key": 4, "weight": "310 lb"}));
        let section_row = SectionRow::from_raw(SectionKind::WallScheduleB, 0, &raw);
        assert_eq!(section_row.join_key(SectionKind::WallScheduleB), "4");
        assert_eq!(section_row.measure("weight"), Some(310.0));
    }

    #[test]
    fn test_sub_assemblies_skip_blank_rows() {
        let mut normalized = NormalizedSubmission::default();
        normalized.sections.insert(
            SectionKind::RoofPartList,
            vec![
                SectionRow::from_raw(
                    SectionKind::RoofPartList,
                    0,
                    &row(json!({"key_0": "2x8", "key_1": "Rafter", "key_2": "12", "key_3": "144\""})),
                ),
                SectionRow::from_raw(SectionKind::RoofPartList, 1, &row(json!({}))),
            ],
        );
        normalized.sections.insert(
            SectionKind::WallConnectors,
            vec![SectionRow::from_raw(
                SectionKind::WallConnectors,
                0,
                &row(json!({"key_0": "H2.5", "key_1": "8"})),
            )],
        );

        let roof = SubAssemblies::for_panel_kind(&normalized, PanelKind::Roof);
        assert_eq!(roof.parts.len(), 1);
        assert_eq!(roof.parts[0].count, Some(12));
        assert!(roof.connectors.is_empty());

        let wall = SubAssemblies::for_panel_kind(&normalized, PanelKind::Wall);
        assert_eq!(wall.connectors.len(), 1);
        assert!(wall.parts.is_empty() && wall.sheathing.is_empty());
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: ApprovalOptions = serde_json::from_value(json!({
            "overrideComponentId": "X-1",
            "dryRun": true
        }))
        .unwrap();
        assert_eq!(options.override_component_id.as_deref(), Some("X-1"));
        assert!(options.dry_run);
        assert!(!options.overwrite_production);
        assert!(options.resolves_duplicates());
        assert!(!ApprovalOptions::default().resolves_duplicates());
    }
}
