// Reconcile stage (independent): Confidence Scorer
//
// Concept: 0–100 completeness score per section and overall
// Synchronization: Accepts RawSubmission or NormalizedSubmission, outputs ScoreBreakdown
//
// Algorithm:
// 1. Row completeness = filled required fields / required fields
// 2. Section score = mean row completeness × 100 (0 when absent or empty)
// 3. Core details = the three identity fields scored as one pseudo-row
// 4. Overall = mean over the mode's denominator:
//    strict       → expected sections for the detected panel kind (+ details)
//    proportional → present expected sections (+ details, + zeros for missing if penalized)

use std::collections::BTreeMap;

use prefab_common::config::{ScoringConfig, ScoringMode};

use super::section_normalizer::normalize;
use super::sections::{PanelKind, SectionConfig, SectionKind};
use super::types::{NormalizedSubmission, RawSubmission, ScoreBreakdown, SectionRow};

/// Key the core-details pseudo-section is reported under
pub const DETAILS_KEY: &str = "details";

/// Completeness of one row in [0.0, 1.0]
pub fn row_completeness(row: &SectionRow, config: &SectionConfig) -> f64 {
    if config.required.is_empty() {
        return 1.0;
    }
    let filled = config
        .required
        .iter()
        .filter(|field| row.is_filled(field))
        .count();
    filled as f64 / config.required.len() as f64
}

/// Section score in [0, 100]; exactly 0 for an empty section
pub fn section_score(rows: &[SectionRow], config: &SectionConfig) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let total: f64 = rows.iter().map(|row| row_completeness(row, config)).sum();
    total / rows.len() as f64 * 100.0
}

/// Confidence scorer
///
/// Pure: reads the submission, never mutates it.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    mode: ScoringMode,
    include_details: bool,
    penalize_missing: bool,
    /// Overrides panel-kind detection
    panel_kind: Option<PanelKind>,
    /// Overrides the expected-section set entirely
    expected: Option<Vec<SectionKind>>,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Proportional,
            include_details: true,
            penalize_missing: false,
            panel_kind: None,
            expected: None,
        }
    }
}

impl ConfidenceScorer {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            mode: config.mode,
            include_details: config.include_details,
            penalize_missing: config.penalize_missing,
            ..Default::default()
        }
    }

    pub fn strict() -> Self {
        Self {
            mode: ScoringMode::Strict,
            ..Default::default()
        }
    }

    pub fn with_panel_kind(mut self, kind: PanelKind) -> Self {
        self.panel_kind = Some(kind);
        self
    }

    pub fn with_expected_sections(mut self, sections: Vec<SectionKind>) -> Self {
        self.expected = Some(sections);
        self
    }

    pub fn with_penalize_missing(mut self, penalize: bool) -> Self {
        self.penalize_missing = penalize;
        self
    }

    pub fn with_details(mut self, include: bool) -> Self {
        self.include_details = include;
        self
    }

    pub fn score(&self, raw: &RawSubmission) -> ScoreBreakdown {
        self.score_normalized(&normalize(raw))
    }

    pub fn score_normalized(&self, normalized: &NormalizedSubmission) -> ScoreBreakdown {
        let expected = self.expected_sections(&normalized.raw);

        let mut section_scores = BTreeMap::new();
        for kind in SectionKind::SCORED.iter().chain(expected.iter()) {
            section_scores
                .entry(kind.canonical_name().to_string())
                .or_insert_with(|| section_score(normalized.rows(*kind), kind.config()));
        }

        // Sections of another panel kind are reported but never averaged
        let (present, missing): (Vec<SectionKind>, Vec<SectionKind>) =
            expected.iter().copied().partition(|kind| normalized.has(*kind));

        let details = self.details_score(&normalized.raw);
        if let Some(score) = details {
            section_scores.insert(DETAILS_KEY.to_string(), score);
        }

        let score_of = |kind: &SectionKind| {
            section_scores
                .get(kind.canonical_name())
                .copied()
                .unwrap_or(0.0)
        };
        let mut entries: Vec<f64> = match self.mode {
            ScoringMode::Strict => expected.iter().map(score_of).collect(),
            ScoringMode::Proportional => {
                let mut entries: Vec<f64> = present.iter().map(score_of).collect();
                if self.penalize_missing {
                    entries.extend(missing.iter().map(|_| 0.0));
                }
                entries
            }
        };
        entries.extend(details);

        let overall = if entries.is_empty() {
            0.0
        } else {
            entries.iter().sum::<f64>() / entries.len() as f64
        };

        ScoreBreakdown {
            section_scores,
            present_sections: names(&present),
            missing_sections: names(&missing),
            overall,
        }
    }

    fn expected_sections(&self, raw: &RawSubmission) -> Vec<SectionKind> {
        if let Some(expected) = &self.expected {
            return expected.clone();
        }
        let kind = self.panel_kind.or_else(|| {
            PanelKind::detect(raw.panel_label().as_deref(), raw.sheet_title().as_deref())
        });
        match kind {
            Some(kind) => kind.expected_sections().to_vec(),
            None => SectionKind::SCORED.to_vec(),
        }
    }

    /// Core-details score; `None` when disabled or no detail key is present
    fn details_score(&self, raw: &RawSubmission) -> Option<f64> {
        if !self.include_details {
            return None;
        }
        let fields = RawSubmission::DETAIL_FIELDS;
        if !fields.iter().any(|f| raw.contains_key(f)) {
            return None;
        }
        let filled = fields.iter().filter(|f| raw.text(f).is_some()).count();
        Some(filled as f64 / fields.len() as f64 * 100.0)
    }
}

fn names(kinds: &[SectionKind]) -> Vec<String> {
    kinds.iter().map(|k| k.canonical_name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn submission(value: Value) -> RawSubmission {
        RawSubmission::from_value(value).unwrap()
    }

    fn row(kind: SectionKind, value: Value) -> SectionRow {
        SectionRow::from_raw(kind, 0, value.as_object().unwrap())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_section_scores_zero() {
        assert_eq!(section_score(&[], SectionKind::WallPartList.config()), 0.0);
    }

    #[test]
    fn test_full_row_scores_hundred() {
        let kind = SectionKind::WallPartList;
        let rows = vec![row(
            kind,
            json!({"key_0": "2x4", "key_1": "Stud", "key_2": "10", "key_3": "92"}),
        )];
        assert_eq!(section_score(&rows, kind.config()), 100.0);
    }

    #[test]
    fn test_section_score_is_mean_of_rows() {
        let kind = SectionKind::WallConnectors;
        let rows = vec![
            row(kind, json!({"key_0": "A35", "key_1": "4"})),
            row(kind, json!({"key_0": "H1"})),
        ];
        assert!(approx(section_score(&rows, kind.config()), 75.0));
    }

    #[test]
    fn test_filling_a_field_never_decreases_completeness() {
        let kind = SectionKind::FloorConnectors;
        let config = kind.config();
        let mut value = json!({});
        let mut previous = row_completeness(&row(kind, value.clone()), config);
        for (index, text) in ["LUS28", "hanger", "12"].iter().enumerate() {
            value[format!("key_{}", index)] = json!(text);
            let current = row_completeness(&row(kind, value.clone()), config);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn test_strict_counts_missing_expected_sections_as_zero() {
        let raw = submission(json!({
            "panellabel": "RP-7",
            "RPSheathing": [{"key_0": "OSB", "key_1": "512", "key_2": "16"}]
        }));

        let breakdown = ConfidenceScorer::strict().with_details(false).score(&raw);

        // RPSheathing 100, RPPartList 0, timestamps 0
        assert!(approx(breakdown.overall, 100.0 / 3.0));
        assert_eq!(breakdown.present_sections, vec!["RPSheathing"]);
        assert_eq!(breakdown.missing_sections, vec!["RPPartList", "timestamps"]);
    }

    #[test]
    fn test_strict_includes_details_pseudo_section() {
        let raw = submission(json!({
            "projectnametag": "P-1",
            "panellabel": "RP-7",
            "RPSheathing": [{"key_0": "OSB", "key_1": "512", "key_2": "16"}]
        }));

        let breakdown = ConfidenceScorer::strict().score(&raw);

        let details = 200.0 / 3.0;
        assert!(approx(breakdown.section_scores[DETAILS_KEY], details));
        assert!(approx(breakdown.overall, (100.0 + details) / 4.0));
    }

    #[test]
    fn test_proportional_ignores_missing_unless_penalized() {
        let raw = submission(json!({
            "panellabel": "FP-2",
            "FPConnectors": [{"key_0": "LUS28", "key_1": "hanger", "key_2": "12"}],
            "FPPartList": [{"key_0": "2x10", "key_1": "Joist"}]
        }));

        let lenient = ConfidenceScorer::default().with_details(false).score(&raw);
        assert!(approx(lenient.overall, 75.0));

        let penalized = ConfidenceScorer::default()
            .with_details(false)
            .with_penalize_missing(true)
            .score(&raw);
        // FPSheathing and timestamps missing
        assert!(approx(penalized.overall, 150.0 / 4.0));
    }

    #[test]
    fn test_unknown_panel_kind_expects_every_scored_section() {
        let raw = submission(json!({
            "timestamps": [{"key_0": "2024-01-01", "key_1": "Issued"}]
        }));

        let breakdown = ConfidenceScorer::strict().score(&raw);

        assert_eq!(breakdown.missing_sections.len(), SectionKind::SCORED.len() - 1);
        assert!(approx(breakdown.overall, 10.0));
        assert!(!breakdown.section_scores.contains_key(DETAILS_KEY));
    }

    #[test]
    fn test_every_scored_section_reported() {
        let breakdown = ConfidenceScorer::default().score(&RawSubmission::default());
        assert_eq!(breakdown.section_scores.len(), SectionKind::SCORED.len());
        assert_eq!(breakdown.overall, 0.0);
    }

    #[test]
    fn test_aliased_sections_scored_under_canonical_name() {
        let raw = submission(json!({
            "panellabel": "WP-3",
            "wpconnectors": [{"key_0": "A35", "key_1": "4"}]
        }));

        let breakdown = ConfidenceScorer::default().with_details(false).score(&raw);

        assert_eq!(breakdown.section_scores["WPConnectors"], 100.0);
        assert_eq!(breakdown.overall, 100.0);
    }

    #[test]
    fn test_proportional_averages_only_expected_sections() {
        let raw = submission(json!({
            "panellabel": "RP-7",
            "RPSheathing": [{"key_0": "OSB", "key_1": "512", "key_2": "16"}],
            "WPConnectors": [{"key_0": "A35"}]
        }));

        let breakdown = ConfidenceScorer::default().with_details(false).score(&raw);

        assert_eq!(breakdown.overall, 100.0);
        assert_eq!(breakdown.present_sections, vec!["RPSheathing"]);
        assert!(approx(breakdown.section_scores["WPConnectors"], 50.0));
    }

    #[test]
    fn test_unscored_expected_section_is_scored_on_demand() {
        let raw = submission(json!({
            "panellabel": "WP-1",
            "WPScheduleA": [{"key_0": "1"}]
        }));

        let breakdown = ConfidenceScorer::strict()
            .with_details(false)
            .with_expected_sections(vec![SectionKind::WallScheduleA])
            .score(&raw);

        assert_eq!(breakdown.present_sections, vec!["WPScheduleA"]);
        assert!(breakdown.section_scores.contains_key("WPScheduleA"));
        assert!(breakdown.missing_sections.is_empty());
    }

    #[test]
    fn test_explicit_panel_kind_overrides_detection() {
        let raw = submission(json!({"panellabel": "RP-1"}));
        let breakdown = ConfidenceScorer::strict()
            .with_details(false)
            .with_panel_kind(PanelKind::Wall)
            .score(&raw);
        assert_eq!(breakdown.missing_sections.len(), 5);
    }
}
