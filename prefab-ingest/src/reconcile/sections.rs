//! Section catalogue
//!
//! Every section a submission can carry, its named fields (positional order
//! matches the parser's `key_0..key_N` columns), the fields the confidence
//! scorer requires, and the alias table the normalizer resolves names against.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Roof / floor / wall classification of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    Roof,
    Floor,
    Wall,
}

impl PanelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roof => "roof",
            Self::Floor => "floor",
            Self::Wall => "wall",
        }
    }

    /// Sections a complete submission of this kind is expected to carry
    pub fn expected_sections(self) -> &'static [SectionKind] {
        use SectionKind::*;
        match self {
            Self::Roof => &[RoofSheathing, RoofPartList, Timestamps],
            Self::Floor => &[FloorConnectors, FloorPartList, FloorSheathing, Timestamps],
            Self::Wall => &[
                WallConnectors,
                WallFramingTotals,
                WallPartList,
                WallSheathing,
                Timestamps,
            ],
        }
    }

    /// Infer the kind from the panel label and sheet title
    ///
    /// Case-insensitive. Roof markers win over floor markers, which win over
    /// wall markers. A marker is either the two-letter token (`rp`, `fp`, `wp`)
    /// standing alone or the word anywhere in the text.
    pub fn detect(label: Option<&str>, title: Option<&str>) -> Option<PanelKind> {
        let source = format!(
            "{} {}",
            label.unwrap_or_default(),
            title.unwrap_or_default()
        )
        .to_lowercase();
        let tokens: Vec<&str> = source
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let markers = [
            (PanelKind::Roof, "rp", "roof"),
            (PanelKind::Floor, "fp", "floor"),
            (PanelKind::Wall, "wp", "wall"),
        ];
        markers
            .iter()
            .find(|(_, token, word)| tokens.contains(token) || source.contains(word))
            .map(|(kind, _, _)| *kind)
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sub-assembly table a section's rows become
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubAssemblyKind {
    Part,
    Sheathing,
    Connector,
    Framing,
}

/// Field layout of one section
#[derive(Debug)]
pub struct SectionConfig {
    /// Named fields in positional order
    pub fields: &'static [&'static str],
    /// Fields that must be non-empty for a row to be complete
    pub required: &'static [&'static str],
    /// Per-slot field-name hints used to rebuild flat tagged records,
    /// highest priority first; names are in normalized form
    pub hints: &'static [&'static [&'static str]],
}

static PART_LIST: SectionConfig = SectionConfig {
    fields: &["size", "label", "count", "cut_length"],
    required: &["size", "label", "count", "cut_length"],
    hints: &[
        &["size", "dimension", "dim"],
        &["label", "name", "part", "description"],
        &["count", "qty", "quantity"],
        &["cutlength", "length", "cut"],
    ],
};

static SHEATHING: SectionConfig = SectionConfig {
    fields: &["description", "panel_area", "panel_count"],
    required: &["description", "panel_area", "panel_count"],
    hints: &[
        &["description", "material", "name", "label"],
        &["panelarea", "area", "sqft"],
        &["panelcount", "count", "qty", "quantity"],
    ],
};

static FLOOR_CONNECTORS: SectionConfig = SectionConfig {
    fields: &["label", "description", "count"],
    required: &["label", "description", "count"],
    hints: &[
        &["label", "name", "connector", "model"],
        &["description", "desc", "kind"],
        &["count", "qty", "quantity"],
    ],
};

static WALL_CONNECTORS: SectionConfig = SectionConfig {
    fields: &["label", "count"],
    required: &["label", "count"],
    hints: &[
        &["label", "name", "connector", "model"],
        &["count", "qty", "quantity"],
    ],
};

static FRAMING_TOTALS: SectionConfig = SectionConfig {
    fields: &["ftype", "total_length", "count"],
    required: &["ftype", "total_length", "count"],
    hints: &[
        &["ftype", "framingtype", "member", "kind"],
        &["totallength", "length", "total"],
        &["count", "qty", "quantity"],
    ],
};

static TIMESTAMPS: SectionConfig = SectionConfig {
    fields: &["date", "description"],
    required: &["date", "description"],
    hints: &[
        &["date", "timestamp", "time"],
        &["description", "event", "note", "label"],
    ],
};

static SCHEDULE_A: SectionConfig = SectionConfig {
    fields: &["row_key", "length", "height", "area"],
    required: &["row_key", "length", "height", "area"],
    hints: &[
        &["rowkey", "key", "mark", "panel", "no", "number"],
        &["length", "len", "width"],
        &["height", "ht"],
        &["area", "sqft"],
    ],
};

static SCHEDULE_B: SectionConfig = SectionConfig {
    fields: &["row_key", "weight"],
    required: &["row_key", "weight"],
    hints: &[
        &["rowkey", "key", "mark", "panel", "no", "number"],
        &["weight", "wt", "lbs", "lb"],
    ],
};

/// Every section the pipeline recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionKind {
    RoofSheathing,
    RoofPartList,
    FloorConnectors,
    FloorPartList,
    FloorSheathing,
    WallConnectors,
    WallFramingTotals,
    WallPartList,
    WallSheathing,
    Timestamps,
    WallScheduleA,
    WallScheduleB,
    LegacyPartList,
    LegacyFramingTotals,
}

impl SectionKind {
    pub const ALL: [SectionKind; 14] = [
        SectionKind::RoofSheathing,
        SectionKind::RoofPartList,
        SectionKind::FloorConnectors,
        SectionKind::FloorPartList,
        SectionKind::FloorSheathing,
        SectionKind::WallConnectors,
        SectionKind::WallFramingTotals,
        SectionKind::WallPartList,
        SectionKind::WallSheathing,
        SectionKind::Timestamps,
        SectionKind::WallScheduleA,
        SectionKind::WallScheduleB,
        SectionKind::LegacyPartList,
        SectionKind::LegacyFramingTotals,
    ];

    /// Sections that take part in confidence scoring; also the expected set
    /// when the panel kind cannot be determined
    pub const SCORED: [SectionKind; 10] = [
        SectionKind::RoofSheathing,
        SectionKind::RoofPartList,
        SectionKind::FloorConnectors,
        SectionKind::FloorPartList,
        SectionKind::FloorSheathing,
        SectionKind::WallConnectors,
        SectionKind::WallFramingTotals,
        SectionKind::WallPartList,
        SectionKind::WallSheathing,
        SectionKind::Timestamps,
    ];

    /// Name the section is stored under in a normalized submission
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::RoofSheathing => "RPSheathing",
            Self::RoofPartList => "RPPartList",
            Self::FloorConnectors => "FPConnectors",
            Self::FloorPartList => "FPPartList",
            Self::FloorSheathing => "FPSheathing",
            Self::WallConnectors => "WPConnectors",
            Self::WallFramingTotals => "WPFramingTL",
            Self::WallPartList => "WPPartList",
            Self::WallSheathing => "WPSheathing",
            Self::Timestamps => "timestamps",
            Self::WallScheduleA => "WPScheduleA",
            Self::WallScheduleB => "WPScheduleB",
            Self::LegacyPartList => "assemblypartlist",
            Self::LegacyFramingTotals => "framingtl",
        }
    }

    /// Panel kind the section belongs to; `None` for shared and legacy sections
    pub fn panel_kind(self) -> Option<PanelKind> {
        match self {
            Self::RoofSheathing | Self::RoofPartList => Some(PanelKind::Roof),
            Self::FloorConnectors | Self::FloorPartList | Self::FloorSheathing => {
                Some(PanelKind::Floor)
            }
            Self::WallConnectors
            | Self::WallFramingTotals
            | Self::WallPartList
            | Self::WallSheathing
            | Self::WallScheduleA
            | Self::WallScheduleB => Some(PanelKind::Wall),
            Self::Timestamps | Self::LegacyPartList | Self::LegacyFramingTotals => None,
        }
    }

    pub fn is_legacy(self) -> bool {
        matches!(self, Self::LegacyPartList | Self::LegacyFramingTotals)
    }

    pub fn sub_assembly(self) -> Option<SubAssemblyKind> {
        match self {
            Self::RoofPartList | Self::FloorPartList | Self::WallPartList | Self::LegacyPartList => {
                Some(SubAssemblyKind::Part)
            }
            Self::RoofSheathing | Self::FloorSheathing | Self::WallSheathing => {
                Some(SubAssemblyKind::Sheathing)
            }
            Self::FloorConnectors | Self::WallConnectors => Some(SubAssemblyKind::Connector),
            Self::WallFramingTotals | Self::LegacyFramingTotals => Some(SubAssemblyKind::Framing),
            Self::Timestamps | Self::WallScheduleA | Self::WallScheduleB => None,
        }
    }

    pub fn config(self) -> &'static SectionConfig {
        match self {
            Self::RoofPartList | Self::FloorPartList | Self::WallPartList | Self::LegacyPartList => {
                &PART_LIST
            }
            Self::RoofSheathing | Self::FloorSheathing | Self::WallSheathing => &SHEATHING,
            Self::FloorConnectors => &FLOOR_CONNECTORS,
            Self::WallConnectors => &WALL_CONNECTORS,
            Self::WallFramingTotals | Self::LegacyFramingTotals => &FRAMING_TOTALS,
            Self::Timestamps => &TIMESTAMPS,
            Self::WallScheduleA => &SCHEDULE_A,
            Self::WallScheduleB => &SCHEDULE_B,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Result of resolving a section name against the alias table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionLookup {
    Recognized(SectionKind),
    Unrecognized(String),
}

/// Descriptive aliases beyond each section's own normalized canonical name.
/// Keys are in normalized form (see [`normalize_key`]).
const ALIASES: &[(&str, SectionKind)] = &[
    ("roofsheathing", SectionKind::RoofSheathing),
    ("roofpanelsheathing", SectionKind::RoofSheathing),
    ("roofpartlist", SectionKind::RoofPartList),
    ("roofparts", SectionKind::RoofPartList),
    ("floorconnectors", SectionKind::FloorConnectors),
    ("floorpartlist", SectionKind::FloorPartList),
    ("floorparts", SectionKind::FloorPartList),
    ("floorsheathing", SectionKind::FloorSheathing),
    ("wallconnectors", SectionKind::WallConnectors),
    ("wallframingtl", SectionKind::WallFramingTotals),
    ("wallframingtotallength", SectionKind::WallFramingTotals),
    ("wpframingtotallength", SectionKind::WallFramingTotals),
    ("wallpartlist", SectionKind::WallPartList),
    ("wallparts", SectionKind::WallPartList),
    ("wallsheathing", SectionKind::WallSheathing),
    ("timestamp", SectionKind::Timestamps),
    ("wallschedulea", SectionKind::WallScheduleA),
    ("schedulea", SectionKind::WallScheduleA),
    ("wallscheduleb", SectionKind::WallScheduleB),
    ("scheduleb", SectionKind::WallScheduleB),
    ("partlist", SectionKind::LegacyPartList),
    ("assemblyparts", SectionKind::LegacyPartList),
    ("framingtotallength", SectionKind::LegacyFramingTotals),
];

/// Strip separators (`_`, `-`, `.`, whitespace) and lower-case
pub fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(|c| !(c.is_whitespace() || matches!(c, '_' | '-' | '.')))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve any casing, spacing or alias of a section name
pub fn resolve_section(name: &str) -> SectionLookup {
    let key = normalize_key(name);
    if key.is_empty() {
        return SectionLookup::Unrecognized(name.to_string());
    }

    let canonical = SectionKind::ALL
        .iter()
        .copied()
        .find(|kind| normalize_key(kind.canonical_name()) == key);
    let kind = canonical.or_else(|| {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, kind)| *kind)
    });

    match kind {
        Some(kind) => SectionLookup::Recognized(kind),
        None => SectionLookup::Unrecognized(name.to_string()),
    }
}
