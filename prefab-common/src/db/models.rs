//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Review state of a staged submission
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingStatus {
    Pending,
    Approved,
    Rejected,
}

impl StagingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::Internal(format!("Unknown staging status: {}", other))),
        }
    }

    /// Only `pending → approved` and `pending → rejected` are allowed
    pub fn can_transition_to(self, next: StagingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
        )
    }
}

/// A parsed document submission awaiting review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub id: Uuid,
    pub raw_data: serde_json::Value,
    pub status: StagingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl StagingRecord {
    /// New pending record
    pub fn new(raw_data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            raw_data,
            status: StagingStatus::Pending,
            created_at: now,
            updated_at: now,
            reviewed_at: None,
            reviewed_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Canonical production component
///
/// `id` is the opaque internal identity; `(project_id, component_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: String,
    pub project_id: String,
    pub component_id: String,
    pub panel_kind: Option<String>,
    pub component_type: Option<String>,
    pub design_url: Option<String>,
    pub sequence: Option<i64>,
    pub length: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub area: Option<f64>,
    pub current_status: String,
    pub percent_complete: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub id: String,
    pub component_ref: String,
    pub size: Option<String>,
    pub label: Option<String>,
    pub count: Option<i64>,
    pub cut_length: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheathingRecord {
    pub id: String,
    pub component_ref: String,
    pub description: Option<String>,
    pub panel_area: Option<String>,
    pub panel_count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub id: String,
    pub component_ref: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingSegmentRecord {
    pub id: String,
    pub component_ref: String,
    pub ftype: Option<String>,
    pub total_length: Option<String>,
    pub count: Option<i64>,
}

/// A component together with every sub-assembly row it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentWithParts {
    pub component: ComponentRecord,
    pub parts: Vec<PartRecord>,
    pub sheathing: Vec<SheathingRecord>,
    pub connectors: Vec<ConnectorRecord>,
    pub framing: Vec<FramingSegmentRecord>,
}
