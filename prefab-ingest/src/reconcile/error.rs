//! Reconciliation error taxonomy
//!
//! Every failure the approval pipeline reports carries a stable `code()` so
//! API callers can branch on it without parsing messages.

use thiserror::Error;
use uuid::Uuid;

use prefab_common::db::StagingStatus;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Submission missing a field the pipeline cannot proceed without
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Schedule B rows whose key has no Schedule A row
    #[error("Schedule B rows without a Schedule A match: {}", .keys.join(", "))]
    OrphanScheduleRows { keys: Vec<String> },

    /// Identifier collides with production and no resolution strategy was chosen
    #[error(
        "Component {component_id} already exists in project {project_id} \
         ({staging_count} staged submission(s) share this identifier)"
    )]
    DuplicateComponent {
        project_id: String,
        component_id: String,
        staging_count: usize,
        production_exists: bool,
    },

    #[error("No free identifier for {candidate} after {attempts} attempts")]
    AllocationExhausted { candidate: String, attempts: usize },

    #[error("Staging record {id} is {}, cannot move to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        id: Uuid,
        from: StagingStatus,
        to: StagingStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage failure; the transaction was rolled back
    #[error("Persistence failed: {0}")]
    Persistence(#[source] prefab_common::Error),
}

impl ReconcileError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::OrphanScheduleRows { .. } => "ORPHAN_SCHEDULE_B_ROWS",
            Self::DuplicateComponent { .. } => "DUPLICATE_COMPONENT",
            Self::AllocationExhausted { .. } => "ID_ALLOCATION_EXHAUSTED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

impl From<prefab_common::Error> for ReconcileError {
    fn from(err: prefab_common::Error) -> Self {
        match err {
            prefab_common::Error::NotFound(what) => Self::NotFound(what),
            prefab_common::Error::InvalidInput(msg) => Self::Validation(msg),
            other => Self::Persistence(other),
        }
    }
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            ReconcileError::OrphanScheduleRows { keys: vec!["4".into()] }.code(),
            "ORPHAN_SCHEDULE_B_ROWS"
        );
        assert_eq!(
            ReconcileError::AllocationExhausted {
                candidate: "P-1".into(),
                attempts: 100
            }
            .code(),
            "ID_ALLOCATION_EXHAUSTED"
        );
    }

    #[test]
    fn test_orphan_message_lists_keys() {
        let err = ReconcileError::OrphanScheduleRows {
            keys: vec!["4".into(), "7".into()],
        };
        assert_eq!(
            err.to_string(),
            "Schedule B rows without a Schedule A match: 4, 7"
        );
    }

    #[test]
    fn test_common_errors_map_by_kind() {
        let not_found: ReconcileError = prefab_common::Error::NotFound("x".into()).into();
        assert!(matches!(not_found, ReconcileError::NotFound(_)));

        let config: ReconcileError = prefab_common::Error::Config("bad".into()).into();
        assert_eq!(config.code(), "PERSISTENCE_ERROR");
    }
}
