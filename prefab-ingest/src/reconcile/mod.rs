// Component identity reconciliation pipeline
//
// Control flow:
//   RawSubmission → section_normalizer → schedule_merge (paired schedules)
//   → identity_allocator → duplicate_detector (advisory gate)
//   → approval_committer
//
// confidence_scorer runs independently over any submission.

pub mod approval_committer;
pub mod confidence_scorer;
pub mod duplicate_detector;
pub mod error;
pub mod identity_allocator;
pub mod schedule_merge;
pub mod section_normalizer;
pub mod sections;
pub mod types;
pub mod values;

pub use approval_committer::{ApprovalCommitter, CommitPlan};
pub use confidence_scorer::ConfidenceScorer;
pub use duplicate_detector::{ComponentKey, DuplicateReport};
pub use error::{ReconcileError, ReconcileResult};
pub use identity_allocator::IdentityAllocator;
pub use section_normalizer::normalize;
pub use sections::{PanelKind, SectionKind, SectionLookup};
pub use types::{ApprovalOptions, ApprovalOutcome, RawSubmission, ScoreBreakdown};
