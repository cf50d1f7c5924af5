//! Application services

pub mod review;

pub use review::{Comparison, IdSuggestion, ReviewService, StagingSummary};
