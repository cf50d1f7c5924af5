//! # Prefab Common Library
//!
//! Shared code for the prefab production services including:
//! - Database schema initialization and persisted record models
//! - Configuration loading
//! - Common error type
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
