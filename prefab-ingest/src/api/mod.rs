//! HTTP API handlers for prefab-ingest

pub mod approval;
pub mod health;
pub mod staging;

pub use approval::approval_routes;
pub use health::health_routes;
pub use staging::staging_routes;
