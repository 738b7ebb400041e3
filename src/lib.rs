//! # sku-metrics - per-SKU metric storage
//!
//! Persists and retrieves named numeric metrics for the SKUs of a project.
//!
//! sku-metrics provides:
//! - Project resolution from an explicit configuration object
//! - Idempotent creation of the per-project SKU and metric tables
//! - Atomic batch upserts of `{sku: {metric: value}}` mappings
//! - Join-based reads filtered by SKU codes and/or metric names

pub mod config;
pub mod metrics;
pub mod storage;
pub mod store;
pub mod ui;

// Re-exports for convenient access
pub use config::{AppConfig, ConnectionTarget, ProjectTarget, TableNames};
pub use metrics::{Entity, MetricFilter, MetricMap, MetricRecord, MetricTriple, WriteSummary};
pub use storage::{Connector, DbStats, SchemaReport, Session, SqliteConnector};
pub use store::MetricStore;

/// Result type alias for sku-metrics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sku-metrics operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load config {path}: {reason}")]
    ConfigFile { path: String, reason: String },

    #[error("Cannot connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("Schema error on table {table}: {reason}")]
    Schema { table: String, reason: String },

    #[error("Write failed, transaction rolled back: {0}")]
    Write(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
