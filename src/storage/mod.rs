//! Storage Layer - relational persistence
//!
//! Each project owns two tables whose names come from configuration:
//! - `<sku_table>(id, sku_code)`
//! - `<metrics_table>(id, sku_id, metric_name, value)`

pub mod schema;
pub mod session;

pub use schema::{DbStats, SchemaReport};
pub use session::{Connector, Session, SqliteConnector};
