//! Per-project table definitions
//!
//! Table names come from configuration, so every statement is generated and
//! every identifier goes through [`quote_ident`].
//!
//! - `<sku_table>(id, sku_code)`
//! - `<metrics_table>(id, sku_id, metric_name, value)` with a unique
//!   constraint and a composite index on `(sku_id, metric_name)`

use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::TableNames;
use crate::{Error, Result};

/// Columns an existing SKU table must have
pub const SKU_COLUMNS: &[&str] = &["id", "sku_code"];

/// Columns an existing metrics table must have
pub const METRIC_COLUMNS: &[&str] = &["id", "sku_id", "metric_name", "value"];

/// Unique key the SKU insert conflicts on
pub const SKU_KEY: &[&str] = &["sku_code"];

/// Unique key the metric upsert conflicts on
pub const METRIC_KEY: &[&str] = &["sku_id", "metric_name"];

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn unique_constraint_name(metrics_table: &str) -> String {
    format!("uq_{metrics_table}_sku_metric")
}

pub fn index_name(metrics_table: &str) -> String {
    format!("ix_{metrics_table}_sku_metric")
}

/// SQL to create the SKU table
pub fn create_sku_table(tables: &TableNames) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {sku} (
    id INTEGER PRIMARY KEY,
    sku_code TEXT NOT NULL UNIQUE
)
"#,
        sku = quote_ident(&tables.sku),
    )
}

/// SQL to create the metrics table
pub fn create_metrics_table(tables: &TableNames) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {metrics} (
    id INTEGER PRIMARY KEY,
    sku_id INTEGER NOT NULL REFERENCES {sku}(id),
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    CONSTRAINT {uc} UNIQUE (sku_id, metric_name)
)
"#,
        metrics = quote_ident(&tables.metrics),
        sku = quote_ident(&tables.sku),
        uc = quote_ident(&unique_constraint_name(&tables.metrics)),
    )
}

/// SQL to create the composite lookup index
pub fn create_metrics_index(tables: &TableNames) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {ix} ON {metrics}(sku_id, metric_name)",
        ix = quote_ident(&index_name(&tables.metrics)),
        metrics = quote_ident(&tables.metrics),
    )
}

/// Outcome of a schema initialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

impl SchemaReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

/// Lowercased names of all tables in the database
pub fn existing_tables(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.into_iter().map(|n| n.to_ascii_lowercase()).collect())
}

/// Column names of `table`, in declaration order
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Column sets of the non-partial unique indexes on `table`, primary keys included.
///
/// Indexes over expressions are skipped: no `ON CONFLICT` column list can match them.
pub fn unique_keys(conn: &Connection, table: &str) -> rusqlite::Result<Vec<Vec<String>>> {
    let mut list = conn.prepare(r#"SELECT name FROM pragma_index_list(?1) WHERE "unique" = 1 AND partial = 0"#)?;
    let indexes = list
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut keys = Vec::with_capacity(indexes.len());
    for index in &indexes {
        let columns = info
            .query_map([index], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if let Some(columns) = columns.into_iter().collect::<Option<Vec<_>>>() {
            keys.push(columns);
        }
    }
    Ok(keys)
}

fn index_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1 COLLATE NOCASE",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
}

/// Ensure both project tables exist. Tables already present are checked, never altered.
///
/// Everything this creates is created in one transaction, so a failure leaves
/// no partial schema behind.
pub fn initialize_schema(conn: &Connection, tables: &TableNames) -> Result<SchemaReport> {
    let tx = conn.unchecked_transaction().map_err(|e| schema_err(&tables.sku, e))?;
    let present = existing_tables(&tx).map_err(|e| schema_err(&tables.sku, e))?;
    let mut report = SchemaReport::default();

    // SKU table first: the metrics table references it.
    if present.contains(&tables.sku.to_ascii_lowercase()) {
        verify_table(&tx, &tables.sku, SKU_COLUMNS, SKU_KEY)?;
        report.existing.push(tables.sku.clone());
    } else {
        execute_ddl(&tx, &tables.sku, &create_sku_table(tables))?;
        report.created.push(tables.sku.clone());
    }

    if present.contains(&tables.metrics.to_ascii_lowercase()) {
        verify_table(&tx, &tables.metrics, METRIC_COLUMNS, METRIC_KEY)?;
        report.existing.push(tables.metrics.clone());
    } else {
        execute_ddl(&tx, &tables.metrics, &create_metrics_table(tables))?;
        report.created.push(tables.metrics.clone());
    }

    let ix = index_name(&tables.metrics);
    if !index_exists(&tx, &ix).map_err(|e| schema_err(&tables.metrics, e))? {
        execute_ddl(&tx, &tables.metrics, &create_metrics_index(tables))?;
        if report.existing.contains(&tables.metrics) {
            tracing::warn!("Restored missing index {} on {}", ix, tables.metrics);
        }
    }

    tx.commit().map_err(|e| schema_err(&tables.metrics, e))?;
    for table in &report.created {
        tracing::info!("Created table {}", table);
    }
    Ok(report)
}

fn execute_ddl(conn: &Connection, table: &str, sql: &str) -> Result<()> {
    tracing::debug!(table, sql = sql.trim(), "schema statement");
    conn.execute(sql, []).map_err(|e| schema_err(table, e))?;
    Ok(())
}

fn verify_table(conn: &Connection, table: &str, columns: &[&str], key: &[&str]) -> Result<()> {
    verify_columns(conn, table, columns)?;
    verify_unique(conn, table, key)
}

fn verify_columns(conn: &Connection, table: &str, required: &[&str]) -> Result<()> {
    let columns = table_columns(conn, table).map_err(|e| schema_err(table, e))?;
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !columns.iter().any(|c| c.eq_ignore_ascii_case(col)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema {
            table: table.to_string(),
            reason: format!("existing table is missing columns: {}", missing.join(", ")),
        })
    }
}

// Upserts name their conflict target, and SQLite only accepts a target that
// matches a unique index column for column.
fn verify_unique(conn: &Connection, table: &str, key: &[&str]) -> Result<()> {
    let keys = unique_keys(conn, table).map_err(|e| schema_err(table, e))?;
    let matches = keys.iter().any(|columns| {
        columns.len() == key.len()
            && key.iter().all(|k| columns.iter().any(|c| c.eq_ignore_ascii_case(k)))
    });

    if matches {
        Ok(())
    } else {
        Err(Error::Schema {
            table: table.to_string(),
            reason: format!("existing table has no unique constraint on ({})", key.join(", ")),
        })
    }
}

fn schema_err(table: &str, e: rusqlite::Error) -> Error {
    Error::Schema {
        table: table.to_string(),
        reason: e.to_string(),
    }
}

/// Row counts for a project's tables
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub skus: usize,
    pub metrics: usize,
    pub metric_names: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  SKUs: {}", self.skus)?;
        writeln!(f, "  Metric values: {}", self.metrics)?;
        writeln!(f, "  Distinct metrics: {}", self.metric_names)
    }
}

pub fn stats(conn: &Connection, tables: &TableNames) -> Result<DbStats> {
    let sku = quote_ident(&tables.sku);
    let metrics = quote_ident(&tables.metrics);

    let count = |sql: String| -> Result<usize> {
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    };

    Ok(DbStats {
        skus: count(format!("SELECT COUNT(*) FROM {sku}"))?,
        metrics: count(format!("SELECT COUNT(*) FROM {metrics}"))?,
        metric_names: count(format!("SELECT COUNT(DISTINCT metric_name) FROM {metrics}"))?,
    })
}
