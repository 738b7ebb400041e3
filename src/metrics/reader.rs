//! Join-based metric retrieval

use rusqlite::{params_from_iter, Connection, OptionalExtension};

use super::{Entity, MetricFilter, MetricMap, MetricRecord};
use crate::config::TableNames;
use crate::storage::schema::quote_ident;
use crate::{Error, Result};

/// Most values bound per `IN` list. Longer filters are split across queries so
/// a statement never exceeds SQLite's host parameter limit.
pub const MAX_FILTER_VALUES: usize = 400;

fn read_err(e: rusqlite::Error) -> Error {
    Error::Read(e.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn chunks(values: &[String]) -> Vec<&[String]> {
    if values.is_empty() {
        vec![values]
    } else {
        values.chunks(MAX_FILTER_VALUES).collect()
    }
}

/// Build the join query with `codes` SKU placeholders and `names` metric
/// placeholders; zero leaves that column unfiltered. Bindings follow in
/// order: SKU codes, then metric names.
pub fn build_query(tables: &TableNames, codes: usize, names: usize) -> String {
    let mut sql = format!(
        "SELECT s.sku_code, m.metric_name, m.value FROM {metrics} AS m JOIN {sku} AS s ON m.sku_id = s.id",
        metrics = quote_ident(&tables.metrics),
        sku = quote_ident(&tables.sku),
    );

    let mut clauses = Vec::new();
    if codes > 0 {
        clauses.push(format!("s.sku_code IN ({})", placeholders(codes)));
    }
    if names > 0 {
        clauses.push(format!("m.metric_name IN ({})", placeholders(names)));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql
}

/// Read matching metrics grouped by SKU code.
///
/// SKUs without a matching metric row are absent from the result.
pub fn read_metrics(conn: &Connection, tables: &TableNames, filter: &MetricFilter) -> Result<MetricMap> {
    let mut map = MetricMap::new();
    for codes in chunks(&filter.entity_codes) {
        for names in chunks(&filter.metric_names) {
            read_into(conn, tables, codes, names, &mut map)?;
        }
    }
    Ok(map)
}

fn read_into(
    conn: &Connection,
    tables: &TableNames,
    codes: &[String],
    names: &[String],
    map: &mut MetricMap,
) -> Result<()> {
    let sql = build_query(tables, codes.len(), names.len());
    tracing::debug!(%sql, "metric query");

    let mut stmt = conn.prepare_cached(&sql).map_err(read_err)?;
    let rows = stmt
        .query_map(params_from_iter(codes.iter().chain(names)), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })
        .map_err(read_err)?;

    for row in rows {
        let (code, name, value) = row.map_err(read_err)?;
        map.entry(code).or_default().insert(name, value);
    }
    Ok(())
}

/// Look up a SKU by code
pub fn find_entity(conn: &Connection, tables: &TableNames, code: &str) -> Result<Option<Entity>> {
    let sql = format!("SELECT id, sku_code FROM {} WHERE sku_code = ?1", quote_ident(&tables.sku));
    conn.query_row(&sql, [code], |row| {
        Ok(Entity {
            id: row.get(0)?,
            code: row.get(1)?,
        })
    })
    .optional()
    .map_err(read_err)
}

/// All stored metric rows of one SKU, ordered by metric name
pub fn find_records(conn: &Connection, tables: &TableNames, entity: &Entity) -> Result<Vec<MetricRecord>> {
    let sql = format!(
        "SELECT id, sku_id, metric_name, value FROM {} WHERE sku_id = ?1 ORDER BY metric_name",
        quote_ident(&tables.metrics)
    );
    let mut stmt = conn.prepare(&sql).map_err(read_err)?;
    let records = stmt
        .query_map([entity.id], |row| {
            Ok(MetricRecord {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                metric_name: row.get(2)?,
                value: row.get(3)?,
            })
        })
        .map_err(read_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(read_err)?;
    Ok(records)
}
