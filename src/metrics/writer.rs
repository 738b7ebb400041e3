//! Batch upsert of metric values
//!
//! A batch is all-or-nothing: every triple is applied inside one transaction
//! and any failure rolls the whole batch back, new SKUs included.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{flatten, MetricMap, MetricTriple, WriteSummary};
use crate::config::TableNames;
use crate::storage::schema::quote_ident;
use crate::{Error, Result};

fn write_err(e: rusqlite::Error) -> Error {
    Error::Write(e.to_string())
}

/// Upsert every value in `data` in a single transaction
pub fn write_metrics(conn: &mut Connection, tables: &TableNames, data: &MetricMap) -> Result<WriteSummary> {
    let triples = flatten(data);
    if triples.is_empty() {
        tracing::debug!("Nothing to write");
        return Ok(WriteSummary::default());
    }

    let tx = conn.transaction().map_err(write_err)?;
    match upsert_all(&tx, tables, &triples) {
        Ok(summary) => {
            tx.commit().map_err(write_err)?;
            tracing::info!(
                metrics = summary.metrics_written,
                new_skus = summary.entities_created,
                "Wrote metrics to {}",
                tables.metrics
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            tracing::error!("Metric write to {} rolled back: {}", tables.metrics, e);
            Err(e)
        }
    }
}

fn upsert_all(tx: &Transaction<'_>, tables: &TableNames, triples: &[MetricTriple<'_>]) -> Result<WriteSummary> {
    let sku = quote_ident(&tables.sku);
    let metrics = quote_ident(&tables.metrics);

    let select_sku = format!("SELECT id FROM {sku} WHERE sku_code = ?1");
    let insert_sku = format!("INSERT INTO {sku} (sku_code) VALUES (?1) ON CONFLICT(sku_code) DO NOTHING");
    let upsert_metric = format!(
        "INSERT INTO {metrics} (sku_id, metric_name, value) VALUES (?1, ?2, ?3) \
         ON CONFLICT(sku_id, metric_name) DO UPDATE SET value = excluded.value"
    );
    tracing::debug!(sql = %upsert_metric, "metric upsert");

    let mut select_sku = tx.prepare_cached(&select_sku).map_err(write_err)?;
    let mut insert_sku = tx.prepare_cached(&insert_sku).map_err(write_err)?;
    let mut upsert_metric = tx.prepare_cached(&upsert_metric).map_err(write_err)?;

    let mut sku_ids: HashMap<&str, i64> = HashMap::new();
    let mut summary = WriteSummary::default();

    for triple in triples {
        if !triple.value.is_finite() {
            return Err(Error::Write(format!(
                "{}/{} has non-finite value {}",
                triple.entity_code, triple.metric_name, triple.value
            )));
        }

        let sku_id = match sku_ids.get(triple.entity_code) {
            Some(id) => *id,
            None => {
                let existing: Option<i64> = select_sku
                    .query_row([triple.entity_code], |row| row.get(0))
                    .optional()
                    .map_err(write_err)?;
                let id = match existing {
                    Some(id) => id,
                    None => {
                        let inserted = insert_sku.execute([triple.entity_code]).map_err(write_err)?;
                        if inserted == 1 {
                            summary.entities_created += 1;
                            tx.last_insert_rowid()
                        } else {
                            select_sku
                                .query_row([triple.entity_code], |row| row.get(0))
                                .map_err(write_err)?
                        }
                    }
                };
                sku_ids.insert(triple.entity_code, id);
                id
            }
        };

        upsert_metric
            .execute(params![sku_id, triple.metric_name, triple.value])
            .map_err(write_err)?;
        summary.metrics_written += 1;
    }

    Ok(summary)
}
