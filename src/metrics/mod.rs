//! Metric records and the mapping they are exchanged as
//!
//! Callers hand metrics around as `{sku_code: {metric_name: value}}`. The
//! writer flattens that into [`MetricTriple`]s and the reader folds joined
//! rows back into the same shape.

pub mod reader;
pub mod writer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;

pub use reader::read_metrics;
pub use writer::write_metrics;

/// `{sku_code: {metric_name: value}}`
pub type MetricMap = BTreeMap<String, BTreeMap<String, f64>>;

/// A row of the SKU table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub code: String,
}

/// A row of the metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: i64,
    pub entity_id: i64,
    pub metric_name: String,
    pub value: f64,
}

/// One `(sku, metric, value)` entry of a [`MetricMap`]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTriple<'a> {
    pub entity_code: &'a str,
    pub metric_name: &'a str,
    pub value: f64,
}

/// Flatten a mapping into triples, SKU-major
pub fn flatten(data: &MetricMap) -> Vec<MetricTriple<'_>> {
    data.iter()
        .flat_map(|(code, metrics)| {
            metrics.iter().map(move |(name, value)| MetricTriple {
                entity_code: code,
                metric_name: name,
                value: *value,
            })
        })
        .collect()
}

/// Parse a `{sku: {metric: number}}` JSON document
pub fn parse_metric_json(input: &str) -> Result<MetricMap> {
    Ok(serde_json::from_str(input)?)
}

/// Optional restrictions applied by the reader. Empty lists do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFilter {
    pub entity_codes: Vec<String>,
    pub metric_names: Vec<String>,
}

impl MetricFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_entities<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn with_metrics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.entity_codes.is_empty() && self.metric_names.is_empty()
    }
}

/// What a successful write did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub entities_created: usize,
    pub metrics_written: usize,
}

impl std::fmt::Display for WriteSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} metric values written, {} new SKUs",
            self.metrics_written, self.entities_created
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_visits_every_pair() {
        let data = parse_metric_json(r#"{"SKU1": {"weight": 1.5, "price": 9.99}, "SKU2": {"price": 5}}"#)
            .unwrap();
        let triples = flatten(&data);

        assert_eq!(triples.len(), 3);
        assert_eq!(
            triples[0],
            MetricTriple { entity_code: "SKU1", metric_name: "price", value: 9.99 }
        );
        assert_eq!(triples[2].entity_code, "SKU2");
        assert_eq!(triples[2].value, 5.0);
    }

    #[test]
    fn test_flatten_skips_skus_without_metrics() {
        let data = parse_metric_json(r#"{"SKU1": {}, "SKU2": {"price": 1.0}}"#).unwrap();
        let triples = flatten(&data);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].entity_code, "SKU2");
    }

    #[test]
    fn test_parse_rejects_non_numeric_values() {
        assert!(parse_metric_json(r#"{"SKU1": {"price": "cheap"}}"#).is_err());
        assert!(parse_metric_json(r#"["SKU1"]"#).is_err());
    }

    #[test]
    fn test_filter_builder() {
        let filter = MetricFilter::all().with_entities(["SKU2"]).with_metrics(vec!["price".to_string()]);
        assert_eq!(filter.entity_codes, vec!["SKU2"]);
        assert_eq!(filter.metric_names, vec!["price"]);
        assert!(!filter.is_unfiltered());
        assert!(MetricFilter::all().is_unfiltered());
    }
}
