use tabled::{settings::Style, Table, Tabled};

use crate::metrics::MetricMap;
use crate::storage::DbStats;

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: f64,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

/// One row per stored value, SKU-major. Empty string for an empty map.
pub fn metrics_table(metrics: &MetricMap) -> String {
    let rows: Vec<MetricRow> = metrics
        .iter()
        .flat_map(|(sku, values)| {
            values.iter().map(move |(metric, value)| MetricRow {
                sku: sku.clone(),
                metric: metric.clone(),
                value: *value,
            })
        })
        .collect();

    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn stats_table(sku_table: &str, metrics_table: &str, stats: &DbStats) -> String {
    let rows = vec![
        StatRow {
            table: sku_table.to_string(),
            rows: stats.skus,
        },
        StatRow {
            table: metrics_table.to_string(),
            rows: stats.metrics,
        },
    ];
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::parse_metric_json;

    #[test]
    fn test_metrics_table_lists_every_value() {
        let metrics = parse_metric_json(r#"{"SKU1": {"price": 9.99, "weight": 1.5}, "SKU2": {"price": 5.0}}"#)
            .unwrap();
        let table = metrics_table(&metrics);

        assert!(table.contains("SKU"));
        assert!(table.contains("9.99"));
        assert_eq!(table.matches("SKU1").count(), 2);
    }

    #[test]
    fn test_empty_metrics_table() {
        assert!(metrics_table(&MetricMap::new()).is_empty());
    }
}
