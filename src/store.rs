//! High-level metric store
//!
//! Every operation resolves the project, opens one session, makes sure the
//! project's tables exist and then runs. Configuration and schema failures
//! surface before any data is touched.

use crate::config::{AppConfig, ProjectTarget};
use crate::metrics::{self, reader, MetricFilter, MetricMap, WriteSummary};
use crate::storage::schema::{self, DbStats, SchemaReport};
use crate::storage::{Connector, Session, SqliteConnector};
use crate::{Error, Result};

pub struct MetricStore<C = SqliteConnector> {
    config: AppConfig,
    connector: C,
}

impl MetricStore<SqliteConnector> {
    /// Store backed by the embedded engine configured in `config.connect`
    pub fn from_config(config: AppConfig) -> Self {
        let connector = SqliteConnector::from_settings(&config.connect);
        Self::new(config, connector)
    }
}

impl<C: Connector> MetricStore<C> {
    pub fn new(config: AppConfig, connector: C) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn open(&self, project: &str) -> Result<(ProjectTarget, Session, SchemaReport)> {
        let target = self.config.resolve(project)?;
        let session = self.connector.connect(&target.connection)?;
        let report = schema::initialize_schema(session.conn(), &target.tables)?;
        Ok((target, session, report))
    }

    /// Create the project's tables if they do not exist yet
    pub fn initialize(&self, project: &str) -> Result<SchemaReport> {
        let (_, _session, report) = self.open(project)?;
        Ok(report)
    }

    /// Upsert `data` into the project's tables as one atomic batch
    pub fn write(&self, project: &str, data: &MetricMap) -> Result<WriteSummary> {
        let (target, mut session, _) = self.open(project)?;
        metrics::write_metrics(session.conn_mut(), &target.tables, data)
    }

    /// Read the project's metrics matching `filter`
    pub fn read(&self, project: &str, filter: &MetricFilter) -> Result<MetricMap> {
        let (target, session, _) = self.open(project)?;
        metrics::read_metrics(session.conn(), &target.tables, filter)
    }

    /// Like [`read`](Self::read), but a failed query yields an empty map.
    ///
    /// Configuration, connection and schema errors are still returned.
    pub fn read_or_empty(&self, project: &str, filter: &MetricFilter) -> Result<MetricMap> {
        match self.read(project, filter) {
            Err(Error::Read(reason)) => {
                tracing::error!("Failed to read metrics for {}: {}", project, reason);
                Ok(MetricMap::new())
            }
            other => other,
        }
    }

    /// Stored rows of one SKU, or `None` if the SKU was never written
    pub fn records(&self, project: &str, sku_code: &str) -> Result<Option<Vec<metrics::MetricRecord>>> {
        let (target, session, _) = self.open(project)?;
        match reader::find_entity(session.conn(), &target.tables, sku_code)? {
            Some(entity) => Ok(Some(reader::find_records(session.conn(), &target.tables, &entity)?)),
            None => Ok(None),
        }
    }

    /// Row counts of the project's tables
    pub fn stats(&self, project: &str) -> Result<DbStats> {
        let (target, session, _) = self.open(project)?;
        schema::stats(session.conn(), &target.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionTarget;
    use crate::metrics::parse_metric_json;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn test_config(data_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::from_toml_str(
            r#"
[connect]
server = "localhost"
login = "metrics"
password = "pw"

[projects.shop]
database = "shop_db"
sku_table = "shop_sku"
metrics_table = "shop_metrics_online"

[projects.outlet]
database = "shop_db"
sku_table = "outlet_sku"
metrics_table = "outlet_metrics"
"#,
        )
        .unwrap();
        config.connect.data_dir = data_dir.to_path_buf();
        config
    }

    fn store() -> (TempDir, MetricStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricStore::from_config(test_config(dir.path()));
        (dir, store)
    }

    fn round_trip_data() -> MetricMap {
        parse_metric_json(r#"{"SKU1": {"weight": 1.5, "price": 9.99}, "SKU2": {"price": 5.0}}"#).unwrap()
    }

    struct CountingConnector {
        inner: SqliteConnector,
        calls: Cell<usize>,
    }

    impl Connector for CountingConnector {
        fn connect(&self, target: &ConnectionTarget) -> Result<Session> {
            self.calls.set(self.calls.get() + 1);
            self.inner.connect(target)
        }
    }

    #[test]
    fn test_write_is_idempotent() {
        let (_dir, store) = store();
        let data = round_trip_data();

        store.write("shop", &data).unwrap();
        let once = store.read("shop", &MetricFilter::all()).unwrap();
        store.write("shop", &data).unwrap();
        let twice = store.read("shop", &MetricFilter::all()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.stats("shop").unwrap().metrics, 3);
    }

    #[test]
    fn test_upsert_overwrites_single_row() {
        let (_dir, store) = store();
        store.write("shop", &parse_metric_json(r#"{"SKU1": {"price": 10.0}}"#).unwrap()).unwrap();
        store.write("shop", &parse_metric_json(r#"{"SKU1": {"price": 12.0}}"#).unwrap()).unwrap();

        let records = store.records("shop", "SKU1").unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metric_name, "price");
        assert_eq!(records[0].value, 12.0);
    }

    #[test]
    fn test_round_trip() {
        let (_dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();

        let read = store.read("shop", &MetricFilter::all()).unwrap();
        assert_eq!(read, round_trip_data());
    }

    #[test]
    fn test_entity_filter() {
        let (_dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();

        let read = store.read("shop", &MetricFilter::all().with_entities(["SKU2"])).unwrap();
        assert_eq!(read, parse_metric_json(r#"{"SKU2": {"price": 5.0}}"#).unwrap());
    }

    #[test]
    fn test_metric_filter() {
        let (_dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();

        let read = store.read("shop", &MetricFilter::all().with_metrics(["price"])).unwrap();
        assert_eq!(
            read,
            parse_metric_json(r#"{"SKU1": {"price": 9.99}, "SKU2": {"price": 5.0}}"#).unwrap()
        );
    }

    #[test]
    fn test_schema_initialization_is_idempotent() {
        let (dir, store) = store();

        let first = store.initialize("shop").unwrap();
        assert_eq!(first.created, vec!["shop_sku", "shop_metrics_online"]);
        for _ in 0..3 {
            assert!(store.initialize("shop").unwrap().is_noop());
        }

        let conn = rusqlite::Connection::open(dir.path().join("shop_db.db")).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'shop_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_missing_project_never_connects() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricStore::new(
            test_config(dir.path()),
            CountingConnector {
                inner: SqliteConnector::new(dir.path()),
                calls: Cell::new(0),
            },
        );

        assert!(matches!(store.write("ghost", &round_trip_data()), Err(Error::Configuration(_))));
        assert!(matches!(store.read("ghost", &MetricFilter::all()), Err(Error::Configuration(_))));
        assert!(matches!(
            store.read_or_empty("ghost", &MetricFilter::all()),
            Err(Error::Configuration(_))
        ));
        assert_eq!(store.connector().calls.get(), 0);

        store.initialize("shop").unwrap();
        assert_eq!(store.connector().calls.get(), 1);
    }

    #[test]
    fn test_unknown_entity_is_absent() {
        let (_dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();

        let read = store
            .read("shop", &MetricFilter::all().with_entities(["SKU2", "NEVER"]))
            .unwrap();
        assert!(!read.contains_key("NEVER"));
        assert_eq!(read.len(), 1);
        assert!(store.records("shop", "NEVER").unwrap().is_none());
    }

    #[test]
    fn test_write_merges_with_stored_values() {
        let (_dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();
        store
            .write("shop", &parse_metric_json(r#"{"SKU1": {"price": 8.5, "stock": 40}}"#).unwrap())
            .unwrap();

        let read = store.read("shop", &MetricFilter::all().with_entities(["SKU1"])).unwrap();
        assert_eq!(
            read,
            parse_metric_json(r#"{"SKU1": {"price": 8.5, "stock": 40, "weight": 1.5}}"#).unwrap()
        );
    }

    #[test]
    fn test_projects_sharing_a_database_stay_separate() {
        let (_dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();
        store
            .write("outlet", &parse_metric_json(r#"{"SKU1": {"price": 4.0}}"#).unwrap())
            .unwrap();

        assert_eq!(store.read("shop", &MetricFilter::all()).unwrap(), round_trip_data());
        assert_eq!(store.read("outlet", &MetricFilter::all()).unwrap()["SKU1"]["price"], 4.0);
    }

    #[test]
    fn test_conflicting_table_surfaces_schema_error() {
        let (dir, store) = store();
        let conn = rusqlite::Connection::open(dir.path().join("shop_db.db")).unwrap();
        conn.execute("CREATE TABLE shop_sku (id INTEGER PRIMARY KEY, name TEXT)", [])
            .unwrap();
        drop(conn);

        let err = store.write("shop", &round_trip_data()).unwrap_err();
        assert!(matches!(err, Error::Schema { ref table, .. } if table == "shop_sku"));
    }

    #[test]
    fn test_table_without_unique_key_fails_before_writing() {
        let (dir, store) = store();
        let conn = rusqlite::Connection::open(dir.path().join("shop_db.db")).unwrap();
        conn.execute(
            "CREATE TABLE shop_metrics_online (id INTEGER PRIMARY KEY, sku_id INTEGER, metric_name TEXT, value REAL)",
            [],
        )
        .unwrap();
        drop(conn);

        let is_schema_error =
            |err: &Error| matches!(err, Error::Schema { table, .. } if table == "shop_metrics_online");
        assert!(is_schema_error(&store.initialize("shop").unwrap_err()));
        assert!(is_schema_error(&store.write("shop", &round_trip_data()).unwrap_err()));

        // The failed initialization did not leave a SKU table behind.
        let conn = rusqlite::Connection::open(dir.path().join("shop_db.db")).unwrap();
        let skus: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'shop_sku'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(skus, 0);
    }

    #[test]
    fn test_large_entity_filter() {
        let (_dir, store) = store();
        let mut data = MetricMap::new();
        for i in 0..1500 {
            data.entry(format!("SKU{i:04}")).or_default().insert("price".to_string(), i as f64);
        }
        store.write("shop", &data).unwrap();

        let wanted: Vec<String> = (0..1500).filter(|i| i % 3 == 0).map(|i| format!("SKU{i:04}")).collect();
        let read = store
            .read("shop", &MetricFilter::all().with_entities(wanted.clone()).with_metrics(["price"]))
            .unwrap();

        assert_eq!(read.len(), 500);
        assert!(wanted.iter().all(|code| read.contains_key(code)));
        assert_eq!(read["SKU0999"]["price"], 999.0);
    }

    #[test]
    fn test_read_or_empty_degrades_query_failures() {
        let (dir, store) = store();
        store.write("shop", &round_trip_data()).unwrap();

        // Right columns, but a value that is not a number.
        let conn = rusqlite::Connection::open(dir.path().join("shop_db.db")).unwrap();
        conn.execute_batch(
            "DROP TABLE shop_metrics_online;
             CREATE TABLE shop_metrics_online (id INTEGER PRIMARY KEY, sku_id INTEGER, metric_name TEXT, value TEXT, UNIQUE (sku_id, metric_name));
             INSERT INTO shop_metrics_online (sku_id, metric_name, value) VALUES (1, 'price', 'n/a');",
        )
        .unwrap();
        drop(conn);

        assert!(matches!(store.read("shop", &MetricFilter::all()), Err(Error::Read(_))));
        assert!(store.read_or_empty("shop", &MetricFilter::all()).unwrap().is_empty());
    }
}
