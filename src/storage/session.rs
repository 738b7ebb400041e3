//! Database sessions
//!
//! Every public store operation opens exactly one [`Session`] and drops it on
//! exit, on success and error paths alike.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::{ensure_db_dir, ConnectSettings, ConnectionTarget};
use crate::{Error, Result};

/// Opens sessions against a resolved connection target
pub trait Connector {
    fn connect(&self, target: &ConnectionTarget) -> Result<Session>;
}

/// One open connection, released when dropped
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    target: String,
}

impl Session {
    pub fn new(conn: Connection, target: impl Into<String>) -> Self {
        let target = target.into();
        tracing::debug!(db = %target, "session opened");
        Self { conn, target }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!(db = %self.target, "session released");
    }
}

/// Embedded engine: one SQLite file per configured database name
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    data_dir: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_settings(settings: &ConnectSettings) -> Self {
        Self::new(&settings.data_dir).with_busy_timeout(Duration::from_millis(settings.busy_timeout_ms))
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File backing `target`'s database
    pub fn db_path(&self, target: &ConnectionTarget) -> Result<PathBuf> {
        let name = &target.database;
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Connection {
                target: target.display_url(),
                reason: format!("database name '{name}' is not a plain file name"),
            });
        }
        Ok(self.data_dir.join(format!("{name}.db")))
    }
}

impl Connector for SqliteConnector {
    fn connect(&self, target: &ConnectionTarget) -> Result<Session> {
        let path = self.db_path(target)?;
        let conn_err = |e: rusqlite::Error| Error::Connection {
            target: target.display_url(),
            reason: e.to_string(),
        };

        ensure_db_dir(&path)?;
        let conn = Connection::open(&path).map_err(conn_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(conn_err)?;
        conn.pragma_update(None, "foreign_keys", true).map_err(conn_err)?;

        Ok(Session::new(conn, path.display().to_string()))
    }
}
