//! Project configuration and target resolution
//!
//! The configuration is loaded once and passed explicitly to the store.
//! TOML is the native format; the JSON layout used by older deployments
//! (`connect.SERVER`, `sql.<project>.main_table`, ...) is accepted as well.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable overriding the default config path
pub const CONFIG_ENV: &str = "SKU_METRICS_CONFIG";

fn default_port() -> u16 {
    5432
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Shared connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectSettings {
    #[serde(alias = "SERVER", alias = "host")]
    pub server: String,
    #[serde(alias = "PORT", default = "default_port")]
    pub port: u16,
    #[serde(alias = "LOGIN", alias = "user")]
    pub login: String,
    #[serde(alias = "PASSWORD", default)]
    pub password: String,
    /// Directory holding one database file per project database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Per-project database and table names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(alias = "main_table")]
    pub database: String,
    pub sku_table: String,
    #[serde(alias = "metrics_online_table")]
    pub metrics_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub connect: ConnectSettings,
    #[serde(alias = "sql", default)]
    pub projects: BTreeMap<String, ProjectSettings>,
}

/// Where a project's data lives
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub database: String,
}

impl ConnectionTarget {
    /// Full connection URL, credentials included
    pub fn url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.login, self.password, self.host, self.port, self.database
        )
    }

    /// Connection URL safe for logs and terminal output
    pub fn display_url(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.login, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_url())
    }
}

/// The two tables backing a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableNames {
    pub sku: String,
    pub metrics: String,
}

/// Everything an operation needs to reach a project's data
#[derive(Debug, Clone)]
pub struct ProjectTarget {
    pub project: String,
    pub connection: ConnectionTarget,
    pub tables: TableNames,
}

impl AppConfig {
    /// Load configuration from `path`, picking the format from the extension
    pub fn load(path: &Path) -> Result<Self> {
        let file_err = |reason: String| Error::ConfigFile {
            path: path.display().to_string(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        };
        config.map_err(|e| match e {
            Error::Configuration(reason) => file_err(reason),
            other => other,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Configured project names, sorted
    pub fn project_names(&self) -> Vec<&str> {
        self.projects.keys().map(String::as_str).collect()
    }

    /// Table names for `project`
    pub fn tables(&self, project: &str) -> Result<TableNames> {
        let settings = self.project_settings(project)?;
        let tables = TableNames {
            sku: settings.sku_table.clone(),
            metrics: settings.metrics_table.clone(),
        };

        validate_identifier(project, "sku_table", &tables.sku)?;
        validate_identifier(project, "metrics_table", &tables.metrics)?;
        if tables.sku == tables.metrics {
            return Err(Error::Configuration(format!(
                "project '{project}' uses '{}' for both the SKU and the metrics table",
                tables.sku
            )));
        }
        Ok(tables)
    }

    /// Connection target for `project`
    pub fn connection_target(&self, project: &str) -> Result<ConnectionTarget> {
        let settings = self.project_settings(project)?;
        validate_identifier(project, "database", &settings.database)?;

        Ok(ConnectionTarget {
            host: self.connect.server.clone(),
            port: self.connect.port,
            login: self.connect.login.clone(),
            password: self.connect.password.clone(),
            database: settings.database.clone(),
        })
    }

    /// Resolve a project to its connection target and tables. Never touches the database.
    pub fn resolve(&self, project: &str) -> Result<ProjectTarget> {
        Ok(ProjectTarget {
            project: project.to_string(),
            connection: self.connection_target(project)?,
            tables: self.tables(project)?,
        })
    }

    fn project_settings(&self, project: &str) -> Result<&ProjectSettings> {
        self.projects.get(project).ok_or_else(|| {
            Error::Configuration(format!("no configuration found for project '{project}'"))
        })
    }
}

fn validate_identifier(project: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Configuration(format!(
            "project '{project}' has an empty {field}"
        )));
    }
    if value.contains('\0') {
        return Err(Error::Configuration(format!(
            "project '{project}' has a {field} containing a NUL byte"
        )));
    }
    Ok(())
}

pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sku-metrics.toml"))
}

/// Create the parent directory of a database file if needed
pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
