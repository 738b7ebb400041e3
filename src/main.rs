//! sku-metrics CLI - write and query per-SKU metrics

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sku_metrics::config::default_config_path;
use sku_metrics::metrics::parse_metric_json;
use sku_metrics::{ui, AppConfig, MetricFilter, MetricStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sku-metrics")]
#[command(version)]
#[command(about = "Store and query per-SKU metrics for configured projects")]
#[command(long_about = r#"
Stores named numeric metrics per SKU in project-specific tables.

Example usage:
  sku-metrics init shop
  echo '{"SKU1": {"price": 9.99}}' | sku-metrics write shop
  sku-metrics read shop --sku SKU1 --metric price
"#)]
struct Cli {
    /// Path to the configuration file (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured projects
    Projects,

    /// Create the project's tables if they are missing
    Init {
        /// Project name from the configuration
        project: String,
    },

    /// Upsert metrics from a JSON document `{sku: {metric: value}}`
    Write {
        /// Project name from the configuration
        project: String,

        /// Input file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Print stored metrics
    Read {
        /// Project name from the configuration
        project: String,

        /// Only these SKU codes (repeatable)
        #[arg(short, long = "sku")]
        skus: Vec<String>,

        /// Only these metric names (repeatable)
        #[arg(short, long = "metric")]
        metrics: Vec<String>,
    },

    /// Show row counts for the project's tables
    Stats {
        /// Project name from the configuration
        project: String,
    },
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path)?;
    tracing::debug!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Projects => {
            let targets = config
                .project_names()
                .into_iter()
                .map(|name| config.resolve(name))
                .collect::<sku_metrics::Result<Vec<_>>>()?;

            if cli.json {
                let listing: Vec<_> = targets
                    .iter()
                    .map(|target| {
                        serde_json::json!({
                            "project": target.project,
                            "database": target.connection.display_url(),
                            "tables": target.tables,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else if targets.is_empty() {
                ui::warn(&format!("No projects configured in {}", config_path.display()));
            } else {
                for target in &targets {
                    ui::header(&target.project);
                    ui::info("database", &target.connection.display_url());
                    ui::info("sku table", &target.tables.sku);
                    ui::info("metrics table", &target.tables.metrics);
                }
            }
        }

        Commands::Init { project } => {
            let store = MetricStore::from_config(config);
            let report = store.initialize(&project)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_noop() {
                ui::success(&format!("Tables for {} already exist", project));
            } else {
                ui::success(&format!("Created {}", report.created.join(", ")));
            }
        }

        Commands::Write { project, input } => {
            let data = parse_metric_json(&read_input(&input)?)?;
            let store = MetricStore::from_config(config);

            let summary = store.write(&project, &data)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                ui::success(&format!("{} ({})", summary, project));
            }
        }

        Commands::Read { project, skus, metrics } => {
            let store = MetricStore::from_config(config);
            let filter = MetricFilter::all().with_entities(skus).with_metrics(metrics);
            let found = store.read(&project, &filter)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else if found.is_empty() {
                ui::warn("No metrics found.");
            } else {
                println!("{}", ui::metrics_table(&found));
            }
        }

        Commands::Stats { project } => {
            let target = config.resolve(&project)?;
            let store = MetricStore::from_config(config);
            let stats = store.stats(&project)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::header(&format!("{} ({})", project, target.connection.display_url()));
                println!("{}", ui::stats_table(&target.tables.sku, &target.tables.metrics, &stats));
                ui::info("distinct metrics", &stats.metric_names.to_string());
            }
        }
    }

    Ok(())
}
