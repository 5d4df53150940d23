//! # sf-cli — command line for SLACKFLAKE
//!
//! Offline commands run the engine in-process:
//!
//! - `sf catalog` — list the criteria types.
//! - `sf compile COUNTRY 840 124` — compile one criteria node.
//! - `sf resolve --rows rows.json --placement 42` — resolve a saved tree.
//! - `sf render report.json` — render a report request to SQL.
//!
//! `sf status` and `sf filter <placement>` talk to a running hub.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sf_core::{
    compile, criteria_rows_query, Catalog, CriteriaRow, CriteriaSource, EmptyValuePolicy,
    PlacementFilterQuery, PlacementId, ReportRequest, Resolution, Resolver, SourceError,
};
use tabled::{Table, Tabled};

/// SLACKFLAKE — targeting criteria to SQL.
#[derive(Parser)]
#[command(name = "sf", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every criteria type with its shape and target columns.
    Catalog,

    /// Compile one criteria node into a predicate.
    Compile {
        /// Criteria type id, e.g. COUNTRY.
        type_id: String,
        /// Values of the node.
        values: Vec<String>,
        /// Exclude instead of include.
        #[arg(long)]
        negative: bool,
    },

    /// Resolve a criteria tree saved as a JSON array of rows.
    Resolve {
        #[arg(long)]
        rows: PathBuf,
        #[arg(long)]
        placement: PlacementId,
        /// Skip value-less nodes instead of failing.
        #[arg(long)]
        skip_empty: bool,
    },

    /// Print the SQL that fetches a placement's criteria rows.
    RowsQuery { placement: PlacementId },

    /// Render a report request (JSON file, or `-` for stdin) to SQL.
    Render { request: PathBuf },

    /// Report hub status as JSON.
    Status,

    /// Ask the hub for a placement's WHERE clause.
    Filter { placement: PlacementId },
}

/// Rows loaded from disk, served for any placement.
struct FileSource {
    rows: Vec<CriteriaRow>,
}

impl CriteriaSource for FileSource {
    fn fetch_criteria_rows(&self, _: PlacementId) -> Result<Vec<CriteriaRow>, SourceError> {
        Ok(self.rows.clone())
    }
}

#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "Type")]
    type_id: String,
    #[tabled(rename = "Shape")]
    shape: String,
    #[tabled(rename = "Columns")]
    columns: String,
}

fn catalog_table(catalog: &Catalog) -> String {
    let rows: Vec<CatalogRow> = catalog
        .iter()
        .map(|spec| CatalogRow {
            type_id: spec.type_id.clone(),
            shape: spec.shape.to_string(),
            columns: spec.target_columns.join(", "),
        })
        .collect();
    Table::new(rows).to_string()
}

fn read_input(path: &Path) -> std::io::Result<String> {
    if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())
    } else {
        std::fs::read_to_string(path)
    }
}

fn load_rows(path: &Path) -> Result<Vec<CriteriaRow>, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(&read_input(path)?)?)
}

fn resolve_file(
    rows: Vec<CriteriaRow>,
    placement: PlacementId,
    policy: EmptyValuePolicy,
) -> Result<String, Box<dyn std::error::Error>> {
    let resolver = Resolver::new(
        Arc::new(Catalog::builtin()),
        Arc::new(FileSource { rows }),
        policy,
    );
    let resolution = resolver.resolve(placement)?;
    for skipped in resolution.skipped() {
        eprintln!(
            "   skipped node {} ({:?}): {:?}",
            skipped.node_id, skipped.criteria_type_id, skipped.reason
        );
    }
    Ok(match &resolution {
        Resolution::Filter(filter) => PlacementFilterQuery::new(placement, filter).where_clause,
        Resolution::EmptyTree { .. } => format!("-- placement {} has no predicates", placement),
    })
}

fn run_offline(cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Commands::Catalog => println!("{}", catalog_table(&Catalog::builtin())),
        Commands::Compile {
            type_id,
            values,
            negative,
        } => {
            let catalog = Catalog::builtin();
            let predicate = compile(catalog.lookup(&type_id)?, negative, &values)?;
            println!("{}", predicate.sql);
        }
        Commands::Resolve {
            rows,
            placement,
            skip_empty,
        } => {
            let policy = if skip_empty {
                EmptyValuePolicy::Skip
            } else {
                EmptyValuePolicy::Fail
            };
            println!("{}", resolve_file(load_rows(&rows)?, placement, policy)?);
        }
        Commands::RowsQuery { placement } => println!("{}", criteria_rows_query(placement)),
        Commands::Render { request } => {
            let request: ReportRequest = serde_json::from_str(&read_input(&request)?)?;
            eprintln!("-- {}", request.title());
            println!("{}", request.render()?);
        }
        // Hub commands run in async_main.
        Commands::Status | Commands::Filter { .. } => {}
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        // Async Commands
        cmd @ (Commands::Status | Commands::Filter { .. }) => {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Failed to build tokio runtime: {}", e);
                    std::process::exit(1);
                }
            };
            rt.block_on(async_main(cmd))
        }
        cmd => run_offline(cmd),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn async_main(cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let base_url =
        std::env::var("SF_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());

    match cmd {
        Commands::Status => {
            let url = format!("{}/api/status", base_url);
            let json = get_json(&client, &url).await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Filter { placement } => {
            let url = format!("{}/api/placements/{}/filter", base_url, placement);
            let json = get_json(&client, &url).await?;
            match json.get("where_clause").and_then(|w| w.as_str()) {
                Some(clause) => println!("{}", clause),
                None => println!("-- placement {} has no predicates", placement),
            }
        }
        _ => {}
    }
    Ok(())
}

async fn get_json(
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("{} returned {}: {}", url, status, body).into());
    }
    Ok(resp.json().await?)
}
