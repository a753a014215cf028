/// Catalog administration tool
///
/// Usage:
///   cargo run --bin catalog-admin -- [--db-path <path>] <command>
///
/// Commands:
///   create  Provision tables and indexes (idempotent)
///   drop    Drop every catalog table
///   clear   Delete all rows, keeping the schema
///   seed    Insert the fixed sample data set
///   reset   drop + create + seed

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use workflow_catalog::{populate_sample_data, Database, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "catalog-admin")]
#[command(about = "Administrative operations for the Workflow Catalog database")]
struct Args {
    /// Path to SQLite database file (defaults to CATALOG_DB_PATH or the service default)
    #[arg(long, short)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision tables and indexes
    Create,
    /// Drop every catalog table
    Drop,
    /// Delete all rows
    Clear,
    /// Insert sample data
    Seed,
    /// Drop, recreate and seed
    Reset,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();
    let db_path = args
        .db_path
        .unwrap_or_else(|| ServiceConfig::from_env().db_path);

    info!("Database: {}", db_path.display());
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Opening provisions missing tables, so `create` is already done here
    let db = Database::new(&db_path)?;

    match args.command {
        Command::Create => {
            db.create_all_tables()?;
            info!("Tables ready");
        }
        Command::Drop => db.drop_all_tables()?,
        Command::Clear => db.clear_all_data()?,
        Command::Seed => {
            let summary = populate_sample_data(&db)?;
            info!("Seeded: {}", serde_json::to_string(&summary)?);
        }
        Command::Reset => {
            db.drop_all_tables()?;
            db.create_all_tables()?;
            let summary = populate_sample_data(&db)?;
            info!("Reset complete: {}", serde_json::to_string(&summary)?);
        }
    }

    Ok(())
}
