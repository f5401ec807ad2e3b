use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hddb_store::{
    open_store, CatalogApi, DatabaseApi, DatabaseKey, Dataset, FetchApi, FetchParams,
    FieldsParams, HdStore,
};
use serde_json::{Map, Value as JsonValue};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::ImportDataset(args) => import_dataset(args).await,
        Command::Describe(args) => describe(args).await,
        Command::Fetch(args) => fetch(args).await,
        Command::DropDatabase(args) => drop_database(args).await,
    }
}

#[derive(Parser)]
#[command(author, version, about = "Developer utilities for hddb tenant databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a database with one table per JSON records file.
    ImportDataset(ImportDatasetArgs),
    /// Print the catalog of a database, or the fields of one table.
    Describe(DescribeArgs),
    /// Run a grid fetch request against a table.
    Fetch(FetchArgs),
    /// Detach and delete a database.
    DropDatabase(TargetArgs),
}

#[derive(Parser)]
struct TargetArgs {
    /// Directory holding hddb.json, the gateway database and tenant files.
    #[arg(long, default_value = ".hddb")]
    datastore: PathBuf,
    #[arg(long)]
    org: String,
    #[arg(long)]
    db: String,
}

impl TargetArgs {
    async fn open(&self) -> Result<(HdStore, DatabaseKey)> {
        let key = DatabaseKey::new(&self.org, &self.db)?;
        let store = open_store(&self.datastore)
            .await
            .with_context(|| format!("open datastore {}", self.datastore.display()))?;
        Ok((store, key))
    }
}

#[derive(Parser)]
struct ImportDatasetArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// JSON files containing an array of records; the file stem names the table.
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Parser)]
struct DescribeArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long)]
    table: Option<String>,
    /// Include distinct values per field (only with --table).
    #[arg(long, default_value_t = false)]
    categories: bool,
}

#[derive(Parser)]
struct FetchArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long)]
    table: String,
    /// Fetch request as JSON; starts with '@' to read it from a file.
    #[arg(long, default_value = r#"{"start_row":0,"end_row":100}"#)]
    request: String,
}

fn read_dataset(path: &Path) -> Result<(String, Dataset)> {
    let table = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("cannot derive a table name from {}", path.display()))?
        .to_string();
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let records: Vec<Map<String, JsonValue>> = serde_json::from_str(&raw)
        .with_context(|| format!("{} must hold an array of objects", path.display()))?;
    let dataset = Dataset::from_records(&records)?;
    Ok((table, dataset))
}

async fn import_dataset(args: ImportDatasetArgs) -> Result<()> {
    let mut names = Vec::with_capacity(args.inputs.len());
    let mut datasets = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let (table, dataset) = read_dataset(path)?;
        log::info!(
            "xtask: {} -> table {table} ({} rows, {} columns)",
            path.display(),
            dataset.nrows(),
            dataset.ncols()
        );
        names.push(table);
        datasets.push(dataset);
    }
    let (store, key) = args.target.open().await?;
    let report = store
        .create_database_with_tables(&key, &datasets, &names)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    store.close().await?;
    Ok(())
}

async fn describe(args: DescribeArgs) -> Result<()> {
    let (store, key) = args.target.open().await?;
    let output = match &args.table {
        Some(table) => {
            let metadata = store.get_table_metadata(&key, table).await?;
            let fields = store
                .list_fields(
                    &key,
                    table,
                    FieldsParams {
                        with_categories: args.categories,
                    },
                )
                .await?;
            serde_json::json!({ "table": metadata, "fields": fields })
        }
        None => {
            if args.categories {
                log::warn!("xtask: --categories is ignored without --table");
            }
            let database = store.get_database(&key).await?;
            let tables = store.list_tables(&key).await?;
            serde_json::json!({ "database": database, "tables": tables })
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    store.close().await?;
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<()> {
    let raw = match args.request.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("read {path}"))?,
        None => args.request.clone(),
    };
    let params: FetchParams = serde_json::from_str(&raw).context("parse fetch request")?;
    let (store, key) = args.target.open().await?;
    let result = store.fetch_rows(&key, &args.table, &params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    store.close().await?;
    Ok(())
}

async fn drop_database(args: TargetArgs) -> Result<()> {
    let (store, key) = args.open().await?;
    store.drop_database(&key).await?;
    log::info!("xtask: dropped {key}");
    store.close().await?;
    Ok(())
}
