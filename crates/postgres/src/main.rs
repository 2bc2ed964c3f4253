//! # pg-admin
//!
//! Inspect and maintain a table through the generic persistence engine.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use common::config::{
    load_config, load_from_file, ConfigValidation, Configurable, ConnectionParams,
    PersistenceConfig,
};
use common::logging::init_logging;
use common::persistence::PagingParams;
use common::refer::{Descriptor, References};
use postgres_persistence::{
    ConnectionProvider, PostgresConnectionFactory, PostgresPersistence, RowModel,
};

#[derive(Parser, Debug)]
#[command(name = "pg-admin")]
#[command(about = "Inspect and maintain PostgreSQL tables")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to persistence.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Table to work on; overrides `table` / `collection`
    #[arg(short, long, global = true)]
    table: Option<String>,

    /// Connection URI; replaces configured endpoints
    #[arg(long, global = true, env = "POSTGRES_URI")]
    uri: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count rows matching a filter
    Count {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print one page of rows as JSON lines
    List {
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        select: Option<String>,
        #[arg(long)]
        skip: Option<i64>,
        #[arg(long)]
        take: Option<i64>,
        /// Also print the total number of matching rows
        #[arg(long)]
        total: bool,
    },
    /// Print one random row matching a filter
    Random {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Delete every row of the table
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(if args.verbose { "debug" } else { "warn" })
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    let config = build_config(&args)?;
    let table = config
        .table_name()
        .map(str::to_string)
        .context("Table name is not set; pass --table or set `table` in the configuration")?;
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let correlation_id = Some(correlation_id.as_str());

    let locator: Descriptor = config.dependencies.connection.parse()?;
    let factory = PostgresConnectionFactory::new();
    let mut connection = factory
        .create(&locator)
        .with_context(|| format!("No connection can be created for {locator}"))?;
    connection.configure(&config);
    let connection = Arc::new(connection);

    let mut references = References::new();
    references.put_component(
        Descriptor::new("persistence", "connection", "postgres", "pg-admin", "1.0"),
        connection.clone(),
    );

    connection.open(correlation_id).await?;

    let mut persistence = PostgresPersistence::new(table, RowModel::new());
    persistence.configure(&config);
    persistence.set_references(&references);

    let result = match persistence.open(correlation_id).await {
        Ok(()) => run(&persistence, correlation_id, args.command).await,
        Err(e) => Err(e.into()),
    };

    persistence.close(correlation_id).await?;
    connection.close(correlation_id).await?;
    result
}

fn build_config(args: &Args) -> Result<PersistenceConfig> {
    let mut config: PersistenceConfig = match &args.config {
        Some(path) => load_from_file(path)?,
        None => load_config()?,
    };

    if let Some(table) = &args.table {
        config.table = Some(table.clone());
    }
    if let Some(uri) = &args.uri {
        config.connection = Some(ConnectionParams::from_uri(uri.clone()));
        config.connections.clear();
    }

    config.validate()?;
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }
    Ok(config)
}

async fn run(
    persistence: &PostgresPersistence<RowModel>,
    correlation_id: Option<&str>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Count { filter } => {
            let count = persistence
                .get_count_by_filter(correlation_id, filter.as_deref())
                .await?;
            println!("{count}");
        }
        Command::List {
            filter,
            sort,
            select,
            skip,
            take,
            total,
        } => {
            let paging = PagingParams::new(skip, take, total);
            let page = persistence
                .get_page_by_filter(
                    correlation_id,
                    filter.as_deref(),
                    Some(&paging),
                    sort.as_deref(),
                    select.as_deref(),
                )
                .await?;
            for row in page.data {
                println!("{}", serde_json::to_string(&Value::Object(row))?);
            }
            if let Some(total) = page.total {
                eprintln!("total: {total}");
            }
        }
        Command::Random { filter } => {
            match persistence
                .get_one_random(correlation_id, filter.as_deref())
                .await?
            {
                Some(row) => println!("{}", serde_json::to_string(&Value::Object(row))?),
                None => eprintln!("No matching rows"),
            }
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear {} without --yes", persistence.table_name());
            }
            persistence.clear(correlation_id).await?;
            info!(table = %persistence.table_name(), "Table cleared");
        }
    }
    Ok(())
}
