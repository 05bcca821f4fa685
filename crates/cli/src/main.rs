use crate::{
    commands::Commands,
    env::EnvManager,
    error::CliError,
    output::{write_json, write_page, write_row},
};
use bigdecimal::BigDecimal;
use clap::Parser;
use connectors::{config::DatabaseConfig, connect::build_connector, connection::Connector};
use engine_core::{
    cache::QueryCache,
    error::OperationError,
    operation::{FnOperation, Operation, OperationExt},
    retry::RetryPolicy,
};
use engine_processing::{
    aggregate::{ColumnStats, stream_average, stream_column_stats, stream_percentiles},
    seed::seed_users,
    stream::RowResultStream,
    users::{all_users, batch_processing, paginate_users, stream_users},
};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::{
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod env;
mod error;
mod output;

const PERCENTILE_SAMPLE_SIZE: usize = 10_000;

#[derive(Parser)]
#[command(
    name = "rowstream",
    version = "0.1.0",
    about = "Stream, paginate and aggregate rows from a relational database"
)]
struct Cli {
    #[arg(long, global = true, help = "Load database settings from this .env file")]
    env_file: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = 4, help = "Attempts per call, the first included")]
    retries: usize,

    #[arg(long, global = true, default_value_t = 2000)]
    retry_delay_ms: u64,

    #[arg(
        long,
        global = true,
        default_value_t = 300,
        help = "Seconds aggregate results stay cached; 0 never expires"
    )]
    cache_ttl: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Serialize)]
struct StatsReport {
    column: String,
    #[serde(flatten)]
    stats: ColumnStats,
    percentiles: Vec<(f64, BigDecimal)>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut env = EnvManager::new();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }
    debug!(vars = ?env.database_summary(), "Database settings");

    let config = DatabaseConfig::from_vars(env.all())?;
    let connector = build_connector(&config)?;
    let policy = RetryPolicy::new(cli.retries, Duration::from_millis(cli.retry_delay_ms));
    let cache = Arc::new(QueryCache::new());
    let ttl = Duration::from_secs(cli.cache_ttl);
    let mut out = BufWriter::new(std::io::stdout());

    match cli.command {
        Commands::Seed { csv } => {
            let report = seed_users(connector, &csv).await?;
            write_json(&mut out, &report)?;
        }
        Commands::Stream { limit } => {
            let rows = stream_users(connector);
            let rows = match limit {
                Some(limit) => rows.take(limit).boxed(),
                None => rows,
            };
            drain_rows(rows, &mut out).await?;
        }
        Commands::Batches { size, min_age } => {
            let rows = batch_processing(connector, size, min_age)?;
            drain_rows(rows, &mut out).await?;
        }
        Commands::Paginate {
            page_size,
            max_pages,
        } => {
            let mut pages = paginate_users(connector, page_size)?
                .take(max_pages.unwrap_or(usize::MAX));
            while let Some(page) = pages.try_next().await? {
                write_page(&mut out, &page)?;
            }
        }
        Commands::Average { column } => {
            let average = FnOperation::new("average", move |column: &String| {
                let connector = connector.clone();
                Box::pin(async move {
                    Ok::<_, OperationError>(stream_average(connector, all_users(), column).await?)
                })
            })
            .with_retry(policy)
            .with_cache(cache.clone(), ttl);

            let mean = average.call(&column).await?;
            write_json(&mut out, &serde_json::json!({ "column": column, "average": mean }))?;
        }
        Commands::Stats {
            column,
            percentiles,
        } => {
            let report = column_report(connector, policy, cache.clone(), ttl, column, percentiles)
                .await?;
            write_json(&mut out, &report)?;
        }
        Commands::TestConn => conn::ping(connector, policy).await?,
    }

    out.flush()?;
    if let Some(stats) = cache.stats() {
        debug!(entries = stats.total_entries, hits = stats.total_hits, "Cache usage");
    }
    Ok(())
}

/// Writes rows until the stream ends or Ctrl+C arrives. Dropping the stream
/// releases its connection either way.
async fn drain_rows<W: Write>(mut rows: RowResultStream, out: &mut W) -> Result<(), CliError> {
    let mut written = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!(written, "Interrupted, stopping stream");
                break;
            }
            next = rows.try_next() => match next? {
                Some(row) => {
                    write_row(out, &row)?;
                    written += 1;
                }
                None => break,
            },
        }
    }
    info!(written, "Stream finished");
    Ok(())
}

async fn column_report(
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    cache: Arc<QueryCache>,
    ttl: Duration,
    column: String,
    percentiles: Vec<f64>,
) -> Result<StatsReport, CliError> {
    let stats = FnOperation::new("column_stats", move |args: &(String, Vec<f64>)| {
        let connector = connector.clone();
        Box::pin(async move {
            let (column, percentiles) = args;
            let stats = stream_column_stats(connector.clone(), all_users(), column).await?;
            let percentiles = if percentiles.is_empty() {
                Vec::new()
            } else {
                stream_percentiles(
                    connector,
                    all_users(),
                    column,
                    percentiles,
                    PERCENTILE_SAMPLE_SIZE,
                )
                .await?
            };
            Ok::<_, OperationError>((stats, percentiles))
        })
    })
    .with_retry(policy)
    .with_cache(cache, ttl);

    let (stats, percentiles) = stats.call(&(column.clone(), percentiles)).await?;
    Ok(StatsReport {
        column,
        stats,
        percentiles,
    })
}
