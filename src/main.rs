//! candlecache CLI
//!
//! `sync` tops up the cache for a set of instruments; `combine` combines two
//! cached series and prints the result as CSV on stdout.

use anyhow::{Context, Result};
use candlecache::application::SyncRequest;
use candlecache::config::Config;
use candlecache::domain::market::{CandleInterval, MathOperation};
use candlecache::infrastructure::ServiceFactory;
use candlecache::infrastructure::persistence::CsvCodec;
use candlecache::infrastructure::persistence::csv_codec::parse_timestamp;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::str::FromStr;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Local OHLCV candle cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch whatever is missing from the cache for each instrument
    Sync {
        /// Comma-separated instrument identifiers
        #[arg(short, long)]
        instruments: String,

        /// Candle interval (1m, 5min, 1h, day, ...)
        #[arg(long, default_value = "1d")]
        interval: String,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: String,

        /// Window end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        to: String,
    },
    /// Combine two cached series candle by candle
    Combine {
        /// Left operand instrument
        left: String,

        /// Right operand instrument
        right: String,

        /// add, sub, mul or div
        #[arg(long, default_value = "sub")]
        op: String,

        /// Candle interval (1m, 5min, 1h, day, ...)
        #[arg(long, default_value = "1d")]
        interval: String,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: String,

        /// Window end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        to: String,

        /// Multiply the result by this factor
        #[arg(long)]
        scale: Option<f64>,

        /// Drop candles repeating the previous one
        #[arg(long)]
        collapse_repeats: bool,

        /// Drop weekends and configured holidays
        #[arg(long)]
        trading_days_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so combine output stays clean
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let cache = ServiceFactory::create_cache(&config)?;

    match cli.command {
        Commands::Sync {
            instruments,
            interval,
            from,
            to,
        } => {
            let interval = parse_interval(&interval)?;
            let (from, to) = parse_window(&from, &to)?;

            let requests: Vec<SyncRequest> = instruments
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| SyncRequest::new(id, interval, from, to))
                .collect();
            if requests.is_empty() {
                anyhow::bail!("No instruments given");
            }

            let results = cache.sync_many(&requests).await;
            let mut failures = 0;
            for (request, result) in requests.iter().zip(results) {
                match result {
                    Ok(series) => println!("{}\t{}", request.instrument_id, series.len()),
                    Err(e) => {
                        failures += 1;
                        println!("{}\terror: {}", request.instrument_id, e);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} instruments failed to sync", failures, requests.len());
            }
        }
        Commands::Combine {
            left,
            right,
            op,
            interval,
            from,
            to,
            scale,
            collapse_repeats,
            trading_days_only,
        } => {
            let op = MathOperation::from_str(&op)?;
            let interval = parse_interval(&interval)?;
            let (from, to) = parse_window(&from, &to)?;

            let lhs = cache.download_or_read(&left, interval, from, to).await?;
            let rhs = cache.download_or_read(&right, interval, from, to).await?;
            lhs.check_time_order()
                .with_context(|| format!("Cached series of {} is out of order", left))?;
            rhs.check_time_order()
                .with_context(|| format!("Cached series of {} is out of order", right))?;

            let mut result = lhs
                .combine(&rhs, op)
                .with_context(|| format!("Cannot {} {} and {}", op, left, right))?;
            if let Some(factor) = scale {
                result = result.scale(factor);
            }
            if collapse_repeats {
                result = result.collapse_repeats();
            }
            if trading_days_only {
                result = result.trading_days_only();
            }
            if result.is_empty() {
                warn!("Combined series of {} and {} is empty", left, right);
            }

            let codec = CsvCodec::new();
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(codec.header().as_bytes())?;
            stdout.write_all(codec.encode_rows(result.as_slice())?.as_bytes())?;
            stdout.flush()?;
            info!("Wrote {} combined candles", result.len());
        }
    }

    Ok(())
}

fn parse_interval(value: &str) -> Result<CandleInterval> {
    CandleInterval::from_str(value).with_context(|| {
        let known: Vec<_> = CandleInterval::all().iter().map(|i| i.dir_name()).collect();
        format!("Invalid --interval '{}'. Valid options: {}", value, known.join(", "))
    })
}

fn parse_window(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let from_dt = parse_timestamp(from).with_context(|| format!("Invalid --from '{}'", from))?;
    let to_dt = parse_timestamp(to).with_context(|| format!("Invalid --to '{}'", to))?;
    if from_dt > to_dt {
        anyhow::bail!("--from {} is after --to {}", from, to);
    }
    Ok((from_dt, to_dt))
}
