//! PriceKit CLI: run a technical command and print its result envelope.
//!
//! Commands:
//! - `channel`: Mandelbrot rescaled-range price channel
//! - `momentum`: per-symbol lookback momentum

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pricekit_core::config::CsvSettings;
use pricekit_core::schema::{Cell, ResultTable};
use pricekit_core::{ContextParams, RawParams, Settings, Toolbox, Warning};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "pricekit", about = "PriceKit CLI: technical analysis over market data")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override: off, error, warn, info, debug, trace.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ContextArgs {
    /// Symbols to analyze (e.g., SPY QQQ or SPY,QQQ).
    #[arg(required = true)]
    symbols: Vec<String>,

    /// Data provider: yahoo or csv.
    #[arg(long, default_value = "yahoo")]
    provider: String,

    /// Start date (YYYY-MM-DD). Defaults to the provider's earliest date.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Directory of `{SYMBOL}.csv` files for the csv provider.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Mandelbrot rescaled-range price channel.
    Channel {
        #[command(flatten)]
        context: ContextArgs,

        /// Window length (e.g., 1mo, 2w, 1q).
        #[arg(long)]
        window: Option<String>,

        /// Volatility estimator: std, parkinson, garman_klass, hodges_tompkins,
        /// rogers_satchell, yang_zhang, squared_returns.
        #[arg(long)]
        rv_method: Option<String>,

        /// Rescaled-range selection: RS, RS_min, RS_max, RS_mean.
        #[arg(long)]
        rs_method: Option<String>,

        /// Use every window instead of the latest window's volatility quartile.
        #[arg(long, default_value_t = false)]
        no_rv_adjustment: bool,

        /// Average volatility over trailing spans inside each window.
        #[arg(long, default_value_t = false)]
        grouped_mean: bool,

        /// Use the live quote as the recent price.
        #[arg(long, default_value_t = false)]
        live_price: bool,
    },
    /// Lookback momentum per symbol.
    Momentum {
        #[command(flatten)]
        context: ContextArgs,

        /// Calculation: log, simple, or shift.
        #[arg(long)]
        method: Option<String>,

        /// Lookback in bars.
        #[arg(long)]
        period: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(level) = cli.log_level {
        settings.log.level = level;
    }

    match cli.command {
        Commands::Channel {
            context,
            window,
            rv_method,
            rs_method,
            no_rv_adjustment,
            grouped_mean,
            live_price,
        } => {
            let mut params = RawParams::new();
            put(&mut params, "window", window);
            put(&mut params, "rv_method", rv_method);
            put(&mut params, "rs_method", rs_method);
            if no_rv_adjustment {
                params.insert("rv_adjustment".into(), Value::Bool(false));
            }
            if grouped_mean {
                params.insert("rv_grouped_mean".into(), Value::Bool(true));
            }
            if live_price {
                params.insert("live_price".into(), Value::Bool(true));
            }

            let format = context.format;
            let toolbox = open_toolbox(&mut settings, context)?;
            let envelope = toolbox.technical().mandelbrot_channel(Some(params))?;
            match format {
                Format::Json => println!("{}", envelope.to_json_pretty()?),
                Format::Table => print_table(envelope.results(), envelope.warnings())?,
            }
        }
        Commands::Momentum {
            context,
            method,
            period,
        } => {
            let mut params = RawParams::new();
            put(&mut params, "method", method);
            if let Some(period) = period {
                params.insert("period".into(), Value::from(period));
            }

            let format = context.format;
            let toolbox = open_toolbox(&mut settings, context)?;
            let envelope = toolbox.technical().momentum(Some(params))?;
            match format {
                Format::Json => println!("{}", envelope.to_json_pretty()?),
                Format::Table => print_table(envelope.results(), envelope.warnings())?,
            }
        }
    }

    Ok(())
}

fn put(params: &mut RawParams, key: &str, value: Option<String>) {
    if let Some(value) = value {
        params.insert(key.to_string(), Value::String(value));
    }
}

fn open_toolbox(settings: &mut Settings, args: ContextArgs) -> Result<Toolbox> {
    if let Some(dir) = args.csv_dir {
        settings.csv = Some(CsvSettings { dir });
    }
    if args.provider.eq_ignore_ascii_case("csv") && settings.csv.is_none() {
        bail!("the csv provider needs --csv-dir or a [csv] section in --config");
    }
    let config = settings.fetcher_config()?;
    if let Some(dispatch) = &config.log {
        // Ignore the error if a global subscriber was already installed.
        let _ = tracing::dispatcher::set_global_default(dispatch.clone());
    }

    let mut raw = RawParams::new();
    raw.insert("symbols".into(), Value::String(args.symbols.join(",")));
    raw.insert("provider".into(), Value::String(args.provider));
    put(&mut raw, "start_date", args.start);
    put(&mut raw, "end_date", args.end);
    let context = ContextParams::from_raw(&raw).context("invalid context")?;
    info!(
        symbols = ?context.symbols(),
        provider = %context.provider(),
        start = %context.start_date(),
        end = %context.end_date(),
        "context ready"
    );
    debug!(?config, "fetcher configured");

    Ok(Toolbox::new(context, config))
}

fn render(cell: &Cell) -> String {
    match cell {
        Cell::Null => "-".to_string(),
        Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        Cell::Str(s) => s.clone(),
        Cell::Float(v) if v.is_finite() => format!("{v:.4}"),
        Cell::Float(_) => "-".to_string(),
        Cell::Int(v) => v.to_string(),
    }
}

fn print_table(table: &ResultTable, warnings: &[Warning]) -> Result<()> {
    let headers = table.model().column_names();
    let rows: Vec<Vec<String>> = table
        .rows()?
        .iter()
        .map(|row| row.iter().map(render).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|r| r[i].len())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    println!("{}", pad_row(&headers, &widths));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", pad_row(&cells, &widths));
    }

    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn pad_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:>width$}"))
        .collect::<Vec<_>>()
        .join("  ")
}
