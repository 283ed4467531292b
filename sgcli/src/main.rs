//! sgcli - command-line client for a sheetgrid server.
//!
//! `rows` pages through a table with the stream consumer and prints a grid;
//! `bulk-load` starts a load and optionally follows its progress events.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use futures::StreamExt;
use serde_json::Value;

use sheetgrid::client::{FetchOutcome, HttpSource};
use sheetgrid::jobs::BulkLoadRequest;
use sheetgrid::{Condition, FilterOp, JobEvent, PageRequest, Row, SortDir, StreamConsumer};

#[derive(Parser)]
#[command(name = "sgcli", version, about = "sheetgrid command-line client")]
struct Cli {
    /// Server base URL
    #[arg(long, global = true, env = "SHEETGRID_URL", default_value = "http://127.0.0.1:3030")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream rows of a table, page by page
    Rows {
        table: String,
        /// Full-text search; every word must match
        #[arg(long)]
        search: Option<String>,
        /// Filter as `column:op[:value]`, e.g. `age:gt:25` or `email:isnull`
        #[arg(long = "filter", short = 'f')]
        filters: Vec<String>,
        /// Sort column
        #[arg(long, default_value = "rowId")]
        sort: String,
        #[arg(long)]
        desc: bool,
        /// Rows per page
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Pages to fetch (0 = all)
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Print rows as NDJSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Start a synthetic bulk load
    BulkLoad {
        table: String,
        #[arg(long)]
        rows: Option<u64>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Follow progress until the job finishes
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let source = HttpSource::new(&cli.url)?;

    match cli.command {
        Command::Rows { table, search, filters, sort, desc, limit, pages, json } => {
            let dir = if desc { SortDir::Desc } else { SortDir::Asc };
            let mut request = PageRequest::default().sorted_by(&sort, dir).limit(limit);
            if let Some(text) = search.as_deref() {
                request = request.search(text);
            }
            for raw in &filters {
                let (column, condition) = parse_filter(raw)?;
                request = request.filter(&column, condition);
            }
            rows(source, &table, request, pages, json).await
        }
        Command::BulkLoad { table, rows, batch_size, watch } => {
            bulk_load(source, &table, BulkLoadRequest { rows, batch_size }, watch).await
        }
    }
}

async fn rows(source: HttpSource, table: &str, request: PageRequest, pages: usize, json: bool) -> Result<()> {
    let columns = source.columns(table).await?;
    let consumer = StreamConsumer::new(Arc::new(source), table, request);

    let mut fetched = 0;
    while pages == 0 || fetched < pages {
        match consumer.fetch_next_page().await {
            FetchOutcome::Loaded(0) | FetchOutcome::Skipped | FetchOutcome::Superseded => break,
            FetchOutcome::Loaded(_) => fetched += 1,
            FetchOutcome::Failed(message) => bail!("stream failed: {}", message),
        }
    }

    let snapshot = consumer.snapshot();
    if json {
        for row in &snapshot.rows {
            println!("{}", serde_json::to_string(row).context("encode row")?);
        }
    } else {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        println!("{}", render_grid(&names, &snapshot.rows));
    }

    let total = snapshot.total_rows.unwrap_or(0);
    let summary = format!("{} of {} rows", snapshot.loaded_rows, total);
    if snapshot.has_more {
        eprintln!("{} {}", summary.bold(), "(more available, raise --pages)".dimmed());
    } else {
        eprintln!("{}", summary.bold());
    }
    Ok(())
}

async fn bulk_load(source: HttpSource, table: &str, request: BulkLoadRequest, watch: bool) -> Result<()> {
    let job = source.start_bulk_load(table, &request).await?;
    println!("{} {}", "job".green().bold(), job);
    if !watch {
        return Ok(());
    }

    let mut events = source.job_events(job).await?;
    while let Some(event) = events.next().await {
        match event? {
            JobEvent::Progress { rows } => eprintln!("{} {} rows", "progress".cyan(), rows),
            JobEvent::Done => {
                println!("{}", "done".green().bold());
                return Ok(());
            }
            JobEvent::Error { message } => bail!("bulk load failed: {}", message),
        }
    }
    bail!("event stream ended before the job finished")
}

/// `column:op[:value]`. Values that parse as JSON (numbers, booleans) keep
/// their type; anything else is sent as a string.
fn parse_filter(raw: &str) -> Result<(String, Condition)> {
    let mut parts = raw.splitn(3, ':');
    let column = parts.next().filter(|c| !c.is_empty()).ok_or_else(|| anyhow!("filter '{}' has no column", raw))?;
    let op = parts.next().ok_or_else(|| anyhow!("filter '{}' has no operator", raw))?;
    let op: FilterOp = serde_json::from_value(Value::String(op.to_lowercase()))
        .with_context(|| format!("unknown operator in filter '{}'", raw))?;

    let condition = match parts.next() {
        Some(value) => {
            let value = serde_json::from_str::<Value>(value)
                .ok()
                .filter(|v| v.is_number() || v.is_boolean())
                .unwrap_or_else(|| Value::String(value.to_string()));
            Condition::new(op, value)
        }
        None if op.takes_value() => bail!("filter '{}' needs a value", raw),
        None => Condition::bare(op),
    };
    Ok((column.to_string(), condition))
}

fn render_grid(columns: &[&str], rows: &[Row]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec!["rowId"];
    header.extend_from_slice(columns);
    table.set_header(header);

    for row in rows {
        let mut cells = vec![row.row_id.to_string()];
        cells.extend(columns.iter().map(|name| match row.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }));
        table.add_row(cells);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        let (column, condition) = parse_filter("age:gt:25").unwrap();
        assert_eq!(column, "age");
        assert_eq!(condition, Condition::new(FilterOp::Gt, 25));

        let (_, condition) = parse_filter("email:isnull").unwrap();
        assert_eq!(condition, Condition::bare(FilterOp::IsNull));

        let (_, condition) = parse_filter("name:in:Ada:L").unwrap();
        assert_eq!(condition.value, Some(Value::String("Ada:L".into())));

        assert!(parse_filter("age:between:1").is_err());
        assert!(parse_filter("age:eq").is_err());
    }
}
