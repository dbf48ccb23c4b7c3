//! 🚀 strix-cli: the front door, the bouncer, the maitre d' of strix.
//!
//! 🎬 *[narrator voice]* "It all started with a batch file and a dream..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, reads one change-stream batch, and lets the library
//! do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use strix::pipeline::BatchReport;
use strix::stream::StreamBatch;
use strix::transport::{HttpTransport, TransportResult};
use tokio::io::AsyncReadExt;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// 🦉 Ship one change-stream batch to the search index.
#[derive(Debug, Parser)]
#[command(name = "strix", version)]
struct Args {
    /// 🔧 TOML config file. Env vars (STRIX_*) apply either way.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 🌊 The batch JSON (`{"Records": [...]}`), or `-` for stdin.
    batch: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing, because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let result = invoke(&args).await;

    match result {
        Ok(report) => {
            println!("{}", summary_table(&report));
            if !report.all_flushes_succeeded() {
                // -- 🔄 not our call to retry. the invoker decides whether this batch comes back.
                warn!("⚠️ At least one bulk flush did not succeed. See the table above.");
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("onnection refused")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like the search service isn't reachable. \
                    Double-check service.endpoint and that the cluster is actually up. ☕"
                );
            }
            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }
}

async fn invoke(args: &Args) -> Result<BatchReport> {
    // 🔒 Validate the config file exists before we get too emotionally attached
    if let Some(ref config_file) = args.config {
        let exists = config_file.try_exists().with_context(|| {
            format!(
                "💀 Couldn't even check whether the configuration file exists. Was checking here: '{}'",
                config_file.display()
            )
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Configuration file '{}' does not exist. Maybe it's a cwd thing; an absolute path removes all doubt.",
                config_file.display()
            );
        }
    }

    let app_config = strix::app_config::load_config(args.config.as_deref())
        .context("💀 In strix-cli, we couldn't load the config. Make sure primary.index_root is set and the TOML is TOML.")?;

    let raw_batch = read_batch(&args.batch).await?;
    let batch: StreamBatch = serde_json::from_str(&raw_batch).with_context(|| {
        format!(
            "💀 '{}' is not a change-stream batch. Expected {{\"Records\": [...]}}.",
            args.batch
        )
    })?;

    let transport = HttpTransport::new(app_config.service.clone())?;

    // 🚀 SEND IT. No take-backs. This is not a drill.
    strix::run(&app_config, batch, &transport).await
}

async fn read_batch(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("💀 Failed to read the batch from stdin. The pipe was empty, or haunted.")?;
        Ok(raw)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("💀 Failed to read the batch file '{source}'."))
    }
}

fn summary_table(report: &BatchReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Buffer", "Records", "Status", "Elapsed (s)", "Bytes"]);
    table.add_row(flush_row("primary", report.primary_records, report.primary_flush.as_ref()));
    table.add_row(flush_row(
        "monitoring",
        report.monitoring_records,
        report.monitoring_flush.as_ref(),
    ));
    table.add_row(vec![
        "deletes ignored".to_string(),
        report.ignored_deletes.to_string(),
        String::new(),
        String::new(),
        String::new(),
    ]);
    table.add_row(vec![
        "events skipped".to_string(),
        report.skipped_events.len().to_string(),
        String::new(),
        String::new(),
        String::new(),
    ]);
    table
}

fn flush_row(name: &str, records: usize, flush: Option<&TransportResult>) -> Vec<String> {
    match flush {
        Some(result) => vec![
            name.to_string(),
            records.to_string(),
            result.status.to_string(),
            format!("{:.3}", result.elapsed),
            result.size.to_string(),
        ],
        // 💤 nothing buffered, nothing sent
        None => vec![
            name.to_string(),
            records.to_string(),
            "not flushed".to_string(),
            String::new(),
            String::new(),
        ],
    }
}
