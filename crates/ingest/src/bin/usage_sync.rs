use std::env;
use std::path::PathBuf;
use std::process;

use chrono::Utc;
use ingest::{SyncConfig, TimeWindow, summarize, sync};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use usage_store::ReportStore;

const USAGE: &str = "usage: usage-sync [--config <path>] <sync|status|total [--range <label>]>";

enum Command {
    Sync,
    Status,
    Total { range: String },
}

struct CliArgs {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut config = None;
    let mut command = None;
    let mut range = "24h".to_string();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--range" => {
                range = iter
                    .next()
                    .ok_or_else(|| "missing value for --range".to_string())?
                    .clone();
            }
            "sync" | "status" | "total" if command.is_none() => {
                command = Some(arg.clone());
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                process::exit(0);
            }
            _ => return Err(format!("unknown argument: {arg}")),
        }
    }
    let command = match command.as_deref() {
        Some("sync") => Command::Sync,
        Some("status") => Command::Status,
        Some("total") => Command::Total { range },
        _ => return Err("missing command".to_string()),
    };
    Ok(CliArgs { config, command })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });
    let config = match args.config.as_deref() {
        Some(path) => SyncConfig::load(path),
        None => Ok(SyncConfig::default()),
    }
    .unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(1);
    });

    let outcome = match args.command {
        Command::Sync => run_sync(&config),
        Command::Status => run_status(&config),
        Command::Total { range } => run_total(&config, &range),
    };
    if let Err(err) = outcome {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run_sync(config: &SyncConfig) -> Result<(), String> {
    let result = sync(config).map_err(|err| format!("sync failed: {err}"))?;
    println!("session_files {}", result.session_files);
    println!("event_rows {}", result.event_rows);
    println!("live_event_rows {}", result.live_event_rows);
    println!("source_root {}", result.source_root);
    for issue in &result.issues {
        eprintln!("skipped {}: {}", issue.file_path, issue.message);
    }
    Ok(())
}

fn run_status(config: &SyncConfig) -> Result<(), String> {
    let store = ReportStore::at(&config.data_root);
    match store.read_sync_status().map_err(|err| err.to_string())? {
        Some(status) => {
            let rendered = serde_json::to_string(&status).map_err(|err| err.to_string())?;
            println!("sync_last_status_json={rendered}");
        }
        None => println!("sync_last_status_json=none"),
    }
    println!(
        "events_file={}",
        store.path(usage_store::EVENTS_FILE).display()
    );
    Ok(())
}

fn run_total(config: &SyncConfig, range: &str) -> Result<(), String> {
    let window = TimeWindow::parse(range).ok_or_else(|| format!("unknown range: {range}"))?;
    let store = ReportStore::at(&config.data_root);
    if !store.path(usage_store::EVENTS_FILE).exists() {
        return Err("no synced events found. Run: usage-sync sync".to_string());
    }
    let events = store
        .read_events()
        .map_err(|err| format!("read events: {err}"))?;
    let summary = summarize(&events, window.cutoff(Utc::now().timestamp()));
    let rendered = serde_json::to_string_pretty(&json!({
        "range": range,
        "project_slug": null,
        "events": summary.events,
        "input": summary.input,
        "output": summary.output,
        "cache_read": summary.cache_read,
        "cache_create": summary.cache_create,
        "billable": summary.billable,
        "total_with_cache": summary.total_with_cache,
    }))
    .map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}
