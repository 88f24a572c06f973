//! vcr-proxy CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use vcr_proxy::clock::SystemClock;
use vcr_proxy::config::Config;
use vcr_proxy::network::{HttpClient, NetworkHandler};
use vcr_proxy::proxy::HttpProxy;
use vcr_proxy::recording::RecordReplayEngine;
use vcr_proxy::storage::CassetteStore;

const DEFAULT_PREFIX: &str = "test_server_recordings";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "serve" => {
            if args.len() < 3 {
                eprintln!("Usage: vcr-proxy serve <config.toml>");
                process::exit(1);
            }
            serve(Path::new(&args[2]))
        }
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: vcr-proxy stats <cassette-dir> [prefix]");
                process::exit(1);
            }
            let prefix = args.get(3).map_or(DEFAULT_PREFIX, String::as_str);
            show_stats(&PathBuf::from(&args[2]), prefix)
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'vcr-proxy' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("vcr-proxy v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: vcr-proxy <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve <config.toml>            Start the proxy");
    eprintln!("  stats <cassette-dir> [prefix]  Show cassette statistics");
    eprintln!();
    eprintln!("Log verbosity is controlled with RUST_LOG (default: info).");
}

fn serve(config_path: &Path) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tracing::info!(
        mode = ?config.mode,
        port = config.listen_port,
        cassette_dir = %config.cassette_dir.display(),
        "Starting vcr-proxy"
    );

    let store = CassetteStore::new(
        config.cassette_dir.clone(),
        config.cassette_prefix.clone(),
        config.refresh_cache_days,
        Arc::new(SystemClock),
    );
    let engine = RecordReplayEngine::new(store, HttpClient::from_config(&config), config.mode)
        .with_redacted_headers(&config.redaction.request_headers);
    let handler = NetworkHandler::new(&config, HttpProxy::new(&config, engine))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime
        .block_on(handler.run())
        .with_context(|| format!("Failed to serve on port {}", config.listen_port))
}

fn show_stats(dir: &Path, prefix: &str) -> anyhow::Result<()> {
    if !dir.exists() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let store = CassetteStore::new(dir, prefix, i64::MAX, Arc::new(SystemClock));
    let files = store.list()?;

    println!("Cassette directory: {}", dir.display());
    if files.is_empty() {
        println!("No cassettes with prefix '{prefix}'");
        return Ok(());
    }

    for file in files {
        let cassette = store
            .load(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;

        let mut by_status: BTreeMap<u16, usize> = BTreeMap::new();
        let mut by_uri: BTreeMap<&str, usize> = BTreeMap::new();
        for interaction in &cassette.interactions {
            *by_status.entry(interaction.response.status.code).or_default() += 1;
            *by_uri.entry(interaction.request.uri.as_str()).or_default() += 1;
        }

        println!();
        println!("{} ({})", file.path.display(), file.date);
        println!("  Interactions: {}", cassette.len());
        for (status, count) in &by_status {
            println!("  Status {status}: {count}");
        }
        for (uri, count) in &by_uri {
            println!("  {count:>5}  {uri}");
        }
    }

    Ok(())
}
