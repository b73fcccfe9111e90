//! disktools - drive the DiskTools offline cache from the command line.
//!
//! Registers the site's manifest into a versioned bucket, activates it, and
//! answers requests the way the page would see them: from the bucket when
//! cached, from the network otherwise.

mod host;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use disktools_core::{ActivationReport, Config, FetchRequest, InstallReport, Method, ServedResponse};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use host::{Host, HostOptions};

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "disktools.log";

#[derive(Debug, Parser)]
#[command(name = "disktools", version, about = "Offline cache manager for the DiskTools site")]
struct Cli {
    /// Site origin the manifest is resolved against
    #[arg(long, env = "DISKTOOLS_ORIGIN", global = true)]
    origin: Option<String>,

    /// Cache bucket name; bump it to invalidate everything on next activation
    #[arg(long, env = "DISKTOOLS_CACHE_NAME", global = true)]
    cache_name: Option<String>,

    /// Directory holding buckets and the registration record
    #[arg(long, env = "DISKTOOLS_STORAGE_DIR", global = true)]
    storage_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.config/disktools/config.json)
    #[arg(long, env = "DISKTOOLS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Behave as if the network were down
    #[arg(long, global = true)]
    offline: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, env = "DISKTOOLS_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Save --origin, --cache-name and --storage-dir to the config file
    Init,
    /// Install the manifest and activate it in one step
    Register,
    /// Fetch the manifest into the current bucket
    Install,
    /// Take control of requests and delete stale buckets
    Activate,
    /// Request a path or URL through the cache manager
    Fetch {
        target: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Mark the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Write the body here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show lifecycle state and stored buckets
    Status,
    /// Delete every bucket and the registration record
    Clear,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());
    info!(command = ?cli.command, "disktools starting");

    if let Command::Init = cli.command {
        return init(&cli);
    }

    let mut host = Host::open(HostOptions {
        config_path: cli.config,
        origin: cli.origin,
        cache_name: cli.cache_name,
        storage_dir: cli.storage_dir,
        offline: cli.offline,
    })
    .await?;

    match cli.command {
        // Handled before the host is opened.
        Command::Init => {}
        Command::Register => {
            let result = host.manager.register().await;
            host.persist()?;
            match result? {
                Some(report) => {
                    print_install(&report.install);
                    print_activation(&report.activation);
                }
                None => println!("{} is already active", host.config().cache_name()),
            }
        }
        Command::Install => {
            let result = host.manager.install().await;
            host.persist()?;
            print_install(&result?);
        }
        Command::Activate => {
            let report = host.manager.activate().await?;
            host.persist()?;
            print_activation(&report);
        }
        Command::Fetch {
            target,
            method,
            navigate,
            output,
        } => fetch(&host, &target, &method, navigate, output.as_deref()).await?,
        Command::Status => status(&host).await?,
        Command::Clear => {
            let removed = host.clear().await?;
            println!("Removed {} bucket(s)", removed.len());
            for name in removed {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

fn init(cli: &Cli) -> Result<()> {
    let path = match cli.config {
        Some(ref path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&path)?;
    if let Some(ref origin) = cli.origin {
        config.origin = Some(origin.clone());
    }
    if let Some(ref name) = cli.cache_name {
        config.cache_name = Some(name.clone());
    }
    if let Some(ref dir) = cli.storage_dir {
        config.storage_dir = Some(dir.clone());
    }

    // Reject settings that could never build a manager.
    config.cache_config(None, None)?;
    config.save_to(&path)?;
    println!("Saved {}", path.display());
    Ok(())
}

fn print_install(report: &InstallReport) {
    println!(
        "Installed {} ({} entries, {} bytes)",
        report.bucket, report.entries, report.bytes
    );
}

fn print_activation(report: &ActivationReport) {
    println!("Active bucket: {}", report.current);
    for name in &report.deleted {
        println!("  deleted stale bucket {}", name);
    }
    for failure in &report.failures {
        match failure.bucket {
            Some(ref name) => eprintln!("  warning: could not delete {}: {}", name, failure.error),
            None => eprintln!("  warning: could not list buckets: {}", failure.error),
        }
    }
}

async fn fetch(
    host: &Host,
    target: &str,
    method: &str,
    navigate: bool,
    output: Option<&Path>,
) -> Result<()> {
    let url = host.config().resolve(target)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let request = if navigate {
        FetchRequest::navigate(url)
    } else {
        FetchRequest::get(url)
    }
    .with_method(method);

    let served = host.manager.handle_fetch(&request).await?;
    eprintln!("{}", fetch_summary(&request, &served));

    let body = &served.response.body;
    match output {
        Some(path) => std::fs::write(path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout().write_all(body)?,
    }
    Ok(())
}

/// One status line per request, e.g. `navigate https://.../ 200 OK (812 bytes, cache)`.
fn fetch_summary(request: &FetchRequest, served: &ServedResponse) -> String {
    let kind = if request.is_navigation { "navigate" } else { "fetch" };
    let response = &served.response;
    format!(
        "{} {} {} {} ({} bytes, {})",
        kind,
        request.url,
        response.status,
        response.status_text,
        response.body.len(),
        served.source
    )
}

async fn status(host: &Host) -> Result<()> {
    let config = host.config();
    println!("Origin:  {}", config.origin());
    println!("Bucket:  {}", config.cache_name());
    println!("State:   {}", host.manager.state());
    println!("Storage: {}", host.storage_root().display());
    if let Some(record) = host.registration() {
        println!(
            "Record:  {} {} (updated {})",
            record.cache_name,
            record.state,
            record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    let buckets = host.manager.list_caches().await?;
    println!("Buckets: {}", buckets.len());
    for name in &buckets {
        let marker = if name == config.cache_name() { "*" } else { " " };
        println!("  {} {}", marker, name);
    }

    if buckets.iter().any(|b| b == config.cache_name()) {
        let urls = host.manager.cached_urls().await?;
        println!("Cached URLs: {}", urls.len());
        for url in urls {
            println!("  {}", url);
        }
    }
    Ok(())
}
