mod cache;
mod config;
mod error;
mod manifest;
mod network;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cache::{AssetRequest, CacheManager, CacheStorage, Fetcher, Intercepted, SqliteStorage};
use manifest::Manifest;
use network::HttpFetcher;

#[derive(Parser, Debug)]
#[command(name = "devtoolkit-cache")]
#[command(about = "Offline cache manager for the DevToolkit widgets")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/devtoolkit-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the core assets into this version's store
  Install,
  /// Delete old stores and make this version active
  Activate,
  /// Install, then activate
  Update,
  /// Request a URL through the cache
  Fetch {
    /// Absolute URL, or a path relative to the scope
    url: String,
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List stores and which one is active
  Stores,
}

/// Log to a file in the data directory; RUST_LOG overrides the default level.
fn init_logging(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, "devtoolkit-cache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(&config.log_dir())?;

  let scope = config.scope_url()?;
  let storage = Arc::new(SqliteStorage::open_at(&config.database_path())?);
  let fetcher = Arc::new(HttpFetcher::new()?);
  let manager = CacheManager::new(storage, fetcher.clone(), Manifest::builtin(), scope.clone())?;

  match args.command {
    Command::Install => install(&manager).await,
    Command::Activate => activate(&manager).await,
    Command::Update => {
      install(&manager).await?;
      activate(&manager).await
    }
    Command::Fetch {
      url,
      method,
      output,
    } => {
      let request = AssetRequest::parse(&method, &url, &scope)?;
      fetch(&manager, fetcher.as_ref(), request, output.as_deref()).await
    }
    Command::Stores => stores(&manager),
  }
}

async fn install(manager: &CacheManager<SqliteStorage, HttpFetcher>) -> Result<()> {
  let count = manager.on_install().await?;
  println!("Installed {} with {} core assets", manager.version(), count);
  Ok(())
}

async fn activate(manager: &CacheManager<SqliteStorage, HttpFetcher>) -> Result<()> {
  let report = manager.on_activate().await?;
  println!("Activated {}", manager.version());
  for name in &report.deleted {
    println!("  deleted {}", name);
  }
  if !report.is_complete() {
    eprintln!("Some old stores could not be deleted; they will be retried on the next activation:");
    for (name, reason) in &report.failed {
      eprintln!("  {}: {}", name, reason);
    }
  }
  Ok(())
}

async fn fetch(
  manager: &CacheManager<SqliteStorage, HttpFetcher>,
  fetcher: &HttpFetcher,
  request: AssetRequest,
  output: Option<&Path>,
) -> Result<()> {
  let outcome = match manager.on_intercept(request.clone()).await {
    Ok(outcome) => outcome,
    Err(e) if e.is_network() => {
      return Err(eyre!("{} is not cached and the network is unavailable: {}", request.url, e));
    }
    Err(e) => return Err(e.into()),
  };

  let source = outcome.source();
  let snapshot = match outcome.snapshot() {
    Some(snapshot) => snapshot.clone(),
    // Not ours to answer; go to the network like an uncontrolled page would
    None => fetcher.fetch(&request).await?,
  };
  let revalidation = match outcome {
    Intercepted::FromStore { revalidation, .. } => Some(revalidation),
    _ => None,
  };

  eprintln!(
    "{} {} [{}] {} bytes{}",
    snapshot.status,
    request.url,
    source,
    snapshot.body.len(),
    snapshot
      .header("content-type")
      .map(|t| format!(", {}", t))
      .unwrap_or_default()
  );

  match output {
    Some(path) => std::fs::write(path, &snapshot.body)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
    None => std::io::stdout().write_all(&snapshot.body)?,
  }

  // Let the background refresh land before the process exits
  if let Some(revalidation) = revalidation {
    revalidation
      .await
      .map_err(|e| eyre!("Background refresh panicked: {}", e))?;
  }

  if manager.write_failures() > 0 {
    eprintln!("warning: {} snapshot(s) could not be stored", manager.write_failures());
  }
  Ok(())
}

fn stores(manager: &CacheManager<SqliteStorage, HttpFetcher>) -> Result<()> {
  let storage = manager.storage();
  let active = storage.active_store()?;

  println!(
    "Build version {} ({:?}), {} core assets, {} external prefixes",
    manager.version(),
    manager.phase(),
    manager.manifest().core_assets.len(),
    manager.manifest().allowlist.len()
  );

  for name in storage.store_names()? {
    let Some(info) = storage.store_info(&name)? else {
      continue;
    };
    let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { " " };
    let installed = info
      .installed_at
      .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
      .unwrap_or_else(|| "not installed".to_string());
    println!(
      "{} {:<20} {:>5} entries  created {}  installed {}",
      marker,
      info.name,
      info.entries,
      info.created_at.format("%Y-%m-%d %H:%M:%S"),
      installed
    );
  }

  Ok(())
}
