use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vidqueue::config::default_config_path;
use vidqueue::orchestrator::Downloaded;
use vidqueue::queue::ItemResult;
use vidqueue::utils::human_size;
use vidqueue::{
    Backend, Config, DownloadObserver, DownloadOrchestrator, DownloadRequest, DownloadStatus,
    ErrorKind, JsonStore, Outcome, Phase, Platform, Progress, QueueItem, QueueObserver,
    QueueOrchestrator, QueueStore, QueueSummary, SettingsStore, VidQueueError, pick_platform,
};

const VERSION: &str = const_str::concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    git_version::git_version!(fallback = "unknown"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "vidqueue",
    version = VERSION,
    about = "Queue videos, pick a format and download them",
    long_about = "Queue videos from YouTube and Twitter, pick a format and download them.\n\
    Extraction is done by yt-dlp, which must be installed.\n\n\
    Examples:\n\
      vidqueue info https://youtu.be/dQw4w9WgXcQ               # Show formats\n\
      vidqueue add -f '720p 30fps' https://youtu.be/dQw4w9WgXcQ # Queue a format\n\
      vidqueue run -d ./videos                                 # Download the queue\n\
      vidqueue get -d ./videos https://x.com/a/status/1        # One-shot download"
)]
struct Args {
    /// Configuration file (created with defaults when missing)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List supported platforms
    Platforms,

    /// Show title, author and available formats
    Info {
        #[arg(short, long, help = "Platform name (auto-detected from the URL by default)")]
        platform: Option<String>,
        url: String,
    },

    /// Fetch info and thumbnail, then add the URL to the queue
    Add {
        #[arg(short, long)]
        platform: Option<String>,
        #[arg(short = 'f', long = "format", help = "Format label, best available by default")]
        format: Option<String>,
        url: String,
    },

    /// Show the queue
    List,

    /// Remove one queued item
    Remove { id: i64 },

    /// Remove every queued item
    Clear,

    /// Download every queued item; Ctrl-C stops after abandoning the current one
    Run {
        #[arg(short = 'd', long = "dir", help = "Download to specified directory")]
        dir: PathBuf,
        #[arg(short = 'y', long, help = "Do not ask for confirmation")]
        yes: bool,
    },

    /// Download one URL without queueing it
    Get {
        #[arg(short, long)]
        platform: Option<String>,
        #[arg(short = 'f', long = "format")]
        format: Option<String>,
        #[arg(short = 'd', long = "dir", default_value = ".")]
        dir: PathBuf,
        url: String,
    },
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn user_error(e: VidQueueError) -> anyhow::Error {
    anyhow!("{}\n({})", e.user_message(), e)
}

/// Label and selector to queue: the requested label, or the best one.
/// `None` when the media offers no choice.
fn choose_format(
    backend: &dyn Backend,
    label: Option<&str>,
) -> anyhow::Result<Option<(String, String)>> {
    let names = backend.sorted_format_names();
    if names.is_empty() {
        return match label {
            Some(l) => bail!("No formats to choose from, cannot select '{}'", l),
            None => Ok(None),
        };
    }
    let label = match label {
        Some(l) if names.iter().any(|n| n == l) => l.to_string(),
        Some(l) => bail!(
            "Unknown format '{}'. Available: {}",
            l,
            names.join(", ")
        ),
        None => names[0].clone(),
    };
    let selector = backend
        .format_selectors()
        .into_iter()
        .find(|(l, _)| *l == label)
        .map(|(_, s)| s)
        .ok_or_else(|| user_error(VidQueueError::UnknownFormat(label.clone())))?;
    Ok(Some((label, selector)))
}

fn print_info(backend: &dyn Backend) {
    println!("Title:    {}", backend.title());
    println!("Author:   {}", backend.author());
    println!("Platform: {}", backend.platform());
    println!();

    let names = backend.sorted_format_names();
    if names.is_empty() {
        println!("No format selection available; the best format will be downloaded.");
        return;
    }
    println!("Available formats:");
    for name in names {
        let size = human_size(backend.total_bytes(name)).unwrap_or_else(|| "unknown size".into());
        println!("  {:<16} {}", name, size);
    }
}

fn print_item(item: &QueueItem) {
    println!(
        "[{}] {} ({}, {})",
        item.id,
        item.title,
        item.platform,
        item.format_label.as_deref().unwrap_or("best")
    );
    println!("    {}", item.url);
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Console presentation of downloads and queue runs.
#[derive(Default)]
struct Console {
    downloaded: Vec<i64>,
    in_progress: bool,
}

impl Console {
    fn end_progress_line(&mut self) {
        if self.in_progress {
            println!();
            self.in_progress = false;
        }
    }
}

impl DownloadObserver for Console {
    fn on_phase(&mut self, phase: Phase) {
        tracing::debug!(%phase, "phase");
        match phase {
            Phase::FetchingInfo => println!("Fetching info..."),
            Phase::Downloading => println!("Downloading..."),
            _ => {}
        }
    }

    fn on_info_ready(&mut self, backend: &dyn Backend) {
        println!("{} - {}", backend.title(), backend.author());
    }

    fn on_progress(&mut self, progress: Progress) {
        match progress.status {
            DownloadStatus::Downloading => {
                let done = human_size(Some(progress.downloaded_bytes)).unwrap_or_default();
                match (progress.percent(), human_size(Some(progress.total_bytes))) {
                    (Some(pct), Some(total)) => print!("\r  {:5.1}%  {} / {}   ", pct, done, total),
                    _ => print!("\r  {}   ", done),
                }
                let _ = std::io::stdout().flush();
                self.in_progress = true;
            }
            DownloadStatus::Finished => {
                self.end_progress_line();
                println!("  done");
            }
            DownloadStatus::Error | DownloadStatus::Preparing => self.end_progress_line(),
        }
    }

    fn on_error(&mut self, _kind: ErrorKind, error: &VidQueueError) {
        self.end_progress_line();
        eprintln!("✗ {}", error.user_message());
    }
}

impl QueueObserver for Console {
    fn on_item_advanced(&mut self, item: &QueueItem, result: ItemResult<'_>) {
        match result {
            ItemResult::Downloaded(Downloaded { path, .. }) => {
                self.downloaded.push(item.id);
                println!("✓ [{}] saved to {}", item.id, path.display());
            }
            ItemResult::Problem(problem) => {
                println!("✗ [{}] {} moved to problems ({})", item.id, item.title, problem.kind);
            }
        }
        println!();
    }

    fn on_queue_finished(&mut self, summary: &QueueSummary) {
        let took = summary.finished_at - summary.started_at;
        println!(
            "Finished at {}: {} downloaded, {} problem(s){} in {}s",
            summary.finished_at.format("%H:%M:%S"),
            summary.success_count,
            summary.problems.len(),
            if summary.stopped { ", stopped" } else { "" },
            took.num_seconds()
        );
        for problem in &summary.problems {
            println!("  [{}] {}: {}", problem.item.id, problem.item.url, problem.message);
        }
    }
}

fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping...");
            trigger.cancel();
        }
    });
    cancel
}

async fn add(
    config: &Config,
    store: &mut JsonStore,
    platform: Option<&str>,
    format: Option<&str>,
    url: &str,
) -> anyhow::Result<()> {
    let platform = pick_platform(url, platform).map_err(user_error)?;
    let orch = DownloadOrchestrator::new(config.backend_context(), config.orchestrator_settings());
    let cancel = ctrl_c_token();

    let backend = orch
        .fetch_info(platform, url, &cancel)
        .await
        .map_err(user_error)?;
    let chosen = choose_format(backend.as_ref(), format)?;
    let label = chosen.as_ref().map(|(l, _)| l.as_str());
    if store.exists(url, label)? {
        bail!("{} ({}) is already queued", url, label.unwrap_or("best"));
    }

    let thumbnail = orch
        .fetch_thumbnail(backend.clone(), &cancel)
        .await
        .map_err(user_error)?;

    let mut item = QueueItem::new(url, platform.to_string(), backend.title()).with_thumbnail(thumbnail);
    if let Some((label, selector)) = chosen {
        item = item.with_format(label, selector);
    }
    let id = store.add(item)?;
    println!("Queued [{}] {}", id, backend.title());
    Ok(())
}

async fn run_queue(
    config: &Config,
    store: &mut JsonStore,
    dir: &Path,
    yes: bool,
) -> anyhow::Result<()> {
    let items = store.get_all()?;
    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    if !yes
        && store.confirm_download()?
        && !confirm(&format!("Download {} item(s) to {}?", items.len(), dir.display()))?
    {
        return Ok(());
    }

    let queue = QueueOrchestrator::new(DownloadOrchestrator::new(
        config.backend_context(),
        config.orchestrator_settings(),
    ));
    let mut console = Console::default();
    let summary = queue.run(items, dir, &mut console, &ctrl_c_token()).await;

    for id in &console.downloaded {
        store.delete_by_id(*id)?;
    }
    if !summary.problems.is_empty() {
        bail!("{} item(s) could not be downloaded", summary.problems.len());
    }
    Ok(())
}

async fn get(
    config: &Config,
    platform: Option<&str>,
    format: Option<&str>,
    dir: &Path,
    url: &str,
) -> anyhow::Result<()> {
    let platform = pick_platform(url, platform).map_err(user_error)?;
    let orch = DownloadOrchestrator::new(config.backend_context(), config.orchestrator_settings());
    let cancel = ctrl_c_token();
    let mut console = Console::default();

    let backend = orch
        .fetch_info(platform, url, &cancel)
        .await
        .map_err(user_error)?;
    console.on_info_ready(backend.as_ref());
    let chosen = choose_format(backend.as_ref(), format)?;
    let request = DownloadRequest {
        url: url.to_string(),
        platform,
        selector: chosen.map(|(_, s)| s),
        target_dir: dir.to_path_buf(),
    };

    match orch.run_opened(backend, &request, &mut console, &cancel).await {
        Outcome::Done(done) => {
            println!("✓ Saved to: {}", done.path.display());
            Ok(())
        }
        Outcome::Failed(e) => Err(user_error(e)),
        Outcome::Cancelled => bail!("Cancelled"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path().map_err(user_error)?,
    };
    let config = Config::load_or_create(&config_path)
        .await
        .map_err(user_error)?;
    init_logging(&config)?;
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    match args.command {
        Command::Platforms => {
            for name in Platform::names() {
                println!("{}", name);
            }
        }
        Command::Info { platform, url } => {
            let platform = pick_platform(&url, platform.as_deref()).map_err(user_error)?;
            let orch =
                DownloadOrchestrator::new(config.backend_context(), config.orchestrator_settings());
            let backend = orch
                .fetch_info(platform, &url, &ctrl_c_token())
                .await
                .map_err(user_error)?;
            print_info(backend.as_ref());
        }
        Command::Add {
            platform,
            format,
            url,
        } => {
            let mut store = JsonStore::open(&config.queue_file)?;
            add(&config, &mut store, platform.as_deref(), format.as_deref(), &url).await?;
        }
        Command::List => {
            let store = JsonStore::open(&config.queue_file)?;
            let items = store.get_all()?;
            if items.is_empty() {
                println!("Queue is empty.");
            }
            items.iter().for_each(print_item);
        }
        Command::Remove { id } => {
            let mut store = JsonStore::open(&config.queue_file)?;
            store.delete_by_id(id).map_err(user_error)?;
            println!("Removed [{}]", id);
        }
        Command::Clear => {
            let mut store = JsonStore::open(&config.queue_file)?;
            store.delete_all()?;
            println!("Queue cleared.");
        }
        Command::Run { dir, yes } => {
            let mut store = JsonStore::open(&config.queue_file)?;
            run_queue(&config, &mut store, &dir, yes).await?;
        }
        Command::Get {
            platform,
            format,
            dir,
            url,
        } => {
            get(&config, platform.as_deref(), format.as_deref(), &dir, &url).await?;
        }
    }

    Ok(())
}
