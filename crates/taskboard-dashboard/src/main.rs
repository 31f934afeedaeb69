use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use taskboard_dashboard::{console, report, Dashboard, DashboardConfig, UserAction};

#[derive(Parser, Debug)]
#[command(name = "taskboard", version, about = "Live task-status dashboard")]
struct Cli {
    /// Config file (default: <config dir>/taskboard/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chart endpoint URL
    #[arg(long)]
    api_url: Option<String>,

    /// Live update channel URL
    #[arg(long)]
    ws_url: Option<String>,

    /// Run without the console, logging a summary on every change
    #[arg(long, conflicts_with = "once")]
    headless: bool,

    /// Fetch once, print the projection as JSON and exit
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Console,
    Headless,
    Once,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    config.apply_env();
    config.apply_overrides(cli.api_url, cli.ws_url);

    let mode = if cli.once {
        Mode::Once
    } else if cli.headless {
        Mode::Headless
    } else {
        Mode::Console
    };
    init_logging(&config, mode)?;

    match mode {
        Mode::Once => run_once(config).await,
        Mode::Headless => run_headless(config).await,
        Mode::Console => run_console(config).await,
    }
}

/// Console mode logs to a file so the TUI is not corrupted; the other modes
/// log to stderr.
fn init_logging(config: &DashboardConfig, mode: Mode) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    if mode == Mode::Console {
        if let Some(path) = config.log_file() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
            return Ok(());
        }
        // No writable location: stay quiet rather than draw over the console.
        fmt()
            .with_env_filter(EnvFilter::new("off"))
            .with_writer(std::io::sink)
            .init();
        return Ok(());
    }

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run_once(config: DashboardConfig) -> anyhow::Result<()> {
    let mut dashboard = Dashboard::new(config)?;
    dashboard.refresh().await.context("snapshot fetch failed")?;
    println!("{}", report::to_json(&dashboard.view())?);
    Ok(())
}

async fn run_headless(config: DashboardConfig) -> anyhow::Result<()> {
    let dashboard = Dashboard::new(config)?;
    let mut views = dashboard.subscribe();
    let (actions_tx, actions_rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut last_revision = None;
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            if last_revision != Some(view.revision) {
                last_revision = Some(view.revision);
                tracing::info!(
                    revision = view.revision,
                    last_updated = ?view.last_updated,
                    "{}",
                    report::summary(&view)
                );
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            let _ = actions_tx.send(UserAction::Quit).await;
        }
    });

    dashboard.run(actions_rx).await
}

async fn run_console(config: DashboardConfig) -> anyhow::Result<()> {
    let dashboard = Dashboard::new(config)?;
    let views = dashboard.subscribe();
    let (actions_tx, actions_rx) = mpsc::channel(16);

    let event_loop = tokio::spawn(dashboard.run(actions_rx));
    let console_result = console::run_console(views, actions_tx.clone()).await;

    let _ = actions_tx.send(UserAction::Quit).await;
    match event_loop.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Dashboard task failed"),
    }
    console_result
}
