use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::session::{handle_message, InboundMessage};
use crate::core::coordinator::{Coordinator, CoordinatorDeps, CoordinatorHandle};
use crate::core::events::{BroadcastEmitter, SessionEvent};
use crate::core::http_client::HttpPageHost;
use crate::core::session::SessionPhase;
use crate::fs_paths::{AppPaths, DesktopPaths};
use crate::models::media::FormatKind;
use crate::platforms::traits::{DownloadHandle, DownloadService};
use crate::platforms::youtube::extract_video_id;
use crate::platforms::youtube::observer::{NavigationEvent, PageObserver};
use crate::storage::config;
use crate::storage::snapshot::{JsonFileStore, MemoryStore, SnapshotStore};
use crate::surface::ControlSurface;

#[derive(Parser)]
#[command(name = "streamcatch")]
#[command(version)]
#[command(about = "Lists the downloadable streams of a video page and hands one off for download")]
#[command(long_about = None)]
struct Cli {
    /// Video page URL
    url: String,

    /// Settings file path (defaults to the data directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Format kind used by --itag and --instructions
    #[arg(short, long, default_value = "video")]
    kind: FormatKind,

    /// Hand this format off to the download service
    #[arg(short, long, value_name = "ITAG")]
    itag: Option<String>,

    /// Write a download information sheet instead of listing formats
    #[arg(long)]
    instructions: bool,

    /// Directory the information sheet is written to
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Print the session state as JSON
    #[arg(long)]
    json: bool,

    /// Keep the session in memory only
    #[arg(long)]
    no_persist: bool,

    /// Seconds to wait for the page and its formats
    #[arg(long, default_value_t = 20)]
    timeout_secs: u64,
}

/// Prints each accepted submission as a JSON line so another program can
/// perform the transfer.
#[derive(Default)]
struct StdoutHandoff {
    next: AtomicU64,
}

#[async_trait]
impl DownloadService for StdoutHandoff {
    async fn submit(&self, url: &str, filename: &str) -> anyhow::Result<DownloadHandle> {
        let handle = DownloadHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        println!(
            "{}",
            serde_json::json!({ "handle": handle, "url": url, "filename": filename })
        );
        Ok(handle)
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamcatch_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let paths = DesktopPaths;
    let settings_path = cli.config.clone().unwrap_or_else(|| paths.settings_file());
    let settings = config::load_settings(&settings_path);
    tracing::debug!("Settings loaded from {}", settings_path.display());

    let Some(video_id) = extract_video_id(&cli.url) else {
        anyhow::bail!("{} is not a video page", cli.url);
    };

    let timeout = Duration::from_secs(cli.timeout_secs.max(1));
    let host = Arc::new(HttpPageHost::new(&cli.url, &settings.proxy, timeout)?);
    let store: Arc<dyn SnapshotStore> = if cli.no_persist {
        Arc::new(MemoryStore::new())
    } else {
        let file = paths.store_file(&settings.storage.store_file);
        tracing::debug!("Session snapshots in {}", file.display());
        Arc::new(JsonFileStore::new(file))
    };
    let emitter = Arc::new(BroadcastEmitter::new(settings.coordinator.event_capacity));
    let mut events = emitter.subscribe();

    let coordinator = Coordinator::spawn(
        CoordinatorDeps {
            host: host.clone(),
            store,
            downloads: Arc::new(StdoutHandoff::default()),
            events: emitter,
        },
        &settings,
    );

    let cancel = CancellationToken::new();
    let (nav_tx, nav_rx) = mpsc::channel(4);
    let observer = PageObserver::new(
        host,
        coordinator.clone(),
        Duration::from_millis(settings.observer.settle_delay_ms),
    );
    let watcher = tokio::spawn(observer.watch(nav_rx, cancel.clone()));
    nav_tx
        .send(NavigationEvent::FullLoad {
            location: cli.url.clone(),
        })
        .await
        .context("observer stopped early")?;

    let outcome = match wait_until_ready(&coordinator, &mut events, &video_id, timeout).await {
        Ok(()) => present(&cli, &coordinator, &paths).await,
        Err(e) => Err(e),
    };

    cancel.cancel();
    let _ = watcher.await;
    outcome
}

/// Waits until a catalog for `video_id` is committed. A session restored
/// from an earlier run for the same video counts as ready right away.
async fn wait_until_ready(
    coordinator: &CoordinatorHandle,
    events: &mut broadcast::Receiver<SessionEvent>,
    video_id: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let wait = async {
        loop {
            if let Ok(view) = coordinator.query().await {
                if view.phase == SessionPhase::Ready && view.identity.id == video_id {
                    return Ok(());
                }
            }
            match events.recv().await {
                Ok(SessionEvent::Ready { video_id: ready, .. }) if ready == video_id => return Ok(()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    anyhow::bail!("session ended before any format was read")
                }
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| anyhow::anyhow!("no video detected within {}s", timeout.as_secs()))?
}

async fn present(cli: &Cli, coordinator: &CoordinatorHandle, paths: &dyn AppPaths) -> anyhow::Result<()> {
    if cli.instructions {
        let sheet = coordinator
            .instructions(cli.kind)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let dir = cli.output_dir.clone().unwrap_or_else(|| paths.downloads_dir());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&sheet.filename);
        tokio::fs::write(&path, sheet.body).await?;
        println!("{}", path.display());
        return Ok(());
    }

    if cli.json {
        let reply = handle_message(coordinator, InboundMessage::QueryState).await;
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    let surface = ControlSurface::open(coordinator.clone()).await;

    if let Some(itag) = &cli.itag {
        let handle = surface
            .download(cli.kind, itag)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        tracing::info!("Handed off as download {}", handle);
        return Ok(());
    }

    if let Some(view) = surface.view() {
        println!("{} - {}", view.identity.title, view.identity.author);
    }
    if let Some(text) = surface.placeholder() {
        println!("{}", text);
    }
    for row in surface.rows() {
        let marker = if row.enabled { " " } else { "x" };
        println!("[{}] {:>5} {:<5} {}", marker, row.itag, row.kind.to_string(), row.text);
    }
    Ok(())
}
