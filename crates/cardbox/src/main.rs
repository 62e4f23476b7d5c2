use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cardbox::activity::SharedState;
use cardbox::mpd::MpdClient;
use cardbox::player::PlaybackController;
use cardbox::reader::{LineReader, TagActivationLoop};
use cardbox::scene::{HeadlessScene, SceneController, UiEvent, UiNotifier};
use cardbox::shutdown::{self, ShutdownReason, ShutdownSignal};
use cardbox_proto::config::{Config, LoggingConfig};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// RFID card music box: tap a card, hear its playlist.
#[derive(Parser, Debug)]
#[command(name = "cardbox", version, about)]
struct Cli {
    /// Log at debug level (default: errors only). RUST_LOG overrides.
    #[arg(long)]
    debug: bool,

    /// Config file (default: ~/.config/cardbox/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn init_logging(debug: bool, logging: &LoggingConfig) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "error" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(log_file))
                    .with_ansi(false),
            )
        }
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_logging(cli.debug, &config.logging)?;
    info!(
        "Config loaded from: {:?}",
        cli.config.clone().unwrap_or_else(Config::config_path)
    );

    let shutdown = ShutdownSignal::new();
    let _signals = shutdown::spawn_signal_listener(shutdown.clone());

    let controller = Arc::new(PlaybackController::from_config(
        MpdClient::new(config.mpd.command_timeout()),
        &config.mpd,
    ));

    // nothing else starts until mpd answers
    tokio::select! {
        _ = controller.initialize() => {}
        reason = shutdown.triggered() => {
            info!("Shutdown ({:?}) before mpd became reachable", reason);
            return Ok(());
        }
    }

    let shared = Arc::new(SharedState::new());
    let (ui_tx, ui_rx) = tokio::sync::mpsc::channel::<UiEvent>(32);
    controller.link_observer(Arc::new(UiNotifier::new(ui_tx)));

    let mut tag_loop = TagActivationLoop::spawn(
        LineReader::stdin(),
        controller.clone(),
        shared.clone(),
        &config.reader,
        tokio::runtime::Handle::current(),
    )
    .context("starting tag reader thread")?;

    let mut ui = SceneController::new(
        controller.clone(),
        HeadlessScene::new(config.ui.images_dir.clone()),
        shared,
        shutdown.clone(),
        &config.ui,
        &config.display,
    );
    let reason = ui.run(ui_rx).await;

    info!("Shutting down: {:?}", reason);
    // joins the reader thread, which may be inside a play() right now
    if let Err(e) = tokio::task::spawn_blocking(move || tag_loop.terminate()).await {
        error!("tag reader shutdown failed: {}", e);
    }
    controller.close().await;

    if reason == ShutdownReason::Idle && config.power.power_off_on_idle {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Err(e) = shutdown::power_off(&config.power.command).await {
            warn!("Power-off failed: {:#}", e);
        }
    }

    info!("Bye");
    Ok(())
}
