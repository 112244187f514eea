mod core;
mod detector;
mod discord;
mod error;
mod fetch;
mod http;
mod player;
mod presence;
mod session;
mod station;

use clap::Parser;
use presence_proto::config::Config;
use presence_proto::state::StatusBoard;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Mirror what the local media player is playing to Discord Rich Presence.
#[derive(Debug, Parser)]
#[command(name = "music-presence", version)]
struct Args {
    /// Config file to use instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also log to stderr.
    #[arg(long)]
    foreground: bool,

    /// Override the poll interval in seconds.
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup file logging (+ stderr when running in the foreground)
    let data_dir = presence_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = presence_proto::platform::log_path();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = args
        .foreground
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,presence_daemon=debug")),
        )
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("music-presence log: {}", log_path.display());

    let config_path = args.config.unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)?;
    info!("Config loaded from: {:?}", config_path);
    if let Some(secs) = args.interval {
        config.poll.interval_secs = secs;
    }

    // Event channel: ticks, session signals, HTTP and Ctrl-C all funnel into DaemonCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);
    let board = StatusBoard::new();

    let daemon_core = core::DaemonCore::from_config(&config, board.clone(), event_tx.clone()).await?;

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            board.clone(),
            event_tx.clone(),
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = shutdown_tx.send(core::DaemonEvent::Shutdown).await;
        }
    });
    drop(event_tx);

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
