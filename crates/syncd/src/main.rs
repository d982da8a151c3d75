//! SAI Synchronization Daemon
//!
//! Main entry point for the syncd daemon. Listens on a Unix socket, serves one
//! control-plane session at a time against the simulated switch SDK and exits
//! once a session terminates.

use anyhow::Context;
use clap::Parser;
use sonic_sai::{VendorSai, VirtualSwitch};
use sonic_syncd::{
    server_endpoint_over_stream, BootMode, ChannelAdapter, CommunicationMode, SessionEnd,
    ShutdownHandle, Syncd, SyncdConfig, DEFAULT_CONFIG_PATH,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::signal;
use tracing::{error, info, warn};

/// SAI synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "syncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Warm start: reconcile against the saved identity table
    #[arg(short = 'w', long)]
    warm: bool,

    /// Answer every request before reading the next one
    #[arg(short = 's', long, conflicts_with = "deferred_sync")]
    sync_mode: bool,

    /// Let clients pipeline set and remove requests
    #[arg(long)]
    deferred_sync: bool,

    /// Use the SDK's native bulk calls
    #[arg(short = 'l', long)]
    enable_bulk: bool,

    /// SDK profile map file (key=value lines)
    #[arg(short = 'p', long)]
    profile: Option<PathBuf>,

    /// Unix socket to listen on
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Command-line values win over the configuration file.
    fn apply(&self, config: &mut SyncdConfig) {
        if self.warm {
            config.start_type = BootMode::Warm;
        }
        if self.sync_mode {
            config.communication_mode = CommunicationMode::Sync;
        }
        if self.deferred_sync {
            config.communication_mode = CommunicationMode::DeferredSync;
        }
        if self.enable_bulk {
            config.enable_bulk = true;
        }
        if let Some(profile) = &self.profile {
            config.profile_map_file = Some(profile.clone());
        }
        if let Some(socket) = &self.socket {
            config.socket_path = socket.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_json);

    info!("syncd: Starting SAI synchronization daemon");

    match run_daemon(args).await {
        Ok(()) => {
            info!("syncd: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("syncd: Daemon exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let layer = fmt::layer().with_target(true).with_thread_ids(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .init();
    }
}

async fn run_daemon(args: Args) -> anyhow::Result<()> {
    let mut config = SyncdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        start_type = ?config.start_type,
        communication_mode = ?config.communication_mode,
        enable_bulk = config.enable_bulk,
        socket = %config.socket_path.display(),
        "syncd: Configuration loaded"
    );

    let shutdown = setup_signal_handlers();
    let listener = bind(&config.socket_path)?;
    let sdk: Arc<dyn VendorSai> = Arc::new(VirtualSwitch::new());

    loop {
        let stream = tokio::select! {
            _ = shutdown.triggered() => {
                info!("syncd: Shutdown before a session started");
                break;
            }
            accepted = listener.accept() => accepted.context("accepting connection")?.0,
        };
        info!("syncd: Client connected");

        let (reader, writer) = stream.into_split();
        let endpoint = server_endpoint_over_stream(reader, writer, config.channel_capacity);
        let syncd = Syncd::new(Arc::clone(&sdk), config.clone(), endpoint.outbound.clone())?;
        let mut adapter = ChannelAdapter::new(syncd, endpoint, shutdown.clone());

        match adapter.run().await? {
            SessionEnd::Terminated => break,
            SessionEnd::Disconnected => {
                warn!("syncd: Client left before switch create, waiting for a new one");
            }
        }
    }

    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        warn!(error = %e, "syncd: Failed to remove socket file");
    }
    Ok(())
}

fn bind(path: &Path) -> anyhow::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "syncd: Removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
    }
    UnixListener::bind(path).with_context(|| format!("binding {}", path.display()))
}

/// Setup signal handlers for graceful shutdown
fn setup_signal_handlers() -> ShutdownHandle {
    let shutdown = ShutdownHandle::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("syncd: Received SIGINT/SIGTERM");
            handle.trigger();
        }
    });

    shutdown
}
