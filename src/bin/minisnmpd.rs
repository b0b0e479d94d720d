//! The minisnmpd daemon.
//!
//! Loads the configuration file, registers the built-in modules, binds the
//! UDP socket, and serves until SIGINT or SIGTERM. Privilege dropping and
//! daemonization are left to the service manager; the `user`/`group`
//! directives are accepted for configuration compatibility.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use minisnmpd::agent::{Agent, Config};
use minisnmpd::module::{Registry, SystemMib};
use minisnmpd::stats::SnmpStats;

#[derive(Parser)]
#[command(name = "minisnmpd", version, about = "Small SNMPv1 agent")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/etc/minisnmpd.conf")]
    config: PathBuf,

    /// Log filter (overrides RUST_LOG)
    #[arg(short, long)]
    log: Option<String>,
}

fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&args)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn serve(args: &Args) -> minisnmpd::Result<()> {
    let started = Instant::now();
    let stats = Arc::new(SnmpStats::new());

    let mut registry =
        Registry::with_builtins(started, SystemMib::new(started), stats.clone())?;

    let config = Config::load(&args.config, &mut registry)?;

    if config.user.is_some() || config.group.is_some() {
        tracing::warn!(
            "user/group directives accepted but not applied; drop privileges via the service manager"
        );
    }

    let pidfile = config.pidfile.clone();
    if let Some(path) = &pidfile {
        std::fs::write(path, format!("{}\n", std::process::id()))?;
    }

    let cancel = CancellationToken::new();
    let agent = Agent::from_config(&config, registry, stats, cancel.clone()).await?;

    tokio::spawn(shutdown_signal(cancel));

    let result = agent.run().await;

    if let Some(path) = &pidfile {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(pidfile = %path.display(), error = %e, "failed to remove pidfile");
        }
    }

    result
}

/// Cancel the agent on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => tracing::info!("caught SIGINT, shutting down"),
        _ = terminate.recv() => tracing::info!("caught SIGTERM, shutting down"),
    }

    cancel.cancel();
}
