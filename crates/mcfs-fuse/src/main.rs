//! mcfs - Mount Materials Commons projects as FUSE filesystems.
//!
//! Usage: mcfs mount <MOUNTPOINT> -p <ID> --api-url <URL> --api-token <TOKEN>
//!
//! `--api-url` and `--api-token` default to `MC_API_URL` and `MC_API_TOKEN`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcfs_api::{CatalogClient, ClientConfig};
use mcfs_fuse::{McFs, MountConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "mcfs")]
#[command(about = "Mount Materials Commons projects as FUSE filesystems")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount a project's file tree
    Mount(MountArgs),
}

#[derive(clap::Args)]
struct MountArgs {
    /// Mountpoint for the filesystem
    mountpoint: PathBuf,

    /// Numeric id of the project to expose
    #[arg(short = 'p', long)]
    project_id: u64,

    /// Base URL of the catalog API
    #[arg(long, env = "MC_API_URL", default_value = "https://materialscommons.org/api")]
    api_url: String,

    /// API token
    #[arg(long, env = "MC_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Seconds a directory listing is served from memory
    #[arg(long, default_value_t = 10)]
    cache_timeout: u64,

    /// Mount as read-only (default: read-write)
    #[arg(long)]
    read_only: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    accept_invalid_certs: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Command::Mount(args) => run_mount(args),
    }
}

fn run_mount(mut args: MountArgs) -> Result<()> {
    if !args.mountpoint.exists() {
        anyhow::bail!("Mountpoint does not exist: {}", args.mountpoint.display());
    }

    let token = Zeroizing::new(std::mem::take(&mut args.api_token));
    let client_config = ClientConfig::new(&args.api_url, token.as_str(), args.project_id)
        .context("Invalid API URL")?
        .accept_invalid_certs(args.accept_invalid_certs);
    drop(token);
    if args.accept_invalid_certs {
        warn!("TLS certificate verification disabled");
    }
    let client = CatalogClient::new(client_config).context("Failed to build HTTP client")?;

    let config = MountConfig::default()
        .cache_timeout(Duration::from_secs(args.cache_timeout))
        .read_only(args.read_only);

    info!(
        project_id = args.project_id,
        api_url = %args.api_url,
        mount = %args.mountpoint.display(),
        "Mounting project"
    );

    let fs = McFs::new(Arc::new(client), config).context("Failed to resolve project root")?;

    mount_and_wait(&args, fs)
}

/// What a SIGINT/SIGTERM asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// First signal: unmount cleanly.
    Unmount,
    /// Any later signal: the unmount is stuck, leave now.
    ForceExit,
}

fn on_interrupt(received: &AtomicUsize) -> Interrupt {
    if received.fetch_add(1, Ordering::SeqCst) == 0 {
        Interrupt::Unmount
    } else {
        Interrupt::ForceExit
    }
}

/// Mount the filesystem and wait for Ctrl+C.
fn mount_and_wait(args: &MountArgs, fs: McFs) -> Result<()> {
    let mut options = vec![
        fuser::MountOption::FSName("mcfs".to_string()),
        fuser::MountOption::Subtype(format!("project{}", args.project_id)),
        fuser::MountOption::AutoUnmount,
    ];

    #[cfg(target_os = "macos")]
    options.push(fuser::MountOption::CUSTOM(format!("volname=project{}", args.project_id)));

    if args.read_only {
        options.push(fuser::MountOption::RO);
    } else {
        options.push(fuser::MountOption::RW);
    }

    let (tx, rx) = mpsc::channel::<()>();

    let signals = AtomicUsize::new(0);
    ctrlc::set_handler(move || match on_interrupt(&signals) {
        Interrupt::Unmount => {
            let _ = tx.send(());
        }
        Interrupt::ForceExit => {
            warn!("Second interrupt received, exiting without a clean unmount");
            std::process::exit(130);
        }
    })
    .context("Failed to set signal handler")?;

    info!("Mounting filesystem (press Ctrl+C to unmount, twice to force exit)");

    let session = fuser::spawn_mount2(fs, &args.mountpoint, &options).map_err(|e| {
        error!(error = %e, "Mount failed");
        anyhow::anyhow!("Failed to mount filesystem: {e}")
    })?;

    info!("Filesystem mounted at {}", args.mountpoint.display());

    match rx.recv() {
        Ok(()) => info!("Received interrupt signal, unmounting..."),
        Err(_) => warn!("Signal channel closed unexpectedly"),
    }

    drop(session);
    info!("Filesystem unmounted");
    Ok(())
}
