use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use protocol_failover::candidate::{DEFAULT_PORT, WIREGUARD};
use protocol_failover::config::NETWORK_DEBOUNCE_MS;
use protocol_failover::control::{self, Control};
use protocol_failover::{
    ConnectionMode, ConnectivityMonitor, DynamicConfig, NetworkState, ProtocolPort,
    ResetScheduler, Selector, StaticCatalog, TunnelMonitor,
};

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "failover_selector",
    author,
    version,
    disable_version_flag = true,
    about = "VPN protocol/port failover selector"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    /// JSON catalog of protocols, ports and per-network preferences. The
    /// built-in protocol order is used when omitted.
    #[arg(long = "catalog")]
    catalog: Option<String>,

    /// Connection mode: auto (default) or manual
    #[arg(long = "mode", value_enum, default_value = "auto")]
    mode: ConnectionMode,
    /// Protocol used in manual mode
    #[arg(long = "manual-protocol", default_value = WIREGUARD)]
    manual_protocol: String,
    /// Port used in manual mode
    #[arg(long = "manual-port", default_value = DEFAULT_PORT)]
    manual_port: String,

    /// Unix domain socket path for runtime commands (e.g.,
    /// /tmp/failover.sock). Commands are read from stdin when omitted.
    #[arg(long = "control-socket")]
    control_socket: Option<String>,

    /// Seconds between known-good expiry checks
    #[arg(long = "expiry-tick-secs", default_value = "3600")]
    expiry_tick_secs: u64,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Cli::parse();
    if args.print_version {
        let version = env!("CARGO_PKG_VERSION");
        let git_hash = env!("GIT_HASH");
        let git_branch = env!("GIT_BRANCH");
        let git_dirty = env!("GIT_DIRTY");

        println!(
            "{} ({}@{}{}) [{}]",
            version,
            git_branch,
            git_hash,
            git_dirty,
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    if args.expiry_tick_secs == 0 {
        return Err(anyhow!("--expiry-tick-secs must be greater than zero"));
    }

    let catalog = match &args.catalog {
        Some(path) => StaticCatalog::load(path)?,
        None => {
            info!("no catalog given, using the built-in protocol order");
            StaticCatalog::default()
        }
    };
    let catalog = Arc::new(catalog);

    let config = DynamicConfig::from_cli(
        args.mode,
        ProtocolPort::new(args.manual_protocol, args.manual_port),
    );
    let connectivity = Arc::new(ConnectivityMonitor::new(NetworkState::default()));
    let tunnel = TunnelMonitor::new();

    let selector = Arc::new(Selector::new(
        catalog.clone(),
        connectivity.clone(),
        Arc::new(tunnel.clone()),
        config.clone(),
    ));
    let scheduler = Arc::new(ResetScheduler::with_period(
        selector.clone(),
        Duration::from_secs(args.expiry_tick_secs),
    ));

    control::spawn_network_watcher(
        &connectivity,
        selector.clone(),
        Duration::from_millis(NETWORK_DEBOUNCE_MS),
    );
    spawn_signal_logger(&selector);

    let control = Control {
        selector,
        scheduler: scheduler.clone(),
        config,
        catalog,
        connectivity,
        tunnel,
    };
    // Start command listener (stdin or Unix socket)
    control::spawn_control_listener(control, args.control_socket);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    scheduler.disarm();
    Ok(())
}

fn spawn_signal_logger(selector: &Selector) {
    let mut signals = selector.subscribe();
    tokio::spawn(async move {
        while signals.changed().await.is_ok() {
            let signal = signals.borrow_and_update().clone();
            match &signal.connect {
                Some(pair) => info!("[{}] {:?}: connect with {}", signal.seq, signal.origin, pair),
                None => debug!("[{}] {:?}: next up {}", signal.seq, signal.origin, signal.top),
            }
        }
        warn!("candidate signal closed");
    });
}
