//! `hyperdbgctrl`: the standalone REPL binary.

use anyhow::Result;
use clap::Parser;
use hyperdbg_ctrl::config::{HyperdbgConfig, TransportTarget};
use hyperdbg_ctrl::{repl, transport_io};
use hyperdbg_interpreter::{FakeDebuggeeHost, Session};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Startup options only — the command-line *script* syntax a running
/// session accepts is hand-rolled in `hyperdbg-interpreter`, not clap.
#[derive(Debug, Parser)]
#[command(name = "hyperdbgctrl", about = "HyperDbg script-engine controller")]
struct Cli {
    /// Overrides `HYPERDBG_SYMPATH`.
    #[arg(long)]
    sympath: Option<String>,
    /// Connect over a serial device instead of the env-configured transport.
    #[arg(long, conflicts_with = "tcp")]
    serial: Option<String>,
    /// Connect over TCP instead of the env-configured transport.
    #[arg(long, conflicts_with = "serial")]
    tcp: Option<String>,
    /// Start outside kernel-debugger mode (`pause` becomes unavailable).
    #[arg(long)]
    user_mode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = HyperdbgConfig::from_env();
    if let Some(sympath) = cli.sympath {
        config.symbol_search_path = sympath;
    }
    if let Some(serial) = cli.serial {
        config.transport = TransportTarget::Serial(serial);
    } else if let Some(tcp) = cli.tcp {
        config.transport = TransportTarget::Tcp(tcp);
    }
    if cli.user_mode {
        config.kernel_mode = false;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone())),
        )
        .init();

    info!("Starting HyperDbg controller (hyperdbgctrl)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(sympath = %config.symbol_search_path, "symbol search path");

    let mut session = Session::new(FakeDebuggeeHost::new());
    session.kernel_mode = config.kernel_mode;
    session.remote = !matches!(config.transport, TransportTarget::None);

    let inbound = transport_io::spawn_reader(config.transport.clone(), config.inbound_queue_depth);
    let cancel = repl::install_cancel_flag();

    repl::run(session, inbound, cancel, |line| {
        // A real deployment packs `line` into a `DEBUGGEE_USER_INPUT` packet
        // and writes it to the attached transport; printing here keeps the
        // REPL usable without one, matching the in-process-only mode the
        // test harness exercises.
        println!("fwd> {line}");
    })
    .await;

    Ok(())
}
