//! The interactive read-eval-print loop: one thread's worth of cooperative
//! async work reading stdin lines and reporting them to a [`Session`], plus
//! the inbound packet queue from [`crate::transport_io`] when a transport is
//! attached.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hyperdbg_interpreter::{CommandOutcome, FakeDebuggeeHost, InterpreterError, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::transport_io::InboundPacket;

/// Set by the Ctrl-C handler; long-running views are expected to poll this
/// and stop promptly rather than being forcibly cancelled (spec §5).
pub fn install_cancel_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_for_task = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag_for_task.store(true, Ordering::SeqCst);
        }
    });
    flag
}

/// Runs the REPL until stdin closes. Remote-forwarded commands are printed
/// with a `fwd>` prefix rather than actually transmitted, since packing a
/// `Forward`ed command line into a `DEBUGGEE_USER_INPUT` packet and writing
/// it to the transport is the one piece of wire I/O this controller leaves
/// as a caller hook (`on_forward`) rather than hardcoding a single
/// transport choice into the loop itself.
pub async fn run(
    mut session: Session<FakeDebuggeeHost>,
    mut inbound: Option<mpsc::Receiver<InboundPacket>>,
    cancel: Arc<AtomicBool>,
    mut on_forward: impl FnMut(&str),
) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, exiting");
                        break;
                    }
                    Err(err) => {
                        error!(%err, "reading stdin");
                        break;
                    }
                };
                if cancel.swap(false, Ordering::SeqCst) {
                    println!("err, interrupted");
                    continue;
                }
                report(session.feed_line(&line), &mut on_forward);
            }
            packet = recv_inbound(&mut inbound) => {
                match packet {
                    Some(InboundPacket::UserInput(line)) => {
                        report(session.feed_line(&line), &mut on_forward);
                    }
                    Some(InboundPacket::LogLine(text)) => println!("{text}"),
                    Some(InboundPacket::ReloadSymbolRequested) => {
                        info!("debuggee requested symbol reload");
                    }
                    Some(InboundPacket::Other { opcode }) => {
                        info!(?opcode, "unhandled inbound packet");
                    }
                    None => {
                        // No transport attached; never resolves again so the
                        // stdin branch above keeps driving the loop.
                        std::future::pending::<()>().await;
                    }
                }
            }
        }
    }
}

async fn recv_inbound(inbound: &mut Option<mpsc::Receiver<InboundPacket>>) -> Option<InboundPacket> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn report(
    outcome: Result<CommandOutcome, InterpreterError>,
    on_forward: &mut impl FnMut(&str),
) {
    match outcome {
        Ok(CommandOutcome::Text(text)) => println!("{text}"),
        Ok(CommandOutcome::Silent) => {}
        Ok(CommandOutcome::NeedsMoreInput) => {
            print!("> ");
            let _ = std::io::stdout().flush();
        }
        Ok(CommandOutcome::Forward(line)) => on_forward(&line),
        Err(err) => println!("err, {err}"),
    }
}
