//! Serial/TCP read thread: decodes framed packets off the wire and hands
//! them to the REPL loop over a bounded channel, per spec §5's "one thread
//! for reading kernel/debuggee messages" and the serial read loop's
//! "sleep `default_speed_of_reading_kernel_messages` per poll to avoid
//! busy-looping".

use std::time::Duration;

use anyhow::{Context, Result};
use hyperdbg_transport::{decode_packet, FrameReader, Framing, PacketOpcode};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::TransportTarget;

/// How often the serial loop polls for new bytes when nothing is waiting.
/// Named after the original's `default_speed_of_reading_kernel_messages`.
const DEFAULT_SPEED_OF_READING_KERNEL_MESSAGES: Duration = Duration::from_millis(20);

/// One decoded packet, stripped to the fields the REPL loop acts on. Every
/// other opcode's body is kept raw since this controller only needs to
/// react to user input, pauses, and log text; it never needs to re-pack
/// them.
#[derive(Debug, Clone)]
pub enum InboundPacket {
    UserInput(String),
    LogLine(String),
    ReloadSymbolRequested,
    Other { opcode: PacketOpcode },
}

fn decode_inbound(bytes: &[u8]) -> Option<InboundPacket> {
    let header = match decode_packet(bytes) {
        Ok(h) => h,
        Err(err) => {
            warn!(%err, "malformed packet, resyncing at next sentinel");
            return None;
        }
    };
    Some(match header.opcode {
        PacketOpcode::DebuggeeUserInput => {
            InboundPacket::UserInput(String::from_utf8_lossy(header.body).into_owned())
        }
        PacketOpcode::LogInfo | PacketOpcode::LogWarning | PacketOpcode::LogError
        | PacketOpcode::LogNonImmediate => {
            InboundPacket::LogLine(String::from_utf8_lossy(header.body).into_owned())
        }
        PacketOpcode::CommandReloadSymbol => InboundPacket::ReloadSymbolRequested,
        other => InboundPacket::Other { opcode: other },
    })
}

/// Spawns the reader task for `target` and returns the receiving half of its
/// bounded inbound queue. `None` when no transport is configured, in which
/// case the REPL runs purely against the in-process fake host.
pub fn spawn_reader(
    target: TransportTarget,
    queue_depth: usize,
) -> Option<mpsc::Receiver<InboundPacket>> {
    let (tx, rx) = mpsc::channel(queue_depth);
    match target {
        TransportTarget::None => return None,
        TransportTarget::Tcp(addr) => {
            tokio::spawn(async move {
                if let Err(err) = run_tcp_reader(addr, Framing::Tcp, tx).await {
                    warn!(%err, "tcp reader task ended");
                }
            });
        }
        TransportTarget::Serial(path) => {
            tokio::spawn(async move {
                if let Err(err) = run_serial_reader(path, Framing::Serial, tx).await {
                    warn!(%err, "serial reader task ended");
                }
            });
        }
    }
    Some(rx)
}

async fn run_tcp_reader(
    addr: String,
    framing: Framing,
    tx: mpsc::Sender<InboundPacket>,
) -> Result<()> {
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to debuggee at {addr}"))?;
    let mut reader = FrameReader::new(framing);
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.context("reading from tcp transport")?;
        if n == 0 {
            debug!("tcp transport closed");
            return Ok(());
        }
        for frame in reader.feed(&buf[..n]) {
            if let Some(packet) = decode_inbound(&frame) {
                if tx.send(packet).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn run_serial_reader(
    path: String,
    framing: Framing,
    tx: mpsc::Sender<InboundPacket>,
) -> Result<()> {
    let mut file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening serial device {path}"))?;
    let mut reader = FrameReader::new(framing);
    let mut buf = [0u8; 1024];
    loop {
        let n = file.read(&mut buf).await.context("reading from serial transport")?;
        if n > 0 {
            for frame in reader.feed(&buf[..n]) {
                if let Some(packet) = decode_inbound(&frame) {
                    if tx.send(packet).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        tokio::time::sleep(DEFAULT_SPEED_OF_READING_KERNEL_MESSAGES).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdbg_transport::encode_packet;

    #[test]
    fn decodes_user_input_packet() {
        let packet = encode_packet(PacketOpcode::DebuggeeUserInput, false, b"bp 0x1000");
        match decode_inbound(&packet).unwrap() {
            InboundPacket::UserInput(line) => assert_eq!(line, "bp 0x1000"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_packet_decodes_to_none() {
        assert!(decode_inbound(&[1, 2, 3]).is_none());
    }
}
