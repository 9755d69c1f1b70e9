//! Host <-> debuggee packet ABI codec and sentinel-delimited framing.
//!
//! Every packet is `[indicator: u64][opcode: u32][body]` (spec §6.1); this
//! crate only concerns itself with the packet kinds the script-engine core
//! produces or consumes — the full HyperDbg wire protocol has many more.
//! Framing (how a stream of bytes is split into whole packet bodies) is a
//! separate concern from the packet body's own shape, kept in its own
//! module since a serial link and a TCP socket delimit frames differently
//! but share the same packet encoding.

mod error;
mod frame;
mod opcode;
mod packet;

pub use error::TransportError;
pub use frame::{encode_frame, FrameReader, Framing};
pub use opcode::{PacketOpcode, MUST_BE_HANDLED_LOCALLY};
pub use packet::{
    pack_script, unpack_script, CommandReloadSymbol, DebuggeeUserInput, GeneralAction,
    GeneralEvent, LogLevel, LogMessage, ModifyActionWire, ModifyEventsRequest,
    ModifyEventsResponse, PausedPacket, TagSelectorWire, HYPERDBG_INDICATOR,
};

use tracing::trace;

/// One fully-decoded packet header: opcode, local-only flag, and the body
/// bytes that follow it (still opcode-specific, undecoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader<'a> {
    pub opcode: PacketOpcode,
    pub must_be_handled_locally: bool,
    pub body: &'a [u8],
}

/// Wraps `payload` with the indicator and opcode header, ready to be handed
/// to [`encode_frame`] for the chosen transport.
pub fn encode_packet(opcode: PacketOpcode, must_be_handled_locally: bool, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + body.len());
    out.extend_from_slice(&HYPERDBG_INDICATOR.to_le_bytes());
    out.extend_from_slice(&opcode.encode(must_be_handled_locally).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Validates the indicator and decodes the opcode header of one packet
/// (already separated from the stream by a [`FrameReader`]). A framing
/// error here means the caller should resync at the next sentinel and log
/// a warning rather than mutate any state (spec §7, transport-level
/// framing errors).
pub fn decode_packet(bytes: &[u8]) -> Result<PacketHeader<'_>, TransportError> {
    if bytes.len() < 12 {
        return Err(TransportError::Truncated);
    }
    let indicator = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    if indicator != HYPERDBG_INDICATOR {
        return Err(TransportError::BadIndicator {
            expected: HYPERDBG_INDICATOR,
            found: indicator,
        });
    }
    let raw_opcode = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let (opcode, must_be_handled_locally) = PacketOpcode::decode(raw_opcode)?;
    trace!(?opcode, must_be_handled_locally, "packet decoded");
    Ok(PacketHeader { opcode, must_be_handled_locally, body: &bytes[12..] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_header() {
        let body = b"hello";
        let packet = encode_packet(PacketOpcode::DebuggeeUserInput, false, body);
        let header = decode_packet(&packet).unwrap();
        assert_eq!(header.opcode, PacketOpcode::DebuggeeUserInput);
        assert!(!header.must_be_handled_locally);
        assert_eq!(header.body, body);
    }

    #[test]
    fn decode_rejects_bad_indicator() {
        let mut bad = vec![0u8; 16];
        bad[0] = 0xff;
        let err = decode_packet(&bad).unwrap_err();
        assert!(matches!(err, TransportError::BadIndicator { .. }));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = decode_packet(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, TransportError::Truncated);
    }

    #[test]
    fn frame_then_packet_round_trip_over_serial() {
        let body = b"ping";
        let packet = encode_packet(PacketOpcode::LogInfo, false, body);
        let framed = encode_frame(&packet, Framing::Serial);

        let mut reader = FrameReader::new(Framing::Serial);
        let frames = reader.feed(&framed);
        assert_eq!(frames.len(), 1);
        let header = decode_packet(&frames[0]).unwrap();
        assert_eq!(header.opcode, PacketOpcode::LogInfo);
        assert_eq!(header.body, body);
    }
}
