use crate::error::TransportError;

/// Bit 31 of the 32-bit operation code: "must be handled locally" (spec
/// §6.1), set by the sender to tell the recipient this packet cannot be
/// forwarded further even if the recipient is itself relaying traffic.
pub const MUST_BE_HANDLED_LOCALLY: u32 = 1 << 31;

/// The packet kinds relevant to the core, keyed by the low 16 bits of the
/// operation code. Full HyperDbg has many more; these are the ones the
/// core's modules produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketOpcode {
    RegisterEvent = 1,
    AddActionToEvent = 2,
    ModifyEvents = 3,
    DebuggeeUserInput = 4,
    UserDebuggerPause = 5,
    LogInfo = 6,
    LogWarning = 7,
    LogError = 8,
    LogNonImmediate = 9,
    CommandReloadSymbol = 10,
}

impl PacketOpcode {
    fn from_low16(code: u16) -> Option<Self> {
        use PacketOpcode::*;
        Some(match code {
            1 => RegisterEvent,
            2 => AddActionToEvent,
            3 => ModifyEvents,
            4 => DebuggeeUserInput,
            5 => UserDebuggerPause,
            6 => LogInfo,
            7 => LogWarning,
            8 => LogError,
            9 => LogNonImmediate,
            10 => CommandReloadSymbol,
            _ => return None,
        })
    }

    /// Packs this opcode and the local-only flag into the wire's 32-bit
    /// operation code field.
    pub fn encode(self, must_be_handled_locally: bool) -> u32 {
        let code = self as u16 as u32;
        if must_be_handled_locally {
            code | MUST_BE_HANDLED_LOCALLY
        } else {
            code
        }
    }

    /// Splits a wire operation code back into its opcode and local-only
    /// flag.
    pub fn decode(raw: u32) -> Result<(Self, bool), TransportError> {
        let local = raw & MUST_BE_HANDLED_LOCALLY != 0;
        let low16 = (raw & 0xFFFF) as u16;
        let op = Self::from_low16(low16).ok_or(TransportError::UnknownOpcode(raw))?;
        Ok((op, local))
    }
}
