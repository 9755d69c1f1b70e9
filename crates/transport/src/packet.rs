use serde::{Deserialize, Serialize};

use hyperdbg_events::EventKind;
use hyperdbg_parser::{CompiledScript, OperandKind, Symbol, SymbolKind, VariableBounds};

use crate::error::TransportError;

/// 64-bit indicator every packet begins with (spec §6.1), the bytes of the
/// ASCII string `HYPERDBG` read as a big-endian `u64`.
pub const HYPERDBG_INDICATOR: u64 = 0x4859_5045_5244_4247;

/// `REGISTER_EVENT`'s struct payload, carried ahead of the compiled
/// condition script. This is the log/debug-facing form (`serde`-derived per
/// `SPEC_FULL.md` §3); the compiled script itself travels as packed bytes,
/// not JSON, via [`pack_script`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralEvent {
    pub kind: EventKind,
    pub optional_context: Option<u64>,
    pub short_circuit_on_error: bool,
}

/// `ADD_ACTION_TO_EVENT`'s struct payload, carried ahead of the compiled
/// action script for the `RunScript` variant. `BreakToDebugger` and
/// `RunCustomCode` carry no trailing script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneralAction {
    BreakToDebugger,
    RunCustomCode { code: Vec<u8> },
    RunScript,
}

/// `tag` field alongside `action` for `MODIFY_EVENTS`. `ApplyToAll` is the
/// `DEBUGGER_MODIFY_EVENTS_APPLY_TO_ALL_TAG` sentinel (`SPEC_FULL.md` §4) —
/// kept as an explicit variant rather than a magic tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagSelectorWire {
    One(u32),
    ApplyToAll,
}

impl From<TagSelectorWire> for hyperdbg_events::TagSelector {
    fn from(w: TagSelectorWire) -> Self {
        match w {
            TagSelectorWire::One(tag) => hyperdbg_events::TagSelector::One(tag),
            TagSelectorWire::ApplyToAll => hyperdbg_events::TagSelector::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifyActionWire {
    Enable,
    Disable,
    Clear,
    Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyEventsRequest {
    pub tag: TagSelectorWire,
    pub action: ModifyActionWire,
}

/// Response to a `query` modify request; `None` for every other action since
/// they produce no reply body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifyEventsResponse {
    pub is_enabled: Option<bool>,
}

/// `DEBUGGEE_USER_INPUT`'s payload: a raw line captured from the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggeeUserInput {
    pub line: String,
}

/// `USER_DEBUGGER_PAUSE`'s payload (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PausedPacket {
    pub pid: u64,
    pub tid: u64,
    pub ip: u64,
    pub rflags: u64,
    pub is32bit: bool,
    pub event_tag: u32,
    pub calling_stage: u32,
    #[serde(with = "serde_bytes_array")]
    pub instr_bytes: [u8; 16],
    pub read_instruction_len: u8,
}

/// Small local helper since the workspace does not carry the `serde_bytes`
/// crate; `[u8; 16]` has no blanket `Serialize` impl of its own.
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
        bytes.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let v = Vec::<u8>::deserialize(d)?;
        let mut out = [0u8; 16];
        let n = v.len().min(16);
        out[..n].copy_from_slice(&v[..n]);
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    NonImmediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub text: String,
}

/// `COMMAND_RELOAD_SYMBOL`'s payload: a request to enumerate the current
/// process's modules and download PDBs for any missing from the resolver.
/// Carries no fields of its own beyond existing as a distinct packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandReloadSymbol;

/// Packs one [`Symbol`]'s `(kind tag, value)` pair to `word_width_bits`,
/// little-endian, truncating `value` if it does not fit. This truncation is
/// the reason a script must clear `CapabilityDescriptor::reject_reason`
/// (checked by the caller) before ever reaching this function — packing
/// itself performs no bounds checking.
fn symbol_kind_tag(kind: SymbolKind) -> u8 {
    match kind {
        SymbolKind::Operator(op) => op as u8,
        SymbolKind::Operand(OperandKind::Num) => 0x80,
        SymbolKind::Operand(OperandKind::Register) => 0x81,
        SymbolKind::Operand(OperandKind::PseudoRegister) => 0x82,
        SymbolKind::Operand(OperandKind::GlobalId) => 0x83,
        SymbolKind::Operand(OperandKind::LocalId) => 0x84,
        SymbolKind::Operand(OperandKind::Temp) => 0x85,
        SymbolKind::Operand(OperandKind::StackIndex) => 0x86,
        SymbolKind::Operand(OperandKind::StringRef) => 0x87,
    }
}

/// Packs a [`CompiledScript`]'s symbol stream to the debuggee's native word
/// width (spec §4.4 "Capability negotiation", §6.2). This is the sole
/// permitted re-encoding of a script on the wire: one `(tag_byte, value)`
/// pair per symbol, `value` truncated to `word_width_bits / 8` bytes.
///
/// Callers are expected to have already run the script through
/// `hyperdbg_vm::CapabilityDescriptor::reject_reason` so the truncation
/// below never discards a bit the debuggee would have needed.
pub fn pack_script(script: &CompiledScript, word_width_bits: u8) -> Vec<u8> {
    let word_bytes = (word_width_bits as usize) / 8;
    let mut out = Vec::with_capacity(4 + 4 + script.symbol_stream.len() * (1 + word_bytes));
    out.extend_from_slice(&(script.symbol_stream.len() as u32).to_le_bytes());
    out.extend_from_slice(&script.entry_offset.to_le_bytes());
    for sym in &script.symbol_stream {
        out.push(symbol_kind_tag(sym.kind));
        let value_bytes = sym.value.to_le_bytes();
        out.extend_from_slice(&value_bytes[..word_bytes.min(8)]);
    }
    out
}

fn symbol_kind_from_tag(tag: u8) -> Option<SymbolKind> {
    use hyperdbg_parser::OpCode;
    Some(match tag {
        0x80 => SymbolKind::Operand(OperandKind::Num),
        0x81 => SymbolKind::Operand(OperandKind::Register),
        0x82 => SymbolKind::Operand(OperandKind::PseudoRegister),
        0x83 => SymbolKind::Operand(OperandKind::GlobalId),
        0x84 => SymbolKind::Operand(OperandKind::LocalId),
        0x85 => SymbolKind::Operand(OperandKind::Temp),
        0x86 => SymbolKind::Operand(OperandKind::StackIndex),
        0x87 => SymbolKind::Operand(OperandKind::StringRef),
        raw if raw < 0x80 => {
            // SAFETY-free route: OpCode has no public from-repr, so every
            // variant is matched explicitly against its fixed discriminant.
            const OPS: &[OpCode] = &[
                OpCode::Add, OpCode::Sub, OpCode::Mul, OpCode::Div, OpCode::Mod,
                OpCode::Asr, OpCode::Asl, OpCode::Or, OpCode::Xor, OpCode::And,
                OpCode::Not, OpCode::Neg, OpCode::Inc, OpCode::Dec,
                OpCode::CmpEq, OpCode::CmpNeq, OpCode::CmpGt, OpCode::CmpLt,
                OpCode::CmpGte, OpCode::CmpLte,
                OpCode::Jmp, OpCode::JmpIfZero, OpCode::JmpIfNotZero,
                OpCode::Mov,
                OpCode::WriteByte, OpCode::WriteDword, OpCode::WriteQword, OpCode::Deref,
                OpCode::Printf,
                OpCode::EnableEvent, OpCode::DisableEvent, OpCode::Pause, OpCode::Flush,
                OpCode::EventSetCr3, OpCode::EventInject,
                OpCode::SpinlockLock, OpCode::SpinlockUnlock, OpCode::SpinlockLockCustomWait,
                OpCode::InterlockedExchange, OpCode::InterlockedExchangeAdd,
                OpCode::InterlockedIncrement, OpCode::InterlockedDecrement,
                OpCode::InterlockedCompareExchange,
                OpCode::StrLen, OpCode::WcsLen, OpCode::Hi, OpCode::Low,
            ];
            let op = *OPS.get(raw as usize)?;
            SymbolKind::Operator(op)
        }
        _ => return None,
    })
}

/// Inverse of [`pack_script`]. `variable_bounds` and `string_pool` are not
/// recoverable from the packed bytes alone (the spec's wire form only packs
/// the symbol stream itself) — callers that need them pass the ones
/// negotiated out of band, matching how `REGISTER_EVENT`'s struct payload
/// already carries the bounds separately from the script bytes.
pub fn unpack_script(
    bytes: &[u8],
    word_width_bits: u8,
    variable_bounds: VariableBounds,
    string_pool: Vec<String>,
) -> Result<CompiledScript, TransportError> {
    let word_bytes = (word_width_bits as usize) / 8;
    if bytes.len() < 8 {
        return Err(TransportError::Truncated);
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let entry_offset = u32::from_le_bytes(bytes[4..8].try_into().unwrap());

    let mut symbol_stream = Vec::with_capacity(count);
    let mut cursor = 8usize;
    for _ in 0..count {
        if cursor + 1 + word_bytes > bytes.len() {
            return Err(TransportError::Truncated);
        }
        let tag = bytes[cursor];
        cursor += 1;
        let mut value_bytes = [0u8; 8];
        value_bytes[..word_bytes.min(8)].copy_from_slice(&bytes[cursor..cursor + word_bytes.min(8)]);
        cursor += word_bytes;
        let value = u64::from_le_bytes(value_bytes);
        let kind = symbol_kind_from_tag(tag).ok_or(TransportError::Malformed)?;
        symbol_stream.push(Symbol { kind, value });
    }

    Ok(CompiledScript {
        symbol_stream,
        entry_offset,
        variable_bounds,
        string_pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips_a_script() {
        let script = hyperdbg_parser::compile_default("0n10 + 0n5;").unwrap();
        let packed = pack_script(&script, 64);
        let unpacked = unpack_script(
            &packed,
            64,
            script.variable_bounds,
            script.string_pool.clone(),
        )
        .unwrap();
        assert_eq!(unpacked.symbol_stream, script.symbol_stream);
        assert_eq!(unpacked.entry_offset, script.entry_offset);
    }

    #[test]
    fn pack_unpack_round_trips_at_32_bit_width() {
        let script = hyperdbg_parser::compile_default(r#"printf("hi %d", 0n1);"#).unwrap();
        let packed = pack_script(&script, 32);
        let unpacked = unpack_script(&packed, 32, script.variable_bounds, script.string_pool.clone()).unwrap();
        assert_eq!(unpacked.symbol_stream.len(), script.symbol_stream.len());
    }

    #[test]
    fn unpack_truncated_bytes_errors() {
        let err = unpack_script(&[1, 2, 3], 64, VariableBounds::default(), Vec::new()).unwrap_err();
        assert_eq!(err, TransportError::Truncated);
    }

    #[test]
    fn general_event_round_trips_through_json() {
        let event = GeneralEvent {
            kind: EventKind::Cpuid,
            optional_context: Some(42),
            short_circuit_on_error: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: GeneralEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
