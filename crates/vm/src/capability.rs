use bitflags::bitflags;

use hyperdbg_parser::{OpCode, VariableBounds};

bitflags! {
    /// Per-opcode support bits a debuggee advertises. Named after the
    /// opcode family, not the individual opcode, matching the original's
    /// coarser `func_add`/`func_mod`/`func_jmp`-style capability bits rather
    /// than one bit per `OpCode` variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpcodeSupport: u32 {
        const ARITHMETIC        = 1 << 0;
        const COMPARISON        = 1 << 1;
        const CONDITIONAL       = 1 << 2; // jz/jnz and the if/while/for family
        const JUMP               = 1 << 3; // unconditional jmp
        const MOVE               = 1 << 4;
        const MEMORY             = 1 << 5; // eb/ed/eq/poi
        const PRINTF              = 1 << 6;
        const EVENT_CONTROL       = 1 << 7;
        const SPIN_ATOMIC         = 1 << 8;
        const STRING_HELPERS      = 1 << 9;
    }
}

impl Default for OpcodeSupport {
    fn default() -> Self {
        Self::all()
    }
}

/// What the debuggee publishes about the script engine it can run: supported
/// opcode families, slot counts, and the VM's native word width for the wire
/// packing step (§4.4/§6.2). The controller checks a [`CompiledScript`]
/// against this before transfer and refuses with `CapabilityExceeded` if any
/// opcode or slot count is unsupported.
///
/// [`CompiledScript`]: hyperdbg_parser::CompiledScript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub opcodes: OpcodeSupport,
    pub max_stages: u32,
    pub max_operands_per_stage: u32,
    pub bounds: VariableBounds,
    /// Native word width of the debuggee's symbol representation, in bits
    /// (32 for a WoW64/user-mode debuggee, 64 otherwise). The sole permitted
    /// re-encoding of a script on the wire is packing/unpacking to this
    /// width (§4.4 "Capability negotiation").
    pub word_width_bits: u8,
}

impl Default for CapabilityDescriptor {
    fn default() -> Self {
        Self {
            opcodes: OpcodeSupport::default(),
            max_stages: 4096,
            max_operands_per_stage: 8,
            bounds: VariableBounds::default(),
            word_width_bits: 64,
        }
    }
}

impl CapabilityDescriptor {
    fn family_of(op: OpCode) -> OpcodeSupport {
        use OpCode::*;
        match op {
            Add | Sub | Mul | Div | Mod | Asr | Asl | Or | Xor | And | Not | Neg | Inc | Dec => {
                OpcodeSupport::ARITHMETIC
            }
            CmpEq | CmpNeq | CmpGt | CmpLt | CmpGte | CmpLte => OpcodeSupport::COMPARISON,
            JmpIfZero | JmpIfNotZero => OpcodeSupport::CONDITIONAL,
            Jmp => OpcodeSupport::JUMP,
            Mov => OpcodeSupport::MOVE,
            WriteByte | WriteDword | WriteQword | Deref => OpcodeSupport::MEMORY,
            Printf => OpcodeSupport::PRINTF,
            EnableEvent | DisableEvent | Pause | Flush | EventSetCr3 | EventInject => {
                OpcodeSupport::EVENT_CONTROL
            }
            SpinlockLock | SpinlockUnlock | SpinlockLockCustomWait | InterlockedExchange
            | InterlockedExchangeAdd | InterlockedIncrement | InterlockedDecrement
            | InterlockedCompareExchange => OpcodeSupport::SPIN_ATOMIC,
            StrLen | WcsLen | Hi | Low => OpcodeSupport::STRING_HELPERS,
        }
    }

    /// Whether this descriptor's debuggee can execute `op`.
    pub fn supports(&self, op: OpCode) -> bool {
        self.opcodes.contains(Self::family_of(op))
    }

    /// Checks a compiled script's opcode mix and slot usage against this
    /// descriptor. Returns the unsupported opcode family's name on the first
    /// mismatch found; `None` means the script is safe to transfer.
    pub fn reject_reason(
        &self,
        script: &hyperdbg_parser::CompiledScript,
    ) -> Option<String> {
        use hyperdbg_parser::SymbolKind;

        if script.variable_bounds.global_slots > self.bounds.global_slots
            || script.variable_bounds.local_slots > self.bounds.local_slots
            || script.variable_bounds.temp_slots > self.bounds.temp_slots
        {
            return Some("script variable bounds exceed debuggee capacity".to_string());
        }

        for sym in &script.symbol_stream {
            if let SymbolKind::Operator(op) = sym.kind {
                if !self.supports(op) {
                    return Some(format!("opcode {:?} unsupported by debuggee", op));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_supports_everything() {
        let cap = CapabilityDescriptor::default();
        assert!(cap.supports(OpCode::SpinlockLock));
        assert!(cap.supports(OpCode::Printf));
    }

    #[test]
    fn restricted_descriptor_rejects_unsupported_family() {
        let mut cap = CapabilityDescriptor::default();
        cap.opcodes.remove(OpcodeSupport::SPIN_ATOMIC);
        let script = hyperdbg_parser::compile_default("spinlock_lock(0n1);").unwrap();
        assert!(cap.reject_reason(&script).is_some());
    }

    #[test]
    fn script_within_bounds_is_accepted() {
        let cap = CapabilityDescriptor::default();
        let script = hyperdbg_parser::compile_default("0n1 + 0n2;").unwrap();
        assert!(cap.reject_reason(&script).is_none());
    }
}
