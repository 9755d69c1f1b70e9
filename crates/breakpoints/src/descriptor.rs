/// The x86 single-byte breakpoint instruction (`int3`).
pub const TRAP_OPCODE: u8 = 0xCC;

/// Process/thread/core acceptance filter for a breakpoint. `None` in any
/// field means "any" for that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakpointFilter {
    pub process: Option<u64>,
    pub thread: Option<u64>,
    pub core: Option<u32>,
}

impl BreakpointFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn accepts(&self, process: u64, thread: u64, core: u32) -> bool {
        self.process.map_or(true, |p| p == process)
            && self.thread.map_or(true, |t| t == thread)
            && self.core.map_or(true, |c| c == core)
    }
}

/// One entry in the breakpoint table. Invariant (spec §3): while `enabled`
/// the byte at `physical_address` is [`TRAP_OPCODE`]; while disabled it is
/// `previous_byte`. `physical_address` is captured once at install time and
/// is the system of record for every later byte operation, including
/// removal — see `DESIGN.md` for why the virtual address is not used there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointDescriptor {
    pub id: u32,
    pub virtual_address: u64,
    pub physical_address: u64,
    pub previous_byte: u8,
    pub enabled: bool,
    pub instruction_length: u8,
    pub filter: BreakpointFilter,
    pub avoid_reapply: bool,
}
