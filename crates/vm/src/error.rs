use thiserror::Error;

/// VM-level failures. Every variant is a *script-local* failure per spec §4.4
/// and §7: the VM records this on the firing action's context and returns;
/// it never panics the host process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("jump target {target} out of bounds (stream length {stream_len})")]
    BadJumpTarget { target: u64, stream_len: usize },

    #[error("unknown opcode encountered at symbol index {index}")]
    UnknownOpcode { index: usize },

    #[error("invalid memory address 0x{address:x}")]
    InvalidAddress { address: u64 },

    #[error("invalid or unmapped string pointer")]
    InvalidStringPointer,

    #[error("operand kind {0:?} is not writable")]
    NotWritable(hyperdbg_parser::OperandKind),

    #[error("unknown register id {0}")]
    UnknownRegister(u32),

    #[error("unknown pseudo-register id {0}")]
    UnknownPseudoRegister(u32),

    #[error("script exceeds debuggee capability: {0}")]
    CapabilityExceeded(String),

    #[error("operation not permitted in this mode: {0}")]
    OperationNotPermittedInThisMode(&'static str),

    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("{kind} slot {slot} out of range")]
    InvalidSlot { kind: &'static str, slot: u32 },
}
