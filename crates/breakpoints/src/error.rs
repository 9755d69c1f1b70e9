use thiserror::Error;

/// Breakpoint engine failures. All three map directly to spec §7's
/// breakpoint-specific kinds; install failures never leave a partially
/// written byte or an orphaned descriptor behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakpointError {
    #[error("a breakpoint is already installed at virtual address {virtual_address:#x}")]
    BreakpointExists { virtual_address: u64 },

    #[error("no breakpoint with id {id}")]
    BreakpointIdNotFound { id: u32 },

    #[error("too many breakpoints installed without a continue")]
    TooManyBreakpointsWithoutContinue,

    #[error("virtual address {address:#x} could not be translated or is not accessible")]
    InvalidAddress { address: u64 },
}
