use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("packet body is shorter than its declared length")]
    Truncated,

    #[error("packet body could not be decoded")]
    Malformed,

    #[error("unrecognized packet opcode {0:#x}")]
    UnknownOpcode(u32),

    #[error("missing indicator, expected {expected:#x} found {found:#x}")]
    BadIndicator { expected: u64, found: u64 },

    #[error("script exceeds debuggee capability: {0}")]
    CapabilityExceeded(String),
}
