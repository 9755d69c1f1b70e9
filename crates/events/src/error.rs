use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("no event with tag {0}")]
    TagNotFound(u32),

    #[error(transparent)]
    Breakpoint(#[from] hyperdbg_breakpoints::BreakpointError),
}
