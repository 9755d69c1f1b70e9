use thiserror::Error;

/// Failures the interpreter itself can report, distinct from the errors its
/// collaborators (`hyperdbg-parser`, `hyperdbg-events`, `hyperdbg-breakpoints`)
/// already define — those are wrapped rather than re-described.
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("'{command}' expects {expected}, got '{got}'")]
    BadArguments {
        command: String,
        expected: &'static str,
        got: String,
    },

    #[error("{0}")]
    Compile(#[from] hyperdbg_parser::ParseError),

    #[error(transparent)]
    Event(#[from] hyperdbg_events::EventError),

    #[error(transparent)]
    Breakpoint(#[from] hyperdbg_breakpoints::BreakpointError),

    #[error(transparent)]
    Vm(#[from] hyperdbg_vm::VmError),

    #[error("operation not permitted in this mode: {0}")]
    OperationNotPermittedInThisMode(&'static str),
}
