use hyperdbg_parser::CompiledScript;

/// One entry in an event's action list, per spec glossary: "break to
/// debugger", "run custom code", or "run script".
#[derive(Debug, Clone)]
pub enum Action {
    BreakToDebugger,
    /// An opaque native code blob forwarded to the debuggee and executed by
    /// the hypervisor side (out of scope per spec §1); this crate only
    /// carries the payload and hands it to a [`CustomCodeRunner`].
    RunCustomCode { code: Vec<u8> },
    RunScript { compiled_script: CompiledScript },
}

/// Collaborator that actually executes a `run_custom_code` payload. The
/// event registry has no idea what the bytes mean; it is purely a relay,
/// matching the host-accessor pattern used by `hyperdbg-vm`.
pub trait CustomCodeRunner {
    fn run(&mut self, code: &[u8]) -> bool;
}

/// Discards every payload and reports failure; useful wherever custom code
/// execution is not wired up (tests, the controller side).
#[derive(Debug, Default)]
pub struct NullCustomCodeRunner;

impl CustomCodeRunner for NullCustomCodeRunner {
    fn run(&mut self, _code: &[u8]) -> bool {
        false
    }
}
