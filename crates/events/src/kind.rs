use serde::{Deserialize, Serialize};

/// The hardware/software hook point an event is bound to. Names follow
/// spec §3's enumeration; each variant is the thing the debuggee side
/// arms, not anything this crate installs itself (EPT entries and MSR
/// bitmap bits are the hypervisor's concern, out of scope per §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    SoftwareBreakpoint,
    HiddenBreakpoint,
    Cpuid,
    MsrRead,
    MsrWrite,
    EptHookRead,
    EptHookWrite,
    EptHookExecute,
    Exception { vector: u8 },
    Syscall,
    Sysret,
    IoPort { port: u16 },
}
