//! Evaluator for compiled HyperDbg scripts.
//!
//! Fetch-decode-execute loop over a flat [`hyperdbg_parser::CompiledScript`]
//! symbol stream, against a read-only [`GuestRegisters`] snapshot and
//! caller-owned global variable storage. Allocation-free at dispatch time
//! once the per-invocation local/temp arrays are sized (spec §9 "Arena +
//! index for the VM") — a hard requirement for the kernel-side debuggee, not
//! just the controller.

mod capability;
mod error;
mod eval;
mod host;
mod output;
mod printf;
mod registers;

pub use capability::{CapabilityDescriptor, OpcodeSupport};
pub use error::VmError;
pub use eval::{Vm, VmOutcome};
pub use host::{FakeMemoryHost, MemoryHost, NullMemoryHost, PseudoRegisterHost};
pub use output::{CapturingSink, NullSink, OutputSink};
pub use registers::GuestRegisters;
