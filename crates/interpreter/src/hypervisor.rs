/// Collaborator for the handful of commands whose real implementation is
/// out of scope per spec §1 (execution control, the disassembler, driver
/// install/remove) — the interpreter only needs to route to them, not
/// implement them. A real controller backs this with IOCTLs/transport
/// packets; tests back it with [`NullHypervisorControl`] or a fake.
pub trait HypervisorControl {
    /// `g`: resume guest execution. Returns `false` if not currently halted.
    fn resume(&mut self) -> bool;
    /// `p`: step one instruction, stepping over calls.
    fn step_over(&mut self) -> bool;
    /// `t`: step one instruction, tracing into calls.
    fn step_into(&mut self) -> bool;
    /// `u`: mnemonic text for the instruction at `address`, or `None` if the
    /// external disassembler collaborator has nothing to say about it.
    fn disassemble(&self, address: u64) -> Option<String>;
    /// `load`: install the driver equivalent. `Err` carries the message the
    /// command prints; the process exit status mirrors success/failure
    /// per spec §6.3.
    fn install_driver(&mut self) -> Result<(), String>;
    /// `unload`: remove the driver equivalent.
    fn remove_driver(&mut self) -> Result<(), String>;
}

/// Reports every operation as unavailable — the minimal implementation
/// needed for the commands to be dispatchable and testable without a live
/// hypervisor behind them, per spec §6.3's "core be testable" requirement.
#[derive(Debug, Default)]
pub struct NullHypervisorControl;

impl HypervisorControl for NullHypervisorControl {
    fn resume(&mut self) -> bool {
        false
    }
    fn step_over(&mut self) -> bool {
        false
    }
    fn step_into(&mut self) -> bool {
        false
    }
    fn disassemble(&self, _address: u64) -> Option<String> {
        None
    }
    fn install_driver(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn remove_driver(&mut self) -> Result<(), String> {
        Ok(())
    }
}
