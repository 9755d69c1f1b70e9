//! Breakpoint descriptor table and trap-byte install/remove/firing engine.
//!
//! Owns the single-byte trap (`int3`) lifecycle: install validates
//! accessibility and records the displaced byte, removal restores it, and
//! firing resolves a trap back to a descriptor and applies the
//! process/thread/core filter before signaling the caller. The crate never
//! touches the guest beyond the one byte it owns; everything that needs
//! hypervisor or address-space knowledge goes through [`BreakpointHost`].

mod descriptor;
mod error;
mod host;
mod table;

pub use descriptor::{BreakpointDescriptor, BreakpointFilter, TRAP_OPCODE};
pub use error::BreakpointError;
pub use host::{BreakpointHost, FakeBreakpointHost};
pub use table::{BreakpointTable, TrapDisposition, BREAKPOINT_ID_SEED};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_writes_trap_byte_and_records_previous() {
        let mut host = FakeBreakpointHost::new();
        host.seed_byte(0xfffff800_0000_1000, 0x55);
        let mut table = BreakpointTable::new();

        let id = table
            .install(&mut host, 0xfffff800_0000_1000, BreakpointFilter::any())
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(host.read_byte(0xfffff800_0000_1000), Some(TRAP_OPCODE));
        assert_eq!(table.get(1).unwrap().previous_byte, 0x55);
    }

    #[test]
    fn second_install_at_same_address_fails_until_cleared() {
        let mut host = FakeBreakpointHost::new();
        host.seed_byte(0x1000, 0x90);
        let mut table = BreakpointTable::new();

        table.install(&mut host, 0x1000, BreakpointFilter::any()).unwrap();
        let err = table.install(&mut host, 0x1000, BreakpointFilter::any()).unwrap_err();
        assert_eq!(err, BreakpointError::BreakpointExists { virtual_address: 0x1000 });

        table.remove(&mut host, 1).unwrap();
        assert_eq!(host.read_byte(0x1000), Some(0x90));

        let id = table.install(&mut host, 0x1000, BreakpointFilter::any()).unwrap();
        assert_eq!(id, 2, "ids are not reused across install/remove cycles");
    }

    #[test]
    fn remove_unknown_id_is_reported() {
        let mut host = FakeBreakpointHost::new();
        let mut table = BreakpointTable::new();
        let err = table.remove(&mut host, 42).unwrap_err();
        assert_eq!(err, BreakpointError::BreakpointIdNotFound { id: 42 });
    }

    #[test]
    fn clear_all_restores_every_byte() {
        let mut host = FakeBreakpointHost::new();
        host.seed_byte(0x1000, 0x11);
        host.seed_byte(0x2000, 0x22);
        let mut table = BreakpointTable::new();
        table.install(&mut host, 0x1000, BreakpointFilter::any()).unwrap();
        table.install(&mut host, 0x2000, BreakpointFilter::any()).unwrap();

        table.clear_all(&mut host);

        assert_eq!(host.read_byte(0x1000), Some(0x11));
        assert_eq!(host.read_byte(0x2000), Some(0x22));
        assert!(table.is_empty());
    }

    #[test]
    fn accepted_trap_restores_byte_masks_if_and_needs_rearm() {
        let mut host = FakeBreakpointHost::new();
        host.seed_byte(0x4000, 0x90);
        let mut table = BreakpointTable::new();
        table.install(&mut host, 0x4000, BreakpointFilter::any()).unwrap();

        let mut rflags = 0x200u64; // IF set
        let disposition = table.handle_trap(&mut host, 0x4000, 0, 10, 20, &mut rflags);
        assert_eq!(disposition, TrapDisposition::Accepted { id: 1 });
        assert_eq!(host.read_byte(0x4000), Some(0x90), "byte restored while halted");
        assert_eq!(rflags & 0x200, 0, "IF cleared until re-arm");

        table.rearm_on_monitor_trap(&mut host, 0, &mut rflags);
        assert_eq!(host.read_byte(0x4000), Some(TRAP_OPCODE));
        assert_eq!(rflags & 0x200, 0x200, "IF restored after re-arm");
    }

    #[test]
    fn rejected_trap_resumes_silently_and_rearms_immediately() {
        let mut host = FakeBreakpointHost::new();
        host.seed_byte(0x4000, 0x90);
        let mut table = BreakpointTable::new();
        table
            .install(&mut host, 0x4000, BreakpointFilter { process: Some(99), thread: None, core: None })
            .unwrap();

        let mut rflags = 0u64;
        let disposition = table.handle_trap(&mut host, 0x4000, 0, 1, 1, &mut rflags);
        assert_eq!(disposition, TrapDisposition::Rejected);
        assert_eq!(host.read_byte(0x4000), Some(TRAP_OPCODE), "rewritten without waiting for debugger");

        // further single-step handling is the caller's job; re-arm is idempotent here
        table.rearm_immediately(&mut host, 0x4000);
        assert_eq!(host.read_byte(0x4000), Some(TRAP_OPCODE));
    }

    #[test]
    fn trap_at_unknown_address_is_delivered_unchanged() {
        let mut host = FakeBreakpointHost::new();
        let mut table = BreakpointTable::new();
        let mut rflags = 0u64;
        let disposition = table.handle_trap(&mut host, 0xdead_beef, 0, 1, 1, &mut rflags);
        assert_eq!(disposition, TrapDisposition::NotFound);
    }
}
