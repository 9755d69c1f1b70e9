//! Event registry: binds a compiled condition/action script pair to a
//! hardware or software hook point, and dispatches a firing into the VM.
//!
//! Holds no hypervisor state of its own beyond the breakpoint descriptors
//! it owns through `hyperdbg-breakpoints` for the software/hidden
//! breakpoint kinds; every other hook point (CPUID, MSR, EPT, exception,
//! syscall, I/O port) is armed by the debuggee's hypervisor layer and is
//! out of scope here — this crate only tracks the tag and runs the scripts.

mod action;
mod error;
mod event;
mod kind;
mod registry;
mod tag;

pub use action::{Action, CustomCodeRunner, NullCustomCodeRunner};
pub use error::EventError;
pub use event::{Event, EventState};
pub use kind::EventKind;
pub use registry::{DispatchOutcome, EventRegistry, ModifyAction, TriggeredEventDetails, EVENT_ID_SEED};
pub use tag::TagSelector;

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdbg_breakpoints::{BreakpointFilter, FakeBreakpointHost};
    use hyperdbg_parser::{compile_default, VariableBounds};
    use hyperdbg_vm::{CapturingSink, FakeMemoryHost, GuestRegisters, NullMemoryHost, PseudoRegisterHost};

    struct StubPseudo;
    impl PseudoRegisterHost for StubPseudo {
        fn read_pseudo(&self, _id: u32) -> Option<u64> {
            None
        }
    }

    #[test]
    fn register_assigns_sequential_user_visible_tags() {
        let mut registry = EventRegistry::new();
        let t1 = registry.register(EventKind::Cpuid, None, VariableBounds::default(), None, false);
        let t2 = registry.register(EventKind::MsrRead, None, VariableBounds::default(), None, false);
        assert_eq!(t1, 1);
        assert_eq!(t2, 2);
    }

    #[test]
    fn clear_all_resets_tag_counter() {
        let mut registry = EventRegistry::new();
        let mut host = FakeBreakpointHost::new();
        registry.register(EventKind::Cpuid, None, VariableBounds::default(), None, false);
        registry.modify(&mut host, TagSelector::All, ModifyAction::Clear).unwrap();
        let t = registry.register(EventKind::Cpuid, None, VariableBounds::default(), None, false);
        assert_eq!(t, 1);
    }

    #[test]
    fn disabled_event_does_not_dispatch() {
        let mut registry = EventRegistry::new();
        let mut host = FakeBreakpointHost::new();
        let script = compile_default(r#"printf("hit");"#).unwrap();
        let tag = registry.register(EventKind::Cpuid, None, VariableBounds::default(), None, false);
        registry
            .add_action(tag, Action::RunScript { compiled_script: script })
            .unwrap();
        registry.modify(&mut host, TagSelector::One(tag), ModifyAction::Disable).unwrap();

        let mut mem = NullMemoryHost;
        let mut sink = CapturingSink::default();
        let mut custom = NullCustomCodeRunner;
        let outcome = registry
            .dispatch(
                TriggeredEventDetails { tag, context: 0, stage: 0 },
                GuestRegisters::new(),
                &mut mem,
                &StubPseudo,
                &mut sink,
                &mut custom,
            )
            .unwrap();
        assert!(sink.buffer.is_empty());
        assert!(!outcome.condition_matched);
    }

    #[test]
    fn condition_script_gates_action_list() {
        let mut registry = EventRegistry::new();
        let condition = compile_default("@rax == 0n1 ? { flush(); }").unwrap();
        let action_script = compile_default(r#"printf("fired");"#).unwrap();
        let tag = registry.register(EventKind::SoftwareBreakpoint, Some(condition), VariableBounds::default(), None, false);
        registry
            .add_action(tag, Action::RunScript { compiled_script: action_script })
            .unwrap();

        let mut mem = FakeMemoryHost::new();
        let mut sink = CapturingSink::default();
        let mut custom = NullCustomCodeRunner;
        let mut regs = GuestRegisters::new();
        regs.write(hyperdbg_parser::regid::name_to_id("rax").unwrap(), 1).unwrap();

        let outcome = registry
            .dispatch(
                TriggeredEventDetails { tag, context: 0, stage: 0 },
                regs,
                &mut mem,
                &StubPseudo,
                &mut sink,
                &mut custom,
            )
            .unwrap();
        assert!(outcome.condition_matched);
        assert_eq!(sink.buffer, "fired");
    }

    #[test]
    fn condition_script_mismatch_skips_actions() {
        let mut registry = EventRegistry::new();
        let condition = compile_default("@rax == 0n1 ? { flush(); }").unwrap();
        let action_script = compile_default(r#"printf("fired");"#).unwrap();
        let tag = registry.register(EventKind::SoftwareBreakpoint, Some(condition), VariableBounds::default(), None, false);
        registry
            .add_action(tag, Action::RunScript { compiled_script: action_script })
            .unwrap();

        let mut mem = FakeMemoryHost::new();
        let mut sink = CapturingSink::default();
        let mut custom = NullCustomCodeRunner;
        let outcome = registry
            .dispatch(
                TriggeredEventDetails { tag, context: 0, stage: 0 },
                GuestRegisters::new(),
                &mut mem,
                &StubPseudo,
                &mut sink,
                &mut custom,
            )
            .unwrap();
        assert!(!outcome.condition_matched);
        assert!(sink.buffer.is_empty());
    }

    #[test]
    fn breakpoint_backed_event_clears_trap_byte_on_clear() {
        let mut registry = EventRegistry::new();
        let mut host = FakeBreakpointHost::new();
        host.seed_byte(0x1000, 0x90);

        let tag = registry
            .register_software_breakpoint(&mut host, 0x1000, BreakpointFilter::any(), None, VariableBounds::default(), false)
            .unwrap();
        assert_eq!(host.read_byte(0x1000), Some(hyperdbg_breakpoints::TRAP_OPCODE));

        registry.modify(&mut host, TagSelector::One(tag), ModifyAction::Clear).unwrap();
        assert_eq!(host.read_byte(0x1000), Some(0x90));
        assert!(registry.get(tag).is_none());
    }

    #[test]
    fn short_circuit_stops_after_first_erroring_action() {
        let mut registry = EventRegistry::new();
        let failing = compile_default("0n1 / 0n0;").unwrap();
        let following = compile_default(r#"printf("should not run");"#).unwrap();
        let tag = registry.register(EventKind::Cpuid, None, VariableBounds::default(), None, true);
        registry.add_action(tag, Action::RunScript { compiled_script: failing }).unwrap();
        registry.add_action(tag, Action::RunScript { compiled_script: following }).unwrap();

        let mut mem = FakeMemoryHost::new();
        let mut sink = CapturingSink::default();
        let mut custom = NullCustomCodeRunner;
        let outcome = registry
            .dispatch(
                TriggeredEventDetails { tag, context: 0, stage: 0 },
                GuestRegisters::new(),
                &mut mem,
                &StubPseudo,
                &mut sink,
                &mut custom,
            )
            .unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert!(sink.buffer.is_empty());
    }
}
