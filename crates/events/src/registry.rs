use hyperdbg_breakpoints::{BreakpointFilter, BreakpointHost, BreakpointTable};
use hyperdbg_parser::VariableBounds;
use hyperdbg_vm::{MemoryHost, OutputSink, PseudoRegisterHost, Vm, VmError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::action::{Action, CustomCodeRunner};
use crate::error::EventError;
use crate::event::{Event, EventState};
use crate::kind::EventKind;
use crate::tag::TagSelector;

/// Internal id seed (spec §6.4). Events and breakpoints are allocated from
/// separate counters sharing the same starting value, so a breakpoint id
/// and an event tag can each independently be "1" without colliding
/// internally — they are never compared against each other.
pub const EVENT_ID_SEED: u32 = 0x0100_0000;

/// What the debuggee passes to [`EventRegistry::dispatch`] when a hook
/// fires, per spec §4.5 "Dispatch".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TriggeredEventDetails {
    pub tag: u32,
    pub context: u64,
    pub stage: u32,
}

/// Action requested of the modify operation; `query` is handled by the
/// separate [`EventRegistry::query_state`] call rather than folded in here,
/// since it does not mutate anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyAction {
    Enable,
    Disable,
    Clear,
}

/// Side effects of one `dispatch` call, aggregated across every action in
/// the fired event's list.
#[derive(Debug, Default, Clone)]
pub struct DispatchOutcome {
    pub condition_matched: bool,
    pub break_to_debugger: bool,
    pub enable_events: Vec<u64>,
    pub disable_events: Vec<u64>,
    pub paused: bool,
    pub flushed: bool,
    pub errors: Vec<VmError>,
}

impl DispatchOutcome {
    fn merge_vm_outcome(&mut self, outcome: hyperdbg_vm::VmOutcome) {
        self.enable_events.extend(outcome.enable_events);
        self.disable_events.extend(outcome.disable_events);
        self.paused |= outcome.paused;
        self.flushed |= outcome.flushed;
    }
}

/// Holds every registered event and dispatches firings into the VM. One
/// instance lives on the debuggee side; the controller keeps its own view
/// built purely from wire responses rather than sharing this type.
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: Vec<Event>,
    next_internal_tag: u32,
    breakpoints: BreakpointTable,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_internal_tag: EVENT_ID_SEED,
            breakpoints: BreakpointTable::new(),
        }
    }

    /// The underlying breakpoint table, for callers (e.g. `bl`) that need
    /// to inspect installed descriptors directly rather than through an
    /// event tag.
    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn get(&self, tag: u32) -> Option<&Event> {
        self.events.iter().find(|e| e.tag == tag)
    }

    fn get_mut(&mut self, tag: u32) -> Result<&mut Event, EventError> {
        self.events
            .iter_mut()
            .find(|e| e.tag == tag)
            .ok_or(EventError::TagNotFound(tag))
    }

    /// Allocates the next tag, appends the event, and returns the
    /// user-visible id (`tag - seed`, rebased to start at 1).
    pub fn register(
        &mut self,
        kind: EventKind,
        condition_script: Option<hyperdbg_parser::CompiledScript>,
        variable_bounds: VariableBounds,
        optional_context: Option<u64>,
        short_circuit_on_error: bool,
    ) -> u32 {
        let internal = self.next_internal_tag;
        self.next_internal_tag += 1;
        let tag = internal - EVENT_ID_SEED + 1;

        debug!(tag, ?kind, "event registered");

        self.events.push(Event {
            tag,
            kind,
            condition_script,
            actions: Vec::new(),
            optional_context,
            state: EventState::Enabled,
            short_circuit_on_error,
            breakpoint_id: None,
            globals: vec![0u64; variable_bounds.global_slots as usize],
        });
        tag
    }

    /// Installs a trap byte via `hyperdbg-breakpoints` and registers a
    /// [`EventKind::SoftwareBreakpoint`] event bound to it in one step —
    /// the `bp` command's underlying operation.
    #[allow(clippy::too_many_arguments)]
    pub fn register_software_breakpoint(
        &mut self,
        host: &mut dyn BreakpointHost,
        virtual_address: u64,
        filter: BreakpointFilter,
        condition_script: Option<hyperdbg_parser::CompiledScript>,
        variable_bounds: VariableBounds,
        short_circuit_on_error: bool,
    ) -> Result<u32, EventError> {
        let breakpoint_id = self.breakpoints.install(host, virtual_address, filter)?;
        let tag = self.register(
            EventKind::SoftwareBreakpoint,
            condition_script,
            variable_bounds,
            None,
            short_circuit_on_error,
        );
        self.get_mut(tag).expect("just registered").breakpoint_id = Some(breakpoint_id);
        Ok(tag)
    }

    pub fn add_action(&mut self, tag: u32, action: Action) -> Result<(), EventError> {
        self.get_mut(tag)?.actions.push(action);
        Ok(())
    }

    /// Applies `action` to one tag or to every event.
    ///
    /// `Clear` frees the descriptor (and, on `All`, resets the tag counter
    /// back to the seed so the next registration is user-visible tag 1
    /// again — the "tag-reset on clear all" behavior recorded in
    /// `DESIGN.md`). If a cleared event is backed by a breakpoint, `host`
    /// is used to restore its trap byte before the descriptor is dropped;
    /// non-breakpoint events ignore it.
    pub fn modify(
        &mut self,
        host: &mut dyn BreakpointHost,
        selector: TagSelector,
        action: ModifyAction,
    ) -> Result<(), EventError> {
        match (selector, action) {
            (TagSelector::One(tag), ModifyAction::Enable) => self.get_mut(tag)?.state = EventState::Enabled,
            (TagSelector::One(tag), ModifyAction::Disable) => self.get_mut(tag)?.state = EventState::Disabled,
            (TagSelector::One(tag), ModifyAction::Clear) => {
                let idx = self.events.iter().position(|e| e.tag == tag).ok_or(EventError::TagNotFound(tag))?;
                if let Some(bp_id) = self.events[idx].breakpoint_id {
                    self.breakpoints.remove(host, bp_id)?;
                }
                self.events.remove(idx);
            }
            (TagSelector::All, ModifyAction::Enable) => {
                for e in &mut self.events {
                    e.state = EventState::Enabled;
                }
            }
            (TagSelector::All, ModifyAction::Disable) => {
                for e in &mut self.events {
                    e.state = EventState::Disabled;
                }
            }
            (TagSelector::All, ModifyAction::Clear) => {
                self.breakpoints.clear_all(host);
                self.events.clear();
                self.next_internal_tag = EVENT_ID_SEED;
                trace!("all events cleared, tag counter reset");
            }
        }
        Ok(())
    }

    pub fn query_state(&self, tag: u32) -> Option<bool> {
        self.get(tag).map(Event::is_enabled)
    }

    /// Runs the condition script (if any) and, if it matches, every action
    /// in order. `registers` is a snapshot copy passed to each script's VM
    /// invocation; a `run_script` action writes back into this event's own
    /// persistent global slots, not into the guest.
    ///
    /// A short-circuiting event (`short_circuit_on_error`) stops after the
    /// first action whose script errors; others report the error and
    /// continue to the next action, per spec §7's propagation policy.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &mut self,
        details: TriggeredEventDetails,
        registers: hyperdbg_vm::GuestRegisters,
        host: &mut dyn MemoryHost,
        pseudo: &dyn PseudoRegisterHost,
        sink: &mut dyn OutputSink,
        custom_code: &mut dyn CustomCodeRunner,
    ) -> Result<DispatchOutcome, EventError> {
        let event = self.get_mut(details.tag)?;
        let mut outcome = DispatchOutcome::default();

        if !event.is_enabled() {
            return Ok(outcome);
        }

        if let Some(condition) = &event.condition_script {
            let mut vm = Vm::new(condition, registers, &mut event.globals);
            match vm.eval(host, pseudo, sink) {
                Ok(cond_outcome) => {
                    outcome.condition_matched = cond_outcome.condition_result();
                    if !outcome.condition_matched {
                        return Ok(outcome);
                    }
                }
                Err(err) => {
                    outcome.errors.push(err);
                    return Ok(outcome);
                }
            }
        } else {
            outcome.condition_matched = true;
        }

        for action in &event.actions {
            match action {
                Action::BreakToDebugger => outcome.break_to_debugger = true,
                Action::RunCustomCode { code } => {
                    custom_code.run(code);
                }
                Action::RunScript { compiled_script } => {
                    let mut vm = Vm::new(compiled_script, registers, &mut event.globals);
                    match vm.eval(host, pseudo, sink) {
                        Ok(vm_outcome) => outcome.merge_vm_outcome(vm_outcome),
                        Err(err) => {
                            outcome.errors.push(err);
                            if event.short_circuit_on_error {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }
}
