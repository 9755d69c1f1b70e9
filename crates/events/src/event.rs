use hyperdbg_parser::CompiledScript;

use crate::action::Action;
use crate::kind::EventKind;

/// Live/inert state of one registered event. `Cleared` per spec §3 is
/// modeled as removal from the registry rather than a third state value —
/// the spec itself describes clearing as freeing the descriptor and its
/// action payloads, which a removed `Vec` entry already is. See
/// `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Enabled,
    Disabled,
}

/// A binding of a hook point to a condition script and an action list.
/// Globals live here, sized once at registration, so they persist across
/// every firing of this event for as long as it stays registered (spec
/// §3 `VariableTable` invariant: "a `GlobalId` outlives" one evaluation).
#[derive(Debug, Clone)]
pub struct Event {
    pub tag: u32,
    pub kind: EventKind,
    pub condition_script: Option<CompiledScript>,
    pub actions: Vec<Action>,
    pub optional_context: Option<u64>,
    pub state: EventState,
    pub short_circuit_on_error: bool,
    /// Set when this event is backed by a `hyperdbg-breakpoints` descriptor
    /// (software/hidden breakpoint kinds), so clearing it can also remove
    /// the installed trap byte.
    pub breakpoint_id: Option<u32>,
    pub(crate) globals: Vec<u64>,
}

impl Event {
    pub fn is_enabled(&self) -> bool {
        self.state == EventState::Enabled
    }
}
