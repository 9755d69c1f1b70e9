use tracing::{debug, trace, warn};

use crate::descriptor::{BreakpointDescriptor, BreakpointFilter, TRAP_OPCODE};
use crate::error::BreakpointError;
use crate::host::BreakpointHost;

/// Internal id seed (spec §6.4): user-visible breakpoint ids start at 1;
/// internally every live id across the process carries this offset so it
/// never collides with an event tag, which is allocated from the same seed
/// by `hyperdbg-events`.
pub const BREAKPOINT_ID_SEED: u32 = 0x0100_0000;

const RFLAGS_IF: u64 = 1 << 9;

/// Per-core bookkeeping the breakpoint engine needs between the initial trap
/// and its re-arm on the next monitor-trap-flag exit. No other core reads
/// another core's entry (spec §5).
#[derive(Debug, Clone, Copy, Default)]
struct CoreState {
    pending_rearm_physical_address: Option<u64>,
    saved_interrupt_flag: Option<bool>,
}

/// Outcome of observing a trap at a given physical address, per spec §4.6
/// "Firing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapDisposition {
    /// No descriptor owns this physical address; deliver the exception to
    /// the guest unchanged.
    NotFound,
    /// A descriptor exists but its filter rejected this occurrence. The byte
    /// has already been restored by this call; the caller must single-step
    /// the original instruction with interrupts masked, then call
    /// [`BreakpointTable::rearm_immediately`].
    Rejected,
    /// The filter accepted. The byte has been restored and IF has been
    /// cleared in `*guest_rflags`; the caller should halt and notify the
    /// debugger, then call [`BreakpointTable::rearm_on_monitor_trap`] on the
    /// next single-step exit for this core.
    Accepted { id: u32 },
}

/// Owns every live [`BreakpointDescriptor`] and the per-core re-arm state.
/// There is exactly one of these in a debuggee process; the controller side
/// keeps its own copy built from `bl` responses rather than sharing this
/// type across the transport.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    descriptors: Vec<BreakpointDescriptor>,
    next_internal_id: u32,
    core_state: Vec<CoreState>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            next_internal_id: BREAKPOINT_ID_SEED,
            core_state: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BreakpointDescriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, id: u32) -> Option<&BreakpointDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    fn find_by_physical_address(&self, physical_address: u64) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| d.enabled && d.physical_address == physical_address)
    }

    /// Installs a trap at `virtual_address` under `filter`. Validates
    /// accessibility, records `previous_byte`, then writes [`TRAP_OPCODE`]
    /// at the translated physical address. Any step failing after the
    /// translation reverts without mutating the table or guest memory.
    pub fn install(
        &mut self,
        host: &mut dyn BreakpointHost,
        virtual_address: u64,
        filter: BreakpointFilter,
    ) -> Result<u32, BreakpointError> {
        if self
            .descriptors
            .iter()
            .any(|d| d.enabled && d.virtual_address == virtual_address)
        {
            return Err(BreakpointError::BreakpointExists { virtual_address });
        }

        let physical_address = host
            .translate(virtual_address)
            .ok_or(BreakpointError::InvalidAddress { address: virtual_address })?;
        let previous_byte = host
            .read_byte(physical_address)
            .ok_or(BreakpointError::InvalidAddress { address: virtual_address })?;
        let instruction_length = host.instruction_length_hint(physical_address);

        if !host.write_byte(physical_address, TRAP_OPCODE) {
            return Err(BreakpointError::InvalidAddress { address: virtual_address });
        }

        let internal_id = self.next_internal_id;
        self.next_internal_id += 1;
        let id = internal_id - BREAKPOINT_ID_SEED + 1;

        debug!(id, virtual_address = format!("{:#x}", virtual_address), "breakpoint installed");

        self.descriptors.push(BreakpointDescriptor {
            id,
            virtual_address,
            physical_address,
            previous_byte,
            enabled: true,
            instruction_length,
            filter,
            avoid_reapply: false,
        });
        Ok(id)
    }

    /// Removes one breakpoint by id. Reads the byte back via the physical
    /// address; if it is still the trap opcode, restores `previous_byte`
    /// before dropping the descriptor.
    pub fn remove(&mut self, host: &mut dyn BreakpointHost, id: u32) -> Result<(), BreakpointError> {
        let idx = self
            .descriptors
            .iter()
            .position(|d| d.id == id)
            .ok_or(BreakpointError::BreakpointIdNotFound { id })?;

        let desc = self.descriptors[idx].clone();
        if host.read_byte(desc.physical_address) == Some(TRAP_OPCODE) {
            host.write_byte(desc.physical_address, desc.previous_byte);
        }
        self.descriptors.remove(idx);
        debug!(id, "breakpoint removed");
        Ok(())
    }

    /// Removes every breakpoint. No concurrent install is permitted while
    /// this runs (spec §4.6 "Bulk clear") — enforced by the caller holding
    /// `&mut self` for the duration.
    pub fn clear_all(&mut self, host: &mut dyn BreakpointHost) {
        for desc in self.descriptors.drain(..) {
            if host.read_byte(desc.physical_address) == Some(TRAP_OPCODE) {
                host.write_byte(desc.physical_address, desc.previous_byte);
            }
        }
        trace!("all breakpoints cleared");
    }

    fn core_state_mut(&mut self, core: u32) -> &mut CoreState {
        let idx = core as usize;
        if idx >= self.core_state.len() {
            self.core_state.resize(idx + 1, CoreState::default());
        }
        &mut self.core_state[idx]
    }

    /// Handles an observed trap at `physical_address` on `core`. Always
    /// restores `previous_byte` first. See [`TrapDisposition`] for what the
    /// caller must do next in each case.
    pub fn handle_trap(
        &mut self,
        host: &mut dyn BreakpointHost,
        physical_address: u64,
        core: u32,
        process: u64,
        thread: u64,
        guest_rflags: &mut u64,
    ) -> TrapDisposition {
        let Some(idx) = self.find_by_physical_address(physical_address) else {
            return TrapDisposition::NotFound;
        };
        let desc = self.descriptors[idx].clone();
        host.write_byte(desc.physical_address, desc.previous_byte);

        if !desc.filter.accepts(process, thread, core) {
            host.write_byte(desc.physical_address, TRAP_OPCODE);
            trace!(id = desc.id, core, "breakpoint filter rejected occurrence");
            return TrapDisposition::Rejected;
        }

        let was_set = *guest_rflags & RFLAGS_IF != 0;
        *guest_rflags &= !RFLAGS_IF;
        let state = self.core_state_mut(core);
        state.saved_interrupt_flag = Some(was_set);
        state.pending_rearm_physical_address = Some(physical_address);

        TrapDisposition::Accepted { id: desc.id }
    }

    /// Immediately rewrites the trap byte after a [`TrapDisposition::Rejected`]
    /// single step, with no per-core pending state involved.
    pub fn rearm_immediately(&mut self, host: &mut dyn BreakpointHost, physical_address: u64) {
        if host.read_byte(physical_address).is_some() {
            host.write_byte(physical_address, TRAP_OPCODE);
        } else {
            warn!(physical_address = format!("{:#x}", physical_address), "rearm on unreadable address");
        }
    }

    /// Re-arms the breakpoint pending on `core` and restores the guest's
    /// saved interrupt flag, on the next monitor-trap-flag vm-exit after a
    /// [`TrapDisposition::Accepted`] occurrence.
    pub fn rearm_on_monitor_trap(&mut self, host: &mut dyn BreakpointHost, core: u32, guest_rflags: &mut u64) {
        let state = self.core_state_mut(core);
        let pending = state.pending_rearm_physical_address.take();
        let saved_if = state.saved_interrupt_flag.take();

        if let Some(addr) = pending {
            host.write_byte(addr, TRAP_OPCODE);
        }
        if saved_if == Some(true) {
            *guest_rflags |= RFLAGS_IF;
        }
    }
}
