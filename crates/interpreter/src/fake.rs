use std::collections::HashMap;

use hyperdbg_breakpoints::BreakpointHost;
use hyperdbg_vm::{MemoryHost, PseudoRegisterHost};

use crate::hypervisor::HypervisorControl;

/// A single in-memory stand-in satisfying every collaborator trait
/// [`crate::session::Session`] needs from a live debuggee: breakpoint byte
/// access, general memory access, pseudo-register reads, and execution
/// control. Used by this crate's own tests and by `hyperdbg-testing`'s
/// end-to-end scenarios — there is no real hypervisor to stand in for, per
/// spec §1, so this is the sole backing a fully in-process test gets.
#[derive(Debug, Default, Clone)]
pub struct FakeDebuggeeHost {
    memory: HashMap<u64, u8>,
    pseudo: HashMap<u32, u64>,
    pub instruction_length: u8,
    pub halted: bool,
}

impl FakeDebuggeeHost {
    pub fn new() -> Self {
        Self {
            memory: HashMap::new(),
            pseudo: HashMap::new(),
            instruction_length: 1,
            halted: true,
        }
    }

    pub fn seed_byte(&mut self, address: u64, value: u8) {
        self.memory.insert(address, value);
    }

    pub fn seed_pseudo(&mut self, id: u32, value: u64) {
        self.pseudo.insert(id, value);
    }
}

impl BreakpointHost for FakeDebuggeeHost {
    fn translate(&self, virtual_address: u64) -> Option<u64> {
        Some(virtual_address)
    }
    fn read_byte(&self, physical_address: u64) -> Option<u8> {
        self.memory.get(&physical_address).copied()
    }
    fn write_byte(&mut self, physical_address: u64, value: u8) -> bool {
        self.memory.insert(physical_address, value);
        true
    }
    fn instruction_length_hint(&self, _physical_address: u64) -> u8 {
        self.instruction_length
    }
}

impl MemoryHost for FakeDebuggeeHost {
    fn probe_read(&self, address: u64, len: usize) -> bool {
        (0..len as u64).all(|i| self.memory.contains_key(&(address + i)))
    }
    fn probe_write(&self, _address: u64, _len: usize) -> bool {
        true
    }
    fn read_u8(&self, address: u64) -> Option<u8> {
        self.memory.get(&address).copied()
    }
    fn read_u32(&self, address: u64) -> Option<u32> {
        if !self.probe_read(address, 4) {
            return None;
        }
        let mut buf = [0u8; 4];
        for i in 0..4 {
            buf[i] = self.memory[&(address + i as u64)];
        }
        Some(u32::from_le_bytes(buf))
    }
    fn read_u64(&self, address: u64) -> Option<u64> {
        if !self.probe_read(address, 8) {
            return None;
        }
        let mut buf = [0u8; 8];
        for i in 0..8 {
            buf[i] = self.memory[&(address + i as u64)];
        }
        Some(u64::from_le_bytes(buf))
    }
    fn write_u8(&mut self, address: u64, value: u8) -> bool {
        self.memory.insert(address, value);
        true
    }
    fn write_u32(&mut self, address: u64, value: u32) -> bool {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.memory.insert(address + i as u64, *b);
        }
        true
    }
    fn write_u64(&mut self, address: u64, value: u64) -> bool {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.memory.insert(address + i as u64, *b);
        }
        true
    }
}

impl PseudoRegisterHost for FakeDebuggeeHost {
    fn read_pseudo(&self, id: u32) -> Option<u64> {
        self.pseudo.get(&id).copied()
    }
}

impl HypervisorControl for FakeDebuggeeHost {
    fn resume(&mut self) -> bool {
        let was_halted = self.halted;
        self.halted = false;
        was_halted
    }
    fn step_over(&mut self) -> bool {
        self.halted
    }
    fn step_into(&mut self) -> bool {
        self.halted
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
