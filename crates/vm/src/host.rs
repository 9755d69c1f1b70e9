/// Host-supplied accessors the VM calls through for anything that isn't a
/// pure register/variable-table operation. Kept as trait objects so the VM
/// itself stays free of the hypervisor/IOCTL plumbing that is out of scope
/// per spec §1 — tests back these with in-memory stubs.
pub trait PseudoRegisterHost {
    /// Reads the named pseudo-register (`$proc`, `$tid`, `$ip`, ...) by the
    /// id assigned in `hyperdbg_parser::regid::PSEUDO_REGISTERS`.
    fn read_pseudo(&self, id: u32) -> Option<u64>;
}

/// A "probe read" helper per spec §9 ("Exceptions for control flow"): every
/// fallible guest-memory access returns a bool/Option instead of relying on
/// `__try/__except`-style exception handling, leaving the caller to decide
/// policy.
pub trait MemoryHost {
    /// True if `len` bytes starting at `address` are mapped and readable in
    /// the current address space.
    fn probe_read(&self, address: u64, len: usize) -> bool;
    /// True if `len` bytes starting at `address` are mapped and writable.
    fn probe_write(&self, address: u64, len: usize) -> bool;

    fn read_u8(&self, address: u64) -> Option<u8>;
    fn read_u32(&self, address: u64) -> Option<u32>;
    fn read_u64(&self, address: u64) -> Option<u64>;

    fn write_u8(&mut self, address: u64, value: u8) -> bool;
    fn write_u32(&mut self, address: u64, value: u32) -> bool;
    fn write_u64(&mut self, address: u64, value: u64) -> bool;

    /// Reads a NUL-terminated byte string for `%s`, bounded by `max_len` to
    /// avoid scanning unmapped memory forever on a corrupt pointer.
    fn read_cstring(&self, address: u64, max_len: usize) -> Option<String> {
        let mut bytes = Vec::new();
        for offset in 0..max_len {
            let b = self.read_u8(address.wrapping_add(offset as u64))?;
            if b == 0 {
                return Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(b);
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a NUL-terminated UTF-16LE string for `%ws`.
    fn read_wide_cstring(&self, address: u64, max_len_chars: usize) -> Option<String> {
        let mut units = Vec::new();
        for i in 0..max_len_chars {
            let addr = address.wrapping_add((i * 2) as u64);
            let lo = self.read_u8(addr)? as u16;
            let hi = self.read_u8(addr.wrapping_add(1))? as u16;
            let unit = lo | (hi << 8);
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Some(String::from_utf16_lossy(&units))
    }
}

/// An all-unmapped memory host, useful for tests that exercise error paths
/// without standing up a fake guest address space.
#[derive(Debug, Default)]
pub struct NullMemoryHost;

impl MemoryHost for NullMemoryHost {
    fn probe_read(&self, _address: u64, _len: usize) -> bool {
        false
    }
    fn probe_write(&self, _address: u64, _len: usize) -> bool {
        false
    }
    fn read_u8(&self, _address: u64) -> Option<u8> {
        None
    }
    fn read_u32(&self, _address: u64) -> Option<u32> {
        None
    }
    fn read_u64(&self, _address: u64) -> Option<u64> {
        None
    }
    fn write_u8(&mut self, _address: u64, _value: u8) -> bool {
        false
    }
    fn write_u32(&mut self, _address: u64, _value: u32) -> bool {
        false
    }
    fn write_u64(&mut self, _address: u64, _value: u64) -> bool {
        false
    }
}

/// A byte-addressable in-memory stand-in for a guest address space, used by
/// unit tests and by `hyperdbg-testing`'s end-to-end scenarios.
#[derive(Debug, Default)]
pub struct FakeMemoryHost {
    pages: std::collections::HashMap<u64, u8>,
}

impl FakeMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_byte(&mut self, address: u64, value: u8) {
        self.pages.insert(address, value);
    }

    pub fn seed_bytes(&mut self, address: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.pages.insert(address + i as u64, *b);
        }
    }
}

impl MemoryHost for FakeMemoryHost {
    fn probe_read(&self, address: u64, len: usize) -> bool {
        (0..len as u64).all(|i| self.pages.contains_key(&(address + i)))
    }
    fn probe_write(&self, _address: u64, _len: usize) -> bool {
        true
    }
    fn read_u8(&self, address: u64) -> Option<u8> {
        self.pages.get(&address).copied()
    }
    fn read_u32(&self, address: u64) -> Option<u32> {
        if !self.probe_read(address, 4) {
            return None;
        }
        let mut buf = [0u8; 4];
        for i in 0..4 {
            buf[i] = self.pages[&(address + i as u64)];
        }
        Some(u32::from_le_bytes(buf))
    }
    fn read_u64(&self, address: u64) -> Option<u64> {
        if !self.probe_read(address, 8) {
            return None;
        }
        let mut buf = [0u8; 8];
        for i in 0..8 {
            buf[i] = self.pages[&(address + i as u64)];
        }
        Some(u64::from_le_bytes(buf))
    }
    fn write_u8(&mut self, address: u64, value: u8) -> bool {
        self.pages.insert(address, value);
        true
    }
    fn write_u32(&mut self, address: u64, value: u32) -> bool {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.pages.insert(address + i as u64, *b);
        }
        true
    }
    fn write_u64(&mut self, address: u64, value: u64) -> bool {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.pages.insert(address + i as u64, *b);
        }
        true
    }
}
