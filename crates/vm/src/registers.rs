use hyperdbg_parser::regid;

/// Read-only view of the guest's architectural state at the moment an event
/// fired: GPRs, instruction pointer, RFLAGS, segment/control/debug registers,
/// and descriptor-table bases. The VM never mutates this directly — writes
/// go through [`GuestRegisters::set_parent`], the mirror of the read path,
/// invoked only by the `mov`/`inc`/`dec`/in-place-arithmetic opcodes whose
/// write target is a `Register` operand.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestRegisters {
    gpr: [u64; 16],
    rip: u64,
    rflags: u64,
    segments: [u64; 6],
    control: [u64; 5],
    debug: [u64; 6],
    descriptor_tables: [u64; 4],
}

impl GuestRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gpr(mut self, id: u32, value: u64) -> Self {
        self.gpr[id as usize] = value;
        self
    }

    pub fn with_rip(mut self, value: u64) -> Self {
        self.rip = value;
        self
    }

    pub fn with_rflags(mut self, value: u64) -> Self {
        self.rflags = value;
        self
    }

    pub fn rip(&self) -> u64 {
        self.rip
    }

    pub fn rflags(&self) -> u64 {
        self.rflags
    }

    /// Reads a register's full 64-bit "parent" value, addressed by the
    /// `parent_id` the symbol's id maps to via `regid::info`.
    fn parent_value(&self, parent_id: u32) -> Option<u64> {
        match parent_id {
            0..=15 => self.gpr.get(parent_id as usize).copied(),
            16 => Some(self.rip),
            17 => Some(self.rflags),
            18..=23 => self.segments.get((parent_id - 18) as usize).copied(),
            24..=28 => self.control.get((parent_id - 24) as usize).copied(),
            29..=34 => self.debug.get((parent_id - 29) as usize).copied(),
            35..=38 => self
                .descriptor_tables
                .get((parent_id - 35) as usize)
                .copied(),
            _ => None,
        }
    }

    fn parent_value_mut(&mut self, parent_id: u32) -> Option<&mut u64> {
        match parent_id {
            0..=15 => self.gpr.get_mut(parent_id as usize),
            16 => Some(&mut self.rip),
            17 => Some(&mut self.rflags),
            18..=23 => self.segments.get_mut((parent_id - 18) as usize),
            24..=28 => self.control.get_mut((parent_id - 24) as usize),
            29..=34 => self.debug.get_mut((parent_id - 29) as usize),
            35..=38 => self.descriptor_tables.get_mut((parent_id - 35) as usize),
            _ => None,
        }
    }

    /// Narrows a register alias's stored parent value to the alias's
    /// declared width/offset (`eax` = low 32 of `rax`, `ah` = bits 8-15, a
    /// single RFLAGS bit for `zf`/`cf`/etc).
    pub fn read(&self, register_id: u32) -> Option<u64> {
        let info = regid::info(register_id)?;
        let parent = self.parent_value(info.parent_id)?;
        Some(narrow(parent, info.width_bits, info.byte_offset))
    }

    /// Mirror of [`GuestRegisters::read`]: writes `value` into the alias's
    /// bit span within its parent register, leaving the rest of the parent
    /// untouched.
    pub fn write(&mut self, register_id: u32, value: u64) -> Option<()> {
        let info = *regid::info(register_id)?;
        let parent = self.parent_value_mut(info.parent_id)?;
        *parent = widen(*parent, value, info.width_bits, info.byte_offset);
        Some(())
    }
}

/// Extracts a `width_bits`-wide field from `parent`. For `width_bits == 1`
/// (an individual RFLAGS bit), `offset` is a *bit* index; otherwise it is a
/// byte offset (`ah` lives at byte offset 1 within `rax`).
fn narrow(parent: u64, width_bits: u8, offset: u8) -> u64 {
    if width_bits == 1 {
        return (parent >> offset) & 1;
    }
    let shifted = parent >> (offset as u32 * 8);
    if width_bits >= 64 {
        shifted
    } else {
        shifted & ((1u64 << width_bits) - 1)
    }
}

fn widen(parent: u64, value: u64, width_bits: u8, offset: u8) -> u64 {
    if width_bits == 1 {
        let bit = 1u64 << offset;
        return if value & 1 != 0 {
            parent | bit
        } else {
            parent & !bit
        };
    }
    let shift = offset as u32 * 8;
    if width_bits >= 64 {
        return value;
    }
    let mask = ((1u64 << width_bits) - 1) << shift;
    (parent & !mask) | ((value << shift) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eax_is_low_32_of_rax() {
        let regs = GuestRegisters::new().with_gpr(0, 0x1122_3344_5566_7788);
        let eax_id = regid::name_to_id("eax").unwrap();
        assert_eq!(regs.read(eax_id).unwrap(), 0x5566_7788);
    }

    #[test]
    fn ah_is_bits_8_to_15() {
        let regs = GuestRegisters::new().with_gpr(0, 0x0000_0000_0000_ABCD);
        let ah_id = regid::name_to_id("ah").unwrap();
        assert_eq!(regs.read(ah_id).unwrap(), 0xAB);
    }

    #[test]
    fn writing_ax_preserves_upper_bits() {
        let mut regs = GuestRegisters::new().with_gpr(0, 0xFFFF_FFFF_FFFF_FFFF);
        let ax_id = regid::name_to_id("ax").unwrap();
        regs.write(ax_id, 0x0000).unwrap();
        assert_eq!(regs.read(regid::name_to_id("rax").unwrap()).unwrap(), 0xFFFF_FFFF_FFFF_0000);
    }

    #[test]
    fn zf_flag_bit_roundtrip() {
        let mut regs = GuestRegisters::new().with_rflags(0);
        let zf = regid::name_to_id("zf").unwrap();
        assert_eq!(regs.read(zf).unwrap(), 0);
        regs.write(zf, 1).unwrap();
        assert_eq!(regs.read(zf).unwrap(), 1);
        assert_eq!(regs.rflags() & (1 << 6), 1 << 6);
    }

    #[test]
    fn control_and_segment_registers_are_independent() {
        let mut regs = GuestRegisters::new();
        regs.write(regid::name_to_id("cr3").unwrap(), 0xdead_beef).unwrap();
        regs.write(regid::name_to_id("cs").unwrap(), 0x33).unwrap();
        assert_eq!(regs.read(regid::name_to_id("cr3").unwrap()).unwrap(), 0xdead_beef);
        assert_eq!(regs.read(regid::name_to_id("cs").unwrap()).unwrap(), 0x33);
    }
}
