use hyperdbg_parser::{CompiledScript, OpCode, OperandKind, Symbol, SymbolKind};
use tracing::{trace, warn};

use crate::error::VmError;
use crate::host::{MemoryHost, PseudoRegisterHost};
use crate::output::OutputSink;
use crate::printf::format_printf;
use crate::registers::GuestRegisters;

/// Opcode families whose execution counts as the script having "fired" an
/// observable action, per spec §8 scenario 3 ("the VM prints exactly `hit\n`
/// and reports action fired"). Control-flow and pure arithmetic opcodes do
/// not set this — only opcodes with a side effect outside the VM's own
/// variable tables do.
fn is_action_opcode(op: OpCode) -> bool {
    use OpCode::*;
    matches!(
        op,
        Printf
            | Print
            | WriteByte
            | WriteDword
            | WriteQword
            | EnableEvent
            | DisableEvent
            | Pause
            | Flush
            | EventSetCr3
            | EventInject
            | SpinlockLock
            | SpinlockUnlock
            | SpinlockLockCustomWait
            | InterlockedExchange
            | InterlockedExchangeAdd
            | InterlockedIncrement
            | InterlockedDecrement
            | InterlockedCompareExchange
    )
}

/// Side effects and the fire/skip signal produced by one `Vm::eval` call.
/// Enable/disable requests are collected rather than applied directly: the
/// VM crate has no knowledge of the event registry (dependency order keeps
/// `hyperdbg-vm` below `hyperdbg-events`), so the caller applies them after
/// the call returns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VmOutcome {
    pub actions_fired: bool,
    pub enable_events: Vec<u64>,
    pub disable_events: Vec<u64>,
    pub paused: bool,
    pub flushed: bool,
    pub event_set_cr3: Option<u64>,
    pub event_inject_vector: Option<u64>,
    /// The last value written to any destination operand during this `eval`
    /// call — i.e. the result of the most recently completed expression. A
    /// script used as a breakpoint/event condition is a bare expression
    /// (`@rax == 0x1234;`), so this is its fire/skip verdict: nonzero fires,
    /// zero (or no expression ever evaluated) skips.
    pub last_value: Option<u64>,
}

impl VmOutcome {
    /// Truthiness of [`Self::last_value`], per the fire/skip convention used
    /// when a script is evaluated as a condition.
    pub fn condition_result(&self) -> bool {
        self.last_value.map(|v| v != 0).unwrap_or(false)
    }
}

/// Allocation-free (after setup) evaluator for one [`CompiledScript`]. Holds
/// only the per-invocation local/temp arrays and an explicit evaluation
/// stack; globals live in caller-owned storage so they persist across event
/// firings for the same process, matching spec §3's `VariableTable`
/// lifecycle invariant.
pub struct Vm<'a> {
    script: &'a CompiledScript,
    /// A working copy of the guest register snapshot. The VM never touches
    /// the live guest directly (spec §4.4): it reads from and writes to this
    /// owned copy, and the caller decides, after `eval` returns, whether and
    /// how `registers()` gets written back to the real guest context.
    registers: GuestRegisters,
    globals: &'a mut [u64],
    locals: Vec<u64>,
    temps: Vec<u64>,
    stack: Vec<u64>,
}

impl<'a> Vm<'a> {
    pub fn new(script: &'a CompiledScript, registers: GuestRegisters, globals: &'a mut [u64]) -> Self {
        let locals = vec![0u64; script.variable_bounds.local_slots as usize];
        let temps = vec![0u64; script.variable_bounds.temp_slots as usize];
        Self {
            script,
            registers,
            globals,
            locals,
            temps,
            stack: Vec::new(),
        }
    }

    /// The register snapshot as last observed/modified by this VM
    /// invocation.
    pub fn registers(&self) -> &GuestRegisters {
        &self.registers
    }

    fn get_value(&self, sym: Symbol, _host: &dyn MemoryHost, pseudo: &dyn PseudoRegisterHost) -> Result<u64, VmError> {
        match sym.kind {
            SymbolKind::Operand(OperandKind::Num) => Ok(sym.value),
            SymbolKind::Operand(OperandKind::StringRef) => Ok(sym.value),
            SymbolKind::Operand(OperandKind::Register) => self
                .registers
                .read(sym.value as u32)
                .ok_or(VmError::UnknownRegister(sym.value as u32)),
            SymbolKind::Operand(OperandKind::PseudoRegister) => pseudo
                .read_pseudo(sym.value as u32)
                .ok_or(VmError::UnknownPseudoRegister(sym.value as u32)),
            SymbolKind::Operand(OperandKind::GlobalId) => self
                .globals
                .get(sym.value as usize)
                .copied()
                .ok_or(VmError::InvalidSlot { kind: "global", slot: sym.value as u32 }),
            SymbolKind::Operand(OperandKind::LocalId) => self
                .locals
                .get(sym.value as usize)
                .copied()
                .ok_or(VmError::InvalidSlot { kind: "local", slot: sym.value as u32 }),
            SymbolKind::Operand(OperandKind::Temp) => self
                .temps
                .get(sym.value as usize)
                .copied()
                .ok_or(VmError::InvalidSlot { kind: "temp", slot: sym.value as u32 }),
            SymbolKind::Operand(OperandKind::StackIndex) => {
                let depth = sym.value as usize;
                if depth >= self.stack.len() {
                    return Err(VmError::StackUnderflow);
                }
                Ok(self.stack[self.stack.len() - 1 - depth])
            }
            SymbolKind::Operator(_) => Err(VmError::UnknownOpcode { index: 0 }),
        }
    }

    fn set_value(&mut self, sym: Symbol, value: u64) -> Result<(), VmError> {
        match sym.kind {
            SymbolKind::Operand(kind) if !kind.is_writable() => Err(VmError::NotWritable(kind)),
            SymbolKind::Operand(OperandKind::Register) => self
                .registers
                .write(sym.value as u32, value)
                .ok_or(VmError::UnknownRegister(sym.value as u32)),
            SymbolKind::Operand(OperandKind::PseudoRegister) => {
                // Pseudo-registers are host-owned and read-only from the VM's
                // perspective (`$proc`, `$tid`, ...); writing one is a no-op
                // error surfaced to the caller, not a panic.
                Err(VmError::NotWritable(OperandKind::PseudoRegister))
            }
            SymbolKind::Operand(OperandKind::GlobalId) => {
                let value_slot = sym.value as u32;
                let slot = self
                    .globals
                    .get_mut(sym.value as usize)
                    .ok_or(VmError::InvalidSlot { kind: "global", slot: value_slot })?;
                *slot = value;
                Ok(())
            }
            SymbolKind::Operand(OperandKind::LocalId) => {
                let value_slot = sym.value as u32;
                let slot = self
                    .locals
                    .get_mut(sym.value as usize)
                    .ok_or(VmError::InvalidSlot { kind: "local", slot: value_slot })?;
                *slot = value;
                Ok(())
            }
            SymbolKind::Operand(OperandKind::Temp) => {
                let value_slot = sym.value as u32;
                let slot = self
                    .temps
                    .get_mut(sym.value as usize)
                    .ok_or(VmError::InvalidSlot { kind: "temp", slot: value_slot })?;
                *slot = value;
                Ok(())
            }
            SymbolKind::Operand(OperandKind::StackIndex) => {
                let depth = sym.value as usize;
                let len = self.stack.len();
                if depth >= len {
                    return Err(VmError::StackUnderflow);
                }
                self.stack[len - 1 - depth] = value;
                Ok(())
            }
            SymbolKind::Operand(k) => Err(VmError::NotWritable(k)),
            SymbolKind::Operator(_) => Err(VmError::UnknownOpcode { index: 0 }),
        }
    }

    /// Runs every statement in the symbol stream to completion, applying
    /// side effects through `host`, `pseudo`, and `sink`. Runtime VM errors
    /// are localized per spec §7: this returns on the *first* error rather
    /// than continuing, leaving it to the caller (the event registry) to
    /// decide whether later actions in the same event's action list still
    /// run.
    pub fn eval(
        &mut self,
        host: &mut dyn MemoryHost,
        pseudo: &dyn PseudoRegisterHost,
        sink: &mut dyn OutputSink,
    ) -> Result<VmOutcome, VmError> {
        let stream = &self.script.symbol_stream;
        let mut outcome = VmOutcome::default();
        let mut ip: usize = 0;

        while ip < stream.len() {
            let op = match stream[ip].kind {
                SymbolKind::Operator(op) => op,
                SymbolKind::Operand(_) => return Err(VmError::UnknownOpcode { index: ip }),
            };

            if is_action_opcode(op) {
                outcome.actions_fired = true;
            }

            match op {
                OpCode::Jmp => {
                    let target = self.get_value(stream[ip + 1], host, pseudo)?;
                    ip = self.checked_target(target)?;
                    continue;
                }
                OpCode::JmpIfZero | OpCode::JmpIfNotZero => {
                    let cond = self.get_value(stream[ip + 1], host, pseudo)?;
                    let target = self.get_value(stream[ip + 2], host, pseudo)?;
                    let take = if op == OpCode::JmpIfZero { cond == 0 } else { cond != 0 };
                    if take {
                        ip = self.checked_target(target)?;
                        continue;
                    }
                    ip += 3;
                    continue;
                }
                OpCode::Printf => {
                    let fmt_sym = stream[ip + 1];
                    let argc = self.get_value(stream[ip + 2], host, pseudo)? as usize;
                    let mut args = Vec::with_capacity(argc);
                    for i in 0..argc {
                        args.push(self.get_value(stream[ip + 3 + i], host, pseudo)?);
                    }
                    let fmt = self.resolve_string(fmt_sym)?;
                    let rendered = format_printf(&fmt, &args, host);
                    sink.write_str(&rendered);
                    ip += 3 + argc;
                    continue;
                }
                OpCode::Print => {
                    let arg_sym = stream[ip + 1];
                    let rendered = match arg_sym.kind {
                        SymbolKind::Operand(OperandKind::StringRef) => self.resolve_string(arg_sym)?,
                        _ => format!("{:x}", self.get_value(arg_sym, host, pseudo)?),
                    };
                    sink.write_str(&rendered);
                    sink.write_str("\n");
                    ip += 2;
                    continue;
                }
                _ => {}
            }

            let (get_arity, set_arity) = op.fixed_arity();
            let gets: Vec<Symbol> = (0..get_arity).map(|i| stream[ip + 1 + i]).collect();
            let sets: Vec<Symbol> = (0..set_arity).map(|i| stream[ip + 1 + get_arity + i]).collect();

            self.execute(op, &gets, &sets, host, pseudo, &mut outcome)?;

            ip += 1 + get_arity + set_arity;
        }

        Ok(outcome)
    }

    fn checked_target(&self, target: u64) -> Result<usize, VmError> {
        let len = self.script.symbol_stream.len();
        if (target as usize) > len {
            return Err(VmError::BadJumpTarget {
                target,
                stream_len: len,
            });
        }
        Ok(target as usize)
    }

    fn resolve_string(&self, sym: Symbol) -> Result<String, VmError> {
        match sym.kind {
            SymbolKind::Operand(OperandKind::StringRef) => self
                .script
                .string_pool
                .get(sym.value as usize)
                .cloned()
                .ok_or(VmError::InvalidStringPointer),
            _ => Err(VmError::InvalidStringPointer),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        op: OpCode,
        gets: &[Symbol],
        sets: &[Symbol],
        host: &mut dyn MemoryHost,
        pseudo: &dyn PseudoRegisterHost,
        outcome: &mut VmOutcome,
    ) -> Result<(), VmError> {
        use OpCode::*;

        macro_rules! g {
            ($i:expr) => {
                self.get_value(gets[$i], host, pseudo)?
            };
        }

        macro_rules! s {
            ($sym:expr, $val:expr) => {{
                let v = $val;
                self.set_value($sym, v)?;
                outcome.last_value = Some(v);
            }};
        }

        match op {
            Add => s!(sets[0], g!(0).wrapping_add(g!(1))),
            Sub => s!(sets[0], g!(0).wrapping_sub(g!(1))),
            Mul => s!(sets[0], g!(0).wrapping_mul(g!(1))),
            Div => {
                let divisor = g!(1);
                if divisor == 0 {
                    return Err(VmError::DivisionByZero);
                }
                s!(sets[0], g!(0) / divisor);
            }
            Mod => {
                let divisor = g!(1);
                if divisor == 0 {
                    return Err(VmError::DivisionByZero);
                }
                s!(sets[0], g!(0) % divisor);
            }
            Asr => s!(sets[0], ((g!(0) as i64) >> (g!(1) & 63)) as u64),
            Asl => s!(sets[0], g!(0) << (g!(1) & 63)),
            Or => s!(sets[0], g!(0) | g!(1)),
            Xor => s!(sets[0], g!(0) ^ g!(1)),
            And => s!(sets[0], g!(0) & g!(1)),
            Not => s!(sets[0], !g!(0)),
            Neg => s!(sets[0], (g!(0) as i64).wrapping_neg() as u64),
            Inc => s!(sets[0], g!(0).wrapping_add(1)),
            Dec => s!(sets[0], g!(0).wrapping_sub(1)),

            CmpEq => s!(sets[0], (g!(0) == g!(1)) as u64),
            CmpNeq => s!(sets[0], (g!(0) != g!(1)) as u64),
            CmpGt => s!(sets[0], (g!(0) > g!(1)) as u64),
            CmpLt => s!(sets[0], (g!(0) < g!(1)) as u64),
            CmpGte => s!(sets[0], (g!(0) >= g!(1)) as u64),
            CmpLte => s!(sets[0], (g!(0) <= g!(1)) as u64),

            Mov => s!(sets[0], g!(0)),

            WriteByte => {
                let addr = g!(0);
                let val = g!(1);
                let ok = host.probe_write(addr, 1) && host.write_u8(addr, val as u8);
                if !ok {
                    warn!(address = format!("{:#x}", addr), "eb: invalid target address");
                }
                s!(sets[0], ok as u64);
            }
            WriteDword => {
                let addr = g!(0);
                let val = g!(1);
                let ok = host.probe_write(addr, 4) && host.write_u32(addr, val as u32);
                s!(sets[0], ok as u64);
            }
            WriteQword => {
                let addr = g!(0);
                let val = g!(1);
                let ok = host.probe_write(addr, 8) && host.write_u64(addr, val);
                s!(sets[0], ok as u64);
            }
            Deref => {
                let addr = g!(0);
                let value = host.read_u64(addr).ok_or(VmError::InvalidAddress { address: addr })?;
                s!(sets[0], value);
            }

            EnableEvent => outcome.enable_events.push(g!(0)),
            DisableEvent => outcome.disable_events.push(g!(0)),
            Pause => outcome.paused = true,
            Flush => outcome.flushed = true,
            EventSetCr3 => outcome.event_set_cr3 = Some(g!(0)),
            EventInject => outcome.event_inject_vector = Some(g!(0)),

            SpinlockLock => {
                let addr = g!(0);
                try_acquire_spinlock(host, addr);
            }
            SpinlockUnlock => {
                let addr = g!(0);
                let _ = host.probe_write(addr, 1) && host.write_u8(addr, 0);
            }
            SpinlockLockCustomWait => {
                let addr = g!(0);
                let max_iters = g!(1);
                let mut acquired = false;
                for _ in 0..max_iters.max(1) {
                    if try_acquire_spinlock(host, addr) {
                        acquired = true;
                        break;
                    }
                }
                trace!(acquired, "spinlock_lock_custom_wait");
            }
            InterlockedExchange => {
                let addr = g!(0);
                let new_val = g!(1);
                let old = host.read_u64(addr).ok_or(VmError::InvalidAddress { address: addr })?;
                host.write_u64(addr, new_val);
                s!(sets[0], old);
            }
            InterlockedExchangeAdd => {
                let addr = g!(0);
                let delta = g!(1);
                let old = host.read_u64(addr).ok_or(VmError::InvalidAddress { address: addr })?;
                host.write_u64(addr, old.wrapping_add(delta));
                s!(sets[0], old);
            }
            InterlockedIncrement => {
                let addr = g!(0);
                let old = host.read_u64(addr).ok_or(VmError::InvalidAddress { address: addr })?;
                let new_val = old.wrapping_add(1);
                host.write_u64(addr, new_val);
                s!(sets[0], new_val);
            }
            InterlockedDecrement => {
                let addr = g!(0);
                let old = host.read_u64(addr).ok_or(VmError::InvalidAddress { address: addr })?;
                let new_val = old.wrapping_sub(1);
                host.write_u64(addr, new_val);
                s!(sets[0], new_val);
            }
            InterlockedCompareExchange => {
                let addr = g!(0);
                let exchange = g!(1);
                let comparand = g!(2);
                let old = host.read_u64(addr).ok_or(VmError::InvalidAddress { address: addr })?;
                if old == comparand {
                    host.write_u64(addr, exchange);
                }
                s!(sets[0], old);
            }

            StrLen => {
                let addr = g!(0);
                let s = host.read_cstring(addr, 4096).ok_or(VmError::InvalidAddress { address: addr })?;
                s!(sets[0], s.len() as u64);
            }
            WcsLen => {
                let addr = g!(0);
                let s = host
                    .read_wide_cstring(addr, 4096)
                    .ok_or(VmError::InvalidAddress { address: addr })?;
                s!(sets[0], s.encode_utf16().count() as u64);
            }
            Hi => s!(sets[0], g!(0) >> 32),
            Low => s!(sets[0], g!(0) & 0xFFFF_FFFF),

            Jmp | JmpIfZero | JmpIfNotZero | Printf | Print => unreachable!("handled before dispatch"),
        }
        Ok(())
    }
}

/// Single-attempt (non-blocking) acquire: reads the lock byte, and if it
/// reads zero, writes 1 and reports success. The VM never sleeps or
/// busy-waits on its own account (spec §5); `spinlock_lock_custom_wait`
/// layers a bounded retry count of these single attempts on top.
fn try_acquire_spinlock(host: &mut dyn MemoryHost, addr: u64) -> bool {
    match host.read_u8(addr) {
        Some(0) => host.write_u8(addr, 1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeMemoryHost;
    use crate::output::CapturingSink;
    use hyperdbg_parser::{compile_default, VariableBounds};

    struct StubPseudo;
    impl PseudoRegisterHost for StubPseudo {
        fn read_pseudo(&self, _id: u32) -> Option<u64> {
            None
        }
    }

    fn run(source: &str, globals: &mut [u64]) -> (VmOutcome, String) {
        let script = compile_default(source).unwrap();
        let regs = GuestRegisters::new();
        let mut host = FakeMemoryHost::new();
        let mut sink = CapturingSink::default();
        let mut vm = Vm::new(&script, regs, globals);
        let outcome = vm.eval(&mut host, &StubPseudo, &mut sink).unwrap();
        (outcome, sink.buffer)
    }

    #[test]
    fn arithmetic_expression_updates_global() {
        let mut globals = vec![0u64; VariableBounds::default().global_slots as usize];
        run(".result = 0n10 + 0n5;", &mut globals);
        assert_eq!(globals[0], 15);
    }

    #[test]
    fn printf_renders_decimal_and_hex() {
        let mut globals = vec![0u64; 8];
        let (_outcome, output) = run(r#"printf("%d-%x", 0n10, 0n16);"#, &mut globals);
        assert_eq!(output, "10-10");
    }

    #[test]
    fn division_by_zero_is_localized_error() {
        let script = compile_default("0n1 / 0n0;").unwrap();
        let regs = GuestRegisters::new();
        let mut globals = vec![0u64; 8];
        let mut host = FakeMemoryHost::new();
        let mut sink = CapturingSink::default();
        let mut vm = Vm::new(&script, regs, &mut globals);
        let err = vm.eval(&mut host, &StubPseudo, &mut sink).unwrap_err();
        assert_eq!(err, VmError::DivisionByZero);
    }

    #[test]
    fn conditional_action_shorthand_fires_on_match() {
        let mut globals = vec![0u64; 8];
        let (outcome, output) = run(r#"0n1 == 0n1 ? { printf("hit"); }"#, &mut globals);
        assert!(outcome.actions_fired);
        assert_eq!(output, "hit");
    }

    #[test]
    fn conditional_action_shorthand_skips_on_mismatch() {
        let mut globals = vec![0u64; 8];
        let (outcome, output) = run(r#"0n1 == 0n2 ? { printf("hit"); }"#, &mut globals);
        assert!(!outcome.actions_fired);
        assert_eq!(output, "");
    }

    #[test]
    fn while_loop_runs_to_completion() {
        let mut globals = vec![0u64; 8];
        run(".i = 0n0; while (.i < 0n5) { .i = .i + 0n1; }", &mut globals);
        assert_eq!(globals[0], 5);
    }

    #[test]
    fn enable_event_opcode_is_recorded_not_applied() {
        let mut globals = vec![0u64; 8];
        let (outcome, _) = run("enableevent(0n7);", &mut globals);
        assert_eq!(outcome.enable_events, vec![7]);
    }

    #[test]
    fn bad_jump_target_is_rejected() {
        use hyperdbg_parser::{CompiledScript, Symbol, VariableBounds};
        let script = CompiledScript {
            symbol_stream: vec![Symbol::operator(OpCode::Jmp), Symbol::operand(OperandKind::Num, 99)],
            entry_offset: 0,
            variable_bounds: VariableBounds::default(),
            string_pool: vec![],
        };
        let regs = GuestRegisters::new();
        let mut globals = vec![0u64; 8];
        let mut host = FakeMemoryHost::new();
        let mut sink = CapturingSink::default();
        let mut vm = Vm::new(&script, regs, &mut globals);
        let err = vm.eval(&mut host, &StubPseudo, &mut sink).unwrap_err();
        assert!(matches!(err, VmError::BadJumpTarget { .. }));
    }

    #[test]
    fn memory_write_then_deref_round_trips() {
        let mut globals = vec![0u64; 8];
        run("eq(0n4096, 0n1234); .v = poi(0n4096);", &mut globals);
        assert_eq!(globals[0], 1234);
    }
}
