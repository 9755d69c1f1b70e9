use tracing::{debug, info};

use hyperdbg_breakpoints::BreakpointFilter;
use hyperdbg_events::{EventRegistry, ModifyAction, TagSelector};
use hyperdbg_parser::{regid, VariableBounds};
use hyperdbg_symbols::SymbolResolver;
use hyperdbg_vm::{CapturingSink, GuestRegisters, MemoryHost, PseudoRegisterHost, Vm};

use crate::attributes::CommandAttributes;
use crate::error::InterpreterError;
use crate::hypervisor::HypervisorControl;
use crate::table::{self, CommandEntry};
use crate::tokenizer::{split_args, ContinuationTracker};

/// What dispatching one line produced, for a caller (the REPL loop, or a
/// test) to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Printed text, already rendered (e.g. a register dump, `?`'s result).
    Text(String),
    /// The line is not handled locally; forward the raw text over the
    /// transport as-is (spec §4.7 "Dispatch").
    Forward(String),
    /// Recognized and handled with nothing to print (e.g. a successful
    /// `eb`).
    Silent,
    /// A continuation line was consumed but the command is not complete yet
    /// (spec §4.7 "Multi-line commands"); nothing to dispatch until the
    /// caller feeds more lines.
    NeedsMoreInput,
}

/// Name the variable-table slot allocator is guaranteed to hand out first,
/// used by `?`/`print`/`eval` to smuggle an expression's value out of a
/// script with no other output channel for a bare value (only `printf` side
/// effects are otherwise observable from a `CompiledScript`).
const RESULT_GLOBAL: &str = ".__dbg_result";

/// Bundles everything one interactive session needs: the in-process event
/// registry and breakpoint table (spec §4.5/§4.6), the symbol resolver
/// (§4.3), the current guest register snapshot, and the out-of-scope
/// execution-control collaborator. One instance backs either the
/// controller's local REPL state or `hyperdbg-testing`'s end-to-end
/// scenarios; a real controller process additionally has a transport
/// connection this type knows nothing about (`Forward` is the seam).
pub struct Session<H> {
    host: H,
    events: EventRegistry,
    resolver: SymbolResolver,
    registers: GuestRegisters,
    variable_bounds: VariableBounds,
    /// Whether this session is attached to a remote debuggee; governs
    /// [`CommandAttributes::LOCAL_IN_REMOTE_CONNECTION`] routing.
    pub remote: bool,
    /// Whether `pause` and other kernel-debugger-only commands are
    /// permitted (spec §7 `OperationNotPermittedInThisMode`).
    pub kernel_mode: bool,
    last_repeatable: Option<String>,
    continuation: ContinuationTracker,
    pending: String,
}

impl<H> Session<H>
where
    H: hyperdbg_breakpoints::BreakpointHost + MemoryHost + PseudoRegisterHost + HypervisorControl + Clone,
{
    pub fn new(host: H) -> Self {
        Self {
            host,
            events: EventRegistry::new(),
            resolver: SymbolResolver::new(),
            registers: GuestRegisters::new(),
            variable_bounds: VariableBounds::default(),
            remote: false,
            kernel_mode: true,
            last_repeatable: None,
            continuation: ContinuationTracker::new(),
            pending: String::new(),
        }
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut SymbolResolver {
        &mut self.resolver
    }

    pub fn registers(&self) -> &GuestRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut GuestRegisters {
        &mut self.registers
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Feeds one physical line typed at the prompt, handling the
    /// brace/string continuation tracking itself. Returns
    /// [`CommandOutcome::NeedsMoreInput`] until a complete command has
    /// accumulated, at which point it dispatches the joined text.
    pub fn feed_line(&mut self, line: &str) -> Result<CommandOutcome, InterpreterError> {
        if self.pending.is_empty() {
            self.continuation.reset();
        } else {
            self.pending.push('\n');
        }
        self.pending.push_str(line);

        if !self.continuation.feed_line(line) {
            return Ok(CommandOutcome::NeedsMoreInput);
        }

        let full = std::mem::take(&mut self.pending);
        self.dispatch_line(&full)
    }

    /// Dispatches one already-complete line (spec §4.7 "Dispatch"): looks up
    /// the first token, handles an empty line as a repeat of the last
    /// [`CommandAttributes::REPEAT_ON_ENTER`] command, routes local-vs-remote
    /// per the command's attributes, and otherwise runs the local handler.
    pub fn dispatch_line(&mut self, line: &str) -> Result<CommandOutcome, InterpreterError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return match self.last_repeatable.clone() {
                Some(last) => self.dispatch_line(&last),
                None => Ok(CommandOutcome::Silent),
            };
        }

        let args = split_args(trimmed);
        let name = &args[0];

        if (name.eq_ignore_ascii_case("help") || name == ".help" || name == ".hh") && args.len() > 1 {
            return Ok(self.help_for(&args[1]));
        }

        let entry = table::find(name).ok_or_else(|| InterpreterError::UnknownCommand(name.clone()))?;

        if entry.attributes.contains(CommandAttributes::REPEAT_ON_ENTER) {
            self.last_repeatable = Some(trimmed.to_string());
        }

        if self.remote && !entry.attributes.contains(CommandAttributes::LOCAL_IN_REMOTE_CONNECTION) {
            debug!(command = entry.name, "forwarding to remote debuggee");
            return Ok(CommandOutcome::Forward(trimmed.to_string()));
        }

        self.run_local(entry, &args[1..])
    }

    fn help_for(&self, name: &str) -> CommandOutcome {
        match table::find(name) {
            Some(e) => CommandOutcome::Text(format!("{}: {}", e.name, e.help)),
            None => CommandOutcome::Text(format!("no help for '{}'", name)),
        }
    }

    fn run_local(&mut self, entry: &CommandEntry, args: &[String]) -> Result<CommandOutcome, InterpreterError> {
        match entry.name {
            ".help" | "help" | ".hh" => Ok(CommandOutcome::Text(
                table::COMMAND_TABLE
                    .iter()
                    .map(|e| format!("{:<10} {}", e.name, e.help))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            "?" | "print" => {
                let expr = args.join(" ");
                let value = self.eval_u64(&expr)?;
                Ok(CommandOutcome::Text(format!("{:x}", value)))
            }
            "eval" => {
                let expr = args.join(" ");
                self.eval_u64(&expr)?;
                Ok(CommandOutcome::Silent)
            }
            "script" => {
                let source = args.join(" ");
                let output = self.run_script_text(&source)?;
                Ok(CommandOutcome::Text(output))
            }
            "bp" => self.cmd_bp(args),
            "bl" => self.cmd_bl(),
            "be" => self.cmd_modify(args, ModifyAction::Enable),
            "bd" => self.cmd_modify(args, ModifyAction::Disable),
            "bc" => self.cmd_modify(args, ModifyAction::Clear),
            "events" => self.cmd_events(args),
            "flush" => Ok(CommandOutcome::Text("flushed".to_string())),
            "pause" => self.cmd_pause(),
            "g" => Ok(bool_outcome(self.host.resume(), "resumed", "target is not halted")),
            "p" => Ok(bool_outcome(self.host.step_over(), "stepped", "target is not halted")),
            "t" => Ok(bool_outcome(self.host.step_into(), "stepped", "target is not halted")),
            "i" => Ok(CommandOutcome::Text(self.cmd_info())),
            "r" => self.cmd_register(args),
            "u" => self.cmd_unassemble(args),
            "db" => self.cmd_display(args, 1),
            "dc" | "dd" => self.cmd_display(args, 4),
            "dq" => self.cmd_display(args, 8),
            "eb" => self.cmd_write_memory(args, 1),
            "ed" => self.cmd_write_memory(args, 4),
            "eq" => self.cmd_write_memory(args, 8),
            "x" => Ok(CommandOutcome::Text(self.cmd_symbol_search(args))),
            ".sympath" => Ok(CommandOutcome::Text(format!("symbol path set to '{}'", args.join(" ")))),
            ".sym" => Ok(CommandOutcome::Text("symbol reload requested".to_string())),
            "load" => Ok(driver_outcome(self.host.install_driver(), "driver loaded")),
            "unload" => Ok(driver_outcome(self.host.remove_driver(), "driver unloaded")),
            other => Err(InterpreterError::UnknownCommand(other.to_string())),
        }
    }

    /// Compiles `format!("{RESULT_GLOBAL} = ({expr});")` and reads back the
    /// global slot the assignment lands in. `RESULT_GLOBAL` is the first
    /// (and, for a bare expression, only) global identifier the compiler
    /// ever sees in this source, so it deterministically lands in slot 0.
    fn eval_u64(&mut self, expr: &str) -> Result<u64, InterpreterError> {
        let source = format!("{RESULT_GLOBAL} = ({expr});");
        let script = hyperdbg_parser::compile(&source, &self.resolver, self.variable_bounds)?;
        let mut globals = vec![0u64; self.variable_bounds.global_slots as usize];
        let mut sink = CapturingSink::default();
        // Pseudo-register reads need a read-only view alive at the same time
        // the VM holds `&mut self.host` for memory writes; since both come
        // from the same collaborator, clone one for the read side rather
        // than split a single borrow.
        let pseudo = self.host.clone();
        let mut vm = Vm::new(&script, self.registers, &mut globals);
        vm.eval(&mut self.host, &pseudo, &mut sink)?;
        self.registers = *vm.registers();
        if !sink.buffer.is_empty() {
            info!(output = %sink.buffer, "script produced output while evaluating expression");
        }
        Ok(globals[0])
    }

    fn run_script_text(&mut self, source: &str) -> Result<String, InterpreterError> {
        let script = hyperdbg_parser::compile(source, &self.resolver, self.variable_bounds)?;
        let mut globals = vec![0u64; self.variable_bounds.global_slots as usize];
        let mut sink = CapturingSink::default();
        let pseudo = self.host.clone();
        let mut vm = Vm::new(&script, self.registers, &mut globals);
        vm.eval(&mut self.host, &pseudo, &mut sink)?;
        self.registers = *vm.registers();
        Ok(sink.buffer)
    }

    fn cmd_bp(&mut self, args: &[String]) -> Result<CommandOutcome, InterpreterError> {
        let addr_expr = args.first().ok_or_else(|| InterpreterError::BadArguments {
            command: "bp".into(),
            expected: "an address expression",
            got: String::new(),
        })?;
        let address = self.eval_u64(addr_expr)?;
        let condition = if args.len() > 1 {
            Some(hyperdbg_parser::compile(&args[1..].join(" "), &self.resolver, self.variable_bounds)?)
        } else {
            None
        };
        let tag = self.events.register_software_breakpoint(
            &mut self.host,
            address,
            BreakpointFilter::any(),
            condition,
            self.variable_bounds,
            false,
        )?;
        Ok(CommandOutcome::Text(format!("breakpoint {} set at {:#x}", tag, address)))
    }

    fn cmd_bl(&self) -> Result<CommandOutcome, InterpreterError> {
        let lines: Vec<String> = self
            .events
            .breakpoints()
            .iter()
            .map(|d| {
                format!(
                    "{:<4} {:#018x} {}",
                    d.id,
                    d.virtual_address,
                    if d.enabled { "enabled" } else { "disabled" }
                )
            })
            .collect();
        Ok(CommandOutcome::Text(lines.join("\n")))
    }

    fn parse_tag_selector(args: &[String], command: &'static str) -> Result<TagSelector, InterpreterError> {
        let raw = args.first().ok_or_else(|| InterpreterError::BadArguments {
            command: command.to_string(),
            expected: "a tag id or '*'",
            got: String::new(),
        })?;
        if raw == "*" {
            Ok(TagSelector::All)
        } else {
            raw.parse::<u32>()
                .map(TagSelector::One)
                .map_err(|_| InterpreterError::BadArguments {
                    command: command.to_string(),
                    expected: "a numeric tag id or '*'",
                    got: raw.clone(),
                })
        }
    }

    fn cmd_modify(&mut self, args: &[String], action: ModifyAction) -> Result<CommandOutcome, InterpreterError> {
        let selector = Self::parse_tag_selector(args, "be/bd/bc")?;
        self.events.modify(&mut self.host, selector, action)?;
        Ok(CommandOutcome::Silent)
    }

    fn cmd_events(&mut self, args: &[String]) -> Result<CommandOutcome, InterpreterError> {
        match args.first().map(String::as_str) {
            None => {
                let lines: Vec<String> = self
                    .events
                    .iter()
                    .map(|e| format!("{:<4} {:?} {}", e.tag, e.kind, if e.is_enabled() { "enabled" } else { "disabled" }))
                    .collect();
                Ok(CommandOutcome::Text(lines.join("\n")))
            }
            Some("e") => self.cmd_modify(&args[1..], ModifyAction::Enable),
            Some("d") => self.cmd_modify(&args[1..], ModifyAction::Disable),
            Some("c") | Some("clear") => self.cmd_modify(&args[1..], ModifyAction::Clear),
            Some(other) => Err(InterpreterError::BadArguments {
                command: "events".into(),
                expected: "one of e/d/c/clear or no argument",
                got: other.to_string(),
            }),
        }
    }

    fn cmd_pause(&mut self) -> Result<CommandOutcome, InterpreterError> {
        if !self.kernel_mode {
            return Err(InterpreterError::OperationNotPermittedInThisMode(
                "pause requires the kernel-debugger configuration",
            ));
        }
        Ok(CommandOutcome::Text("paused".to_string()))
    }

    fn cmd_info(&self) -> String {
        format!(
            "remote={} kernel_mode={} events={} breakpoints={} modules={}",
            self.remote,
            self.kernel_mode,
            self.events.len(),
            self.events.breakpoints().len(),
            self.resolver.query_count(),
        )
    }

    fn cmd_register(&mut self, args: &[String]) -> Result<CommandOutcome, InterpreterError> {
        let Some(name) = args.first() else {
            let dump: Vec<String> = ["rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "rip"]
                .iter()
                .filter_map(|n| regid::name_to_id(n).and_then(|id| self.registers.read(id)).map(|v| format!("{}={:#x}", n, v)))
                .collect();
            return Ok(CommandOutcome::Text(dump.join(" ")));
        };
        let id = regid::name_to_id(name).ok_or_else(|| InterpreterError::BadArguments {
            command: "r".into(),
            expected: "a known register name",
            got: name.clone(),
        })?;
        if let Some(eq_pos) = args.iter().position(|a| a == "=") {
            let value_expr = args[eq_pos + 1..].join(" ");
            let value = self.eval_u64(&value_expr)?;
            self.registers
                .write(id, value)
                .ok_or_else(|| InterpreterError::BadArguments { command: "r".into(), expected: "a writable register", got: name.clone() })?;
            Ok(CommandOutcome::Silent)
        } else {
            let value = self.registers.read(id).ok_or_else(|| InterpreterError::BadArguments {
                command: "r".into(),
                expected: "a readable register",
                got: name.clone(),
            })?;
            Ok(CommandOutcome::Text(format!("{}={:#x}", name, value)))
        }
    }

    fn cmd_unassemble(&mut self, args: &[String]) -> Result<CommandOutcome, InterpreterError> {
        let addr_expr = args.first().ok_or_else(|| InterpreterError::BadArguments {
            command: "u".into(),
            expected: "an address expression",
            got: String::new(),
        })?;
        let address = self.eval_u64(addr_expr)?;
        match self.host.disassemble(address) {
            Some(text) => Ok(CommandOutcome::Text(text)),
            None => Ok(CommandOutcome::Text(format!("no disassembly available at {:#x}", address))),
        }
    }

    fn cmd_display(&mut self, args: &[String], unit: u8) -> Result<CommandOutcome, InterpreterError> {
        let addr_expr = args.first().ok_or_else(|| InterpreterError::BadArguments {
            command: "d*".into(),
            expected: "an address expression",
            got: String::new(),
        })?;
        let count: usize = args.get(1).and_then(|c| c.parse().ok()).unwrap_or(8);
        let address = self.eval_u64(addr_expr)?;

        let mut words = Vec::with_capacity(count);
        for i in 0..count {
            let at = address + (i as u64) * unit as u64;
            let value = match unit {
                1 => self.host.read_u8(at).map(|v| v as u64),
                4 => self.host.read_u32(at).map(|v| v as u64),
                _ => self.host.read_u64(at),
            };
            match value {
                Some(v) => words.push(format!("{:0width$x}", v, width = (unit as usize) * 2)),
                None => words.push("??".to_string()),
            }
        }
        Ok(CommandOutcome::Text(format!("{:#018x}: {}", address, words.join(" "))))
    }

    fn cmd_write_memory(&mut self, args: &[String], unit: u8) -> Result<CommandOutcome, InterpreterError> {
        if args.len() < 2 {
            return Err(InterpreterError::BadArguments {
                command: "e*".into(),
                expected: "an address and a value",
                got: args.join(" "),
            });
        }
        let address = self.eval_u64(&args[0])?;
        let value = self.eval_u64(&args[1])?;
        let ok = match unit {
            1 => self.host.write_u8(address, value as u8),
            4 => self.host.write_u32(address, value as u32),
            _ => self.host.write_u64(address, value),
        };
        if ok {
            Ok(CommandOutcome::Silent)
        } else {
            Err(InterpreterError::Vm(hyperdbg_vm::VmError::InvalidAddress { address }))
        }
    }

    fn cmd_symbol_search(&self, args: &[String]) -> String {
        let pattern = args.first().map(String::as_str).unwrap_or("");
        self.resolver
            .enumerate()
            .filter(|m| pattern.is_empty() || m.name().to_lowercase().contains(&pattern.to_lowercase()))
            .map(|m| format!("{:#018x} {}", m.module_base, m.name()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn bool_outcome(ok: bool, success: &str, failure: &str) -> CommandOutcome {
    if ok {
        CommandOutcome::Text(success.to_string())
    } else {
        CommandOutcome::Text(failure.to_string())
    }
}

fn driver_outcome(result: Result<(), String>, success: &str) -> CommandOutcome {
    match result {
        Ok(()) => CommandOutcome::Text(success.to_string()),
        Err(message) => CommandOutcome::Text(format!("err, {}", message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDebuggeeHost;

    fn session() -> Session<FakeDebuggeeHost> {
        Session::new(FakeDebuggeeHost::new())
    }

    #[test]
    fn question_mark_prints_decimal_sum_as_hex() {
        let mut s = session();
        let outcome = s.dispatch_line("? 0n10 + 0n5").unwrap();
        assert_eq!(outcome, CommandOutcome::Text("f".to_string()));
    }

    #[test]
    fn bp_then_bc_lifecycle() {
        let mut s = session();
        s.host_mut().seed_byte(0x1000, 0x90);

        let outcome = s.dispatch_line("bp 0x1000").unwrap();
        assert!(matches!(outcome, CommandOutcome::Text(t) if t.contains("breakpoint 1")));
        assert_eq!(s.events().breakpoints().get(1).unwrap().previous_byte, 0x90);

        let err = s.dispatch_line("bp 0x1000").unwrap_err();
        assert!(matches!(
            err,
            InterpreterError::Event(hyperdbg_events::EventError::Breakpoint(
                hyperdbg_breakpoints::BreakpointError::BreakpointExists { .. }
            ))
        ));

        s.dispatch_line("bc 1").unwrap();
        assert!(s.events().breakpoints().get(1).is_none());

        let outcome = s.dispatch_line("bp 0x1000").unwrap();
        assert!(matches!(outcome, CommandOutcome::Text(t) if t.contains("breakpoint 2")));
    }

    #[test]
    fn events_command_lists_and_disables() {
        let mut s = session();
        s.host_mut().seed_byte(0x1000, 0x90);
        s.host_mut().seed_byte(0x2000, 0x90);
        s.dispatch_line("bp 0x1000").unwrap();
        s.dispatch_line("bp 0x2000").unwrap();

        let listing = s.dispatch_line("events").unwrap();
        let CommandOutcome::Text(text) = listing else { panic!("expected text") };
        assert_eq!(text.lines().count(), 2);

        s.dispatch_line("events d 1").unwrap();
        assert_eq!(s.events().query_state(1), Some(false));
        assert_eq!(s.events().query_state(2), Some(true));
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut s = session();
        let err = s.dispatch_line("frobnicate").unwrap_err();
        assert!(matches!(err, InterpreterError::UnknownCommand(c) if c == "frobnicate"));
    }

    #[test]
    fn empty_line_repeats_last_repeat_on_enter_command() {
        let mut s = session();
        s.dispatch_line("p").unwrap();
        let outcome = s.dispatch_line("").unwrap();
        assert_eq!(outcome, CommandOutcome::Text("stepped".to_string()));
    }

    #[test]
    fn remote_session_forwards_non_local_commands() {
        let mut s = session();
        s.remote = true;
        let outcome = s.dispatch_line("g").unwrap();
        assert_eq!(outcome, CommandOutcome::Forward("g".to_string()));
    }

    #[test]
    fn remote_session_still_handles_local_commands() {
        let mut s = session();
        s.remote = true;
        let outcome = s.dispatch_line("bl").unwrap();
        assert_eq!(outcome, CommandOutcome::Text(String::new()));
    }

    #[test]
    fn multi_line_continuation_waits_for_closing_brace() {
        let mut s = session();
        assert_eq!(s.feed_line("script if (0n1 == 0n1) {").unwrap(), CommandOutcome::NeedsMoreInput);
        assert_eq!(s.feed_line("printf(\"hit\");").unwrap(), CommandOutcome::NeedsMoreInput);
        let outcome = s.feed_line("}").unwrap();
        assert_eq!(outcome, CommandOutcome::Text("hit".to_string()));
    }

    #[test]
    fn pause_outside_kernel_mode_is_rejected() {
        let mut s = session();
        s.kernel_mode = false;
        let err = s.dispatch_line("pause").unwrap_err();
        assert!(matches!(err, InterpreterError::OperationNotPermittedInThisMode(_)));
    }

    #[test]
    fn register_read_and_write_round_trip() {
        let mut s = session();
        s.dispatch_line("r rax = 0n42").unwrap();
        let outcome = s.dispatch_line("r rax").unwrap();
        assert_eq!(outcome, CommandOutcome::Text("rax=0x2a".to_string()));
    }
}
