//! End-to-end scenarios exercising the script engine core without a real
//! hypervisor behind it, since that collaborator is out of scope — each
//! scenario drives the crates directly the way `hyperdbg-ctrl` would.

use anyhow::{bail, ensure, Context, Result};

use hyperdbg_events::{Action, EventError, EventRegistry, NullCustomCodeRunner, TriggeredEventDetails};
use hyperdbg_interpreter::{FakeDebuggeeHost, Session};
use hyperdbg_lexer::{lex_all, TokenKind};
use hyperdbg_parser::{compile_default, regid, VariableBounds};
use hyperdbg_symbols::{ResolveError, SymbolBackend, SymbolEntry, SymbolModuleEntry, SymbolResolver};
use hyperdbg_vm::{CapturingSink, GuestRegisters, NullMemoryHost, PseudoRegisterHost};

struct StubPseudo;
impl PseudoRegisterHost for StubPseudo {
    fn read_pseudo(&self, _id: u32) -> Option<u64> {
        None
    }
}

/// *Hex default lexing.* `dd 0x100` lexes as `Keyword("dd"), Hex("100")`,
/// and the hex spelling parses back to `0x100`.
pub fn hex_default_lexing() -> Result<()> {
    let tokens = lex_all("dd 0x100");
    ensure!(tokens[0].kind == TokenKind::Keyword && tokens[0].value == "dd", "expected dd keyword, got {:?}", tokens[0]);
    ensure!(tokens[1].kind == TokenKind::Hex && tokens[1].value == "100", "expected hex 100, got {:?}", tokens[1]);
    let parsed = u64::from_str_radix(&tokens[1].value, 16).context("hex spelling didn't parse")?;
    ensure!(parsed == 0x100, "expected 0x100, got {parsed:#x}");
    Ok(())
}

/// *Decimal prefix.* `? 0n10 + 0n5` evaluates to 15, printed as hex `f`.
pub fn decimal_prefix_addition_prints_as_hex() -> Result<()> {
    let mut session = Session::new(FakeDebuggeeHost::new());
    match session.feed_line("? 0n10 + 0n5").context("dispatch failed")? {
        hyperdbg_interpreter::CommandOutcome::Text(text) => {
            ensure!(text == "f", "expected 'f', got '{text}'");
        }
        other => bail!("expected printed text, got {other:?}"),
    }
    Ok(())
}

/// *Conditional script.* A bare `@rax == 0x1234` condition script fires the
/// event's action only when the snapshot's rax matches; otherwise nothing
/// prints and the dispatch reports no match.
pub fn conditional_breakpoint_prints_only_on_match() -> Result<()> {
    let mut registry = EventRegistry::new();
    let condition = compile_default("@rax == 0x1234;")?;
    let action = compile_default(r#"print("hit");"#)?;
    let tag = registry.register(
        hyperdbg_events::EventKind::SoftwareBreakpoint,
        Some(condition),
        VariableBounds::default(),
        None,
        false,
    );
    registry.add_action(tag, Action::RunScript { compiled_script: action })?;

    let rax_id = regid::name_to_id("rax").expect("rax is a known register");

    let mut matching_regs = GuestRegisters::new();
    matching_regs.write(rax_id, 0x1234).expect("rax is writable");
    let mut mem = hyperdbg_vm::FakeMemoryHost::new();
    let mut sink = CapturingSink::default();
    let mut custom = NullCustomCodeRunner;
    let outcome = registry.dispatch(
        TriggeredEventDetails { tag, context: 0, stage: 0 },
        matching_regs,
        &mut mem,
        &StubPseudo,
        &mut sink,
        &mut custom,
    )?;
    ensure!(outcome.condition_matched, "expected condition to match when rax=0x1234");
    ensure!(sink.buffer == "hit\n", "expected 'hit\\n' printed, got '{}'", sink.buffer);

    let mut sink = CapturingSink::default();
    let outcome = registry.dispatch(
        TriggeredEventDetails { tag, context: 0, stage: 0 },
        GuestRegisters::new(),
        &mut mem,
        &StubPseudo,
        &mut sink,
        &mut custom,
    )?;
    ensure!(!outcome.condition_matched, "expected condition to reject when rax=0");
    ensure!(sink.buffer.is_empty(), "expected nothing printed, got '{}'", sink.buffer);
    Ok(())
}

/// *Breakpoint lifecycle.* `bp` installs a trap byte and assigns id 1;
/// installing again at the same address fails with `BreakpointExists`;
/// after `bc 1` the byte is restored and a fresh `bp` at that address
/// succeeds again.
pub fn breakpoint_lifecycle_reuses_freed_address() -> Result<()> {
    let mut session = Session::new(FakeDebuggeeHost::new());
    session.host_mut().seed_byte(0xfffff80000001000, 0x90);

    let first = session.feed_line("bp 0xfffff80000001000")?;
    ensure!(
        matches!(&first, hyperdbg_interpreter::CommandOutcome::Text(t) if t.contains("breakpoint 1")),
        "expected breakpoint 1, got {first:?}"
    );
    ensure!(
        session.host().read_byte(0xfffff80000001000) == Some(0xcc),
        "expected trap byte installed"
    );

    let dup = session.feed_line("bp 0xfffff80000001000");
    ensure!(
        matches!(dup, Err(hyperdbg_interpreter::InterpreterError::Event(EventError::Breakpoint(_)))),
        "expected a duplicate install to fail, got {dup:?}"
    );

    session.feed_line("bc 1")?;
    ensure!(
        session.host().read_byte(0xfffff80000001000) == Some(0x90),
        "expected original byte restored after bc"
    );

    let second = session.feed_line("bp 0xfffff80000001000")?;
    ensure!(
        matches!(&second, hyperdbg_interpreter::CommandOutcome::Text(t) if t.contains("breakpoint 2")),
        "expected a fresh breakpoint after bc, got {second:?}"
    );
    Ok(())
}

/// *Events enumeration.* Two `bp` commands list with ids 1 and 2, both
/// enabled; `events d 1` disables the first without touching its trap byte.
pub fn events_listing_reflects_disable() -> Result<()> {
    let mut session = Session::new(FakeDebuggeeHost::new());
    session.host_mut().seed_byte(0x1000, 0x90);
    session.host_mut().seed_byte(0x2000, 0x90);
    session.feed_line("bp 0x1000")?;
    session.feed_line("bp 0x2000")?;

    ensure!(session.events().len() == 2, "expected two events registered");
    ensure!(session.events().query_state(1) == Some(true), "expected event 1 enabled");

    session.feed_line("events d 1")?;
    ensure!(session.events().query_state(1) == Some(false), "expected event 1 disabled");
    ensure!(session.events().query_state(2) == Some(true), "expected event 2 still enabled");
    ensure!(
        session.host().read_byte(0x1000) == Some(0xcc),
        "disabling must not touch the trap byte, only the engine's enabled flag"
    );
    Ok(())
}

struct FakeSymbolBackend;
impl SymbolBackend for FakeSymbolBackend {
    fn parse_symbols(&self, _image_path: &str, _pdb_path: &str) -> Result<Vec<(u64, SymbolEntry)>, ResolveError> {
        Ok(vec![(0x1000, SymbolEntry { name: "PsInitialSystemProcess".to_string(), byte_size: 8 })])
    }
}

/// *Symbol resolution fallback.* With `nt` loaded, `nt!PsInitialSystemProcess`
/// resolves and the script compiles; without it, the same source fails with
/// `UndefinedIdentifier`.
pub fn symbol_resolution_fallback() -> Result<()> {
    let bounds = VariableBounds::default();

    let unresolved = hyperdbg_parser::compile("? nt!PsInitialSystemProcess;", &SymbolResolver::new(), bounds);
    ensure!(
        matches!(unresolved, Err(hyperdbg_parser::ParseError::UndefinedIdentifier { .. })),
        "expected UndefinedIdentifier without a loaded module, got {unresolved:?}"
    );

    let mut resolver = SymbolResolver::new();
    resolver.load_symbol(
        &FakeSymbolBackend,
        SymbolModuleEntry {
            module_base: 0xfffff8000_0000000,
            image_name: "ntoskrnl.exe".to_string(),
            image_path: "ntoskrnl.exe".to_string(),
            pdb_guid_age: (0, 1),
            pdb_path: "ntoskrnl.pdb".to_string(),
            is_user_mode: false,
        },
    )?;
    let resolved = hyperdbg_parser::compile("? nt!PsInitialSystemProcess;", &resolver, bounds)?;
    ensure!(!resolved.symbol_stream.is_empty(), "expected a non-empty compiled script");
    Ok(())
}

pub const ALL: &[(&str, fn() -> Result<()>)] = &[
    ("hex_default_lexing", hex_default_lexing),
    ("decimal_prefix_addition_prints_as_hex", decimal_prefix_addition_prints_as_hex),
    ("conditional_breakpoint_prints_only_on_match", conditional_breakpoint_prints_only_on_match),
    ("breakpoint_lifecycle_reuses_freed_address", breakpoint_lifecycle_reuses_freed_address),
    ("events_listing_reflects_disable", events_listing_reflects_disable),
    ("symbol_resolution_fallback", symbol_resolution_fallback),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes() {
        for (name, scenario) in ALL {
            scenario().unwrap_or_else(|err| panic!("scenario '{name}' failed: {err:#}"));
        }
    }
}
