use crate::attributes::CommandAttributes;

/// One row of the command dispatch table (spec §4.7). `name` is matched
/// against the command line's first token, case-insensitively unless
/// [`CommandAttributes::CASE_SENSITIVE`] is set.
#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    pub name: &'static str,
    pub attributes: CommandAttributes,
    pub help: &'static str,
}

const fn entry(name: &'static str, attributes: CommandAttributes, help: &'static str) -> CommandEntry {
    CommandEntry { name, attributes, help }
}

use CommandAttributes as A;

/// The minimum command surface spec §6.3 requires an implementer to
/// support. `bp`/`bl`/`be`/`bd`/`bc`/`events`/`print`/`eval`/`script`/`x`/
/// `.sympath`/`.sym` are handled entirely by this crate against the
/// in-process `hyperdbg-events`/`hyperdbg-symbols` state (that is, in fact,
/// what makes the core testable without a real hypervisor); `g`/`p`/`t`/
/// `i`/`r`/`u`/`d*`/`e*`/`load`/`unload` go through [`crate::hypervisor::HypervisorControl`],
/// the out-of-scope collaborator a real debuggee connection would back.
pub const COMMAND_TABLE: &[CommandEntry] = &[
    entry(".help", A::LOCAL_IN_REMOTE_CONNECTION.union(A::LOCAL_IN_DEBUGGER_MODE), "show command help"),
    entry("help", A::LOCAL_IN_REMOTE_CONNECTION.union(A::LOCAL_IN_DEBUGGER_MODE), "alias for .help"),
    entry(".hh", A::LOCAL_IN_REMOTE_CONNECTION.union(A::LOCAL_IN_DEBUGGER_MODE), "alias for .help"),
    entry("?", A::empty(), "evaluate an expression and print its value"),
    entry("g", A::REPEAT_ON_ENTER, "resume guest execution"),
    entry("p", A::REPEAT_ON_ENTER, "step one instruction, stepping over calls"),
    entry("t", A::REPEAT_ON_ENTER, "step one instruction, tracing into calls"),
    entry("i", A::LOCAL_IN_DEBUGGER_MODE, "show session/target info"),
    entry("r", A::empty(), "show or set a register"),
    entry("u", A::empty(), "unassemble at an address"),
    entry("db", A::empty(), "display memory as bytes"),
    entry("dc", A::empty(), "display memory as dwords and ascii"),
    entry("dd", A::empty(), "display memory as dwords"),
    entry("dq", A::empty(), "display memory as qwords"),
    entry("eb", A::empty(), "write a byte to memory"),
    entry("ed", A::empty(), "write a dword to memory"),
    entry("eq", A::empty(), "write a qword to memory"),
    entry("bp", A::LOCAL_IN_DEBUGGER_MODE, "set a software breakpoint"),
    entry("bl", A::LOCAL_IN_DEBUGGER_MODE, "list breakpoints"),
    entry("be", A::LOCAL_IN_DEBUGGER_MODE, "enable a breakpoint or event"),
    entry("bd", A::LOCAL_IN_DEBUGGER_MODE, "disable a breakpoint or event"),
    entry("bc", A::LOCAL_IN_DEBUGGER_MODE, "clear a breakpoint or event"),
    entry("events", A::LOCAL_IN_DEBUGGER_MODE, "list or modify registered events"),
    entry("print", A::LOCAL_IN_DEBUGGER_MODE, "evaluate an expression and print its value"),
    entry("eval", A::LOCAL_IN_DEBUGGER_MODE, "evaluate an expression, discarding the value"),
    entry("script", A::LOCAL_IN_DEBUGGER_MODE, "compile and run an inline script"),
    entry("flush", A::LOCAL_IN_DEBUGGER_MODE.union(A::WONT_STOP_DEBUGGER), "flush buffered output"),
    entry("pause", A::LOCAL_IN_DEBUGGER_MODE, "pause the guest"),
    entry("x", A::LOCAL_IN_DEBUGGER_MODE.union(A::LOCAL_IN_REMOTE_CONNECTION), "search loaded symbols by pattern"),
    entry(".sympath", A::LOCAL_IN_REMOTE_CONNECTION.union(A::LOCAL_IN_DEBUGGER_MODE), "set the symbol search path"),
    entry(".sym", A::LOCAL_IN_REMOTE_CONNECTION.union(A::LOCAL_IN_DEBUGGER_MODE), "reload symbols for the current modules"),
    entry("load", A::LOCAL_IN_DEBUGGER_MODE, "install the driver equivalent"),
    entry("unload", A::LOCAL_IN_DEBUGGER_MODE, "remove the driver equivalent"),
];

/// Looks up `name` against [`COMMAND_TABLE`], respecting each entry's own
/// case sensitivity.
pub fn find(name: &str) -> Option<&'static CommandEntry> {
    COMMAND_TABLE.iter().find(|e| {
        if e.attributes.contains(CommandAttributes::CASE_SENSITIVE) {
            e.name == name
        } else {
            e.name.eq_ignore_ascii_case(name)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_by_default() {
        assert!(find("BP").is_some());
        assert!(find("Bp").is_some());
    }

    #[test]
    fn unknown_command_is_absent() {
        assert!(find("frobnicate").is_none());
    }

    #[test]
    fn repeat_on_enter_flags_the_step_family() {
        assert!(find("p").unwrap().attributes.contains(CommandAttributes::REPEAT_ON_ENTER));
        assert!(find("t").unwrap().attributes.contains(CommandAttributes::REPEAT_ON_ENTER));
        assert!(find("g").unwrap().attributes.contains(CommandAttributes::REPEAT_ON_ENTER));
        assert!(!find("bp").unwrap().attributes.contains(CommandAttributes::REPEAT_ON_ENTER));
    }
}
