//! Integration test harness for the HyperDbg script engine core.
//!
//! Exercises the lexer, parser, symbol resolver, VM, event registry and
//! breakpoint engine together, end to end, against fake hosts — standing in
//! for the real hypervisor and kernel collaborators that are out of scope
//! for this workspace (see `spec.md` §1).

pub mod scenarios;
