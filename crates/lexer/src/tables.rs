//! Static lookup tables for keywords, registers and pseudo-registers.
//!
//! These are spelling tables only — "is this a valid register name" — not the
//! width/offset semantics used to actually read a register. That lives in
//! `hyperdbg-vm`, which is further up the dependency chain than the lexer.

pub const KEYWORDS: &[&str] = &[
    "if", "else", "while", "do", "for", "break", "continue", "return",
    "printf", "print", "eval", "script",
    "dd", "db", "dq", "dc",
    "eb", "ed", "eq", "poi", "hi", "low", "strlen", "wcslen",
    "disableevent", "enableevent", "pause", "flush", "event_sc", "event_inject",
    "spinlock_lock", "spinlock_unlock", "spinlock_lock_custom_wait",
    "interlocked_exchange", "interlocked_exchange_add",
    "interlocked_increment", "interlocked_decrement", "interlocked_compare_exchange",
];

pub const REGISTERS: &[&str] = &[
    // 64-bit GPRs
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp",
    "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
    // 32-bit
    "eax", "ebx", "ecx", "edx", "esi", "edi", "ebp", "esp",
    "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d", "r15d",
    // 16-bit
    "ax", "bx", "cx", "dx", "si", "di", "bp", "sp",
    "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w",
    // 8-bit
    "ah", "al", "bh", "bl", "ch", "cl", "dh", "dl",
    "sil", "dil", "bpl", "spl",
    "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b",
    // instruction pointer / flags
    "rip", "eip", "rflags", "eflags",
    // flag bits
    "cf", "pf", "af", "zf", "sf", "tf", "if", "df", "of",
    // segment registers
    "cs", "ds", "es", "fs", "gs", "ss",
    // control / debug registers
    "cr0", "cr2", "cr3", "cr4", "cr8",
    "dr0", "dr1", "dr2", "dr3", "dr6", "dr7",
    // descriptor table registers
    "idtr", "gdtr", "ldtr", "tr",
];

pub const PSEUDO_REGISTERS: &[&str] = &[
    "proc", "thread", "pid", "tid", "peb", "teb", "ip", "sp", "base", "handle",
];

pub fn is_keyword(s: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(s))
}

pub fn is_register(s: &str) -> bool {
    REGISTERS.iter().any(|r| r.eq_ignore_ascii_case(s))
}

pub fn is_pseudo_register(s: &str) -> bool {
    PSEUDO_REGISTERS.iter().any(|r| r.eq_ignore_ascii_case(s))
}
