use crate::symbol::OpCode;

/// Maps a builtin function-call keyword spelling to its opcode. Keywords not
/// in this table are either control-flow keywords (`if`, `while`, ...)
/// handled directly by the grammar, or unknown.
pub fn builtin_opcode(name: &str) -> Option<OpCode> {
    use OpCode::*;
    Some(match name {
        "eb" => WriteByte,
        "ed" => WriteDword,
        "eq" => WriteQword,
        "poi" => Deref,
        "hi" => Hi,
        "low" => Low,
        "strlen" => StrLen,
        "wcslen" => WcsLen,
        "printf" => Printf,
        "print" => Print,
        "disableevent" => DisableEvent,
        "enableevent" => EnableEvent,
        "pause" => Pause,
        "flush" => Flush,
        "event_sc" => EventSetCr3,
        "event_inject" => EventInject,
        "spinlock_lock" => SpinlockLock,
        "spinlock_unlock" => SpinlockUnlock,
        "spinlock_lock_custom_wait" => SpinlockLockCustomWait,
        "interlocked_exchange" => InterlockedExchange,
        "interlocked_exchange_add" => InterlockedExchangeAdd,
        "interlocked_increment" => InterlockedIncrement,
        "interlocked_decrement" => InterlockedDecrement,
        "interlocked_compare_exchange" => InterlockedCompareExchange,
        _ => return None,
    })
}
