use bitflags::bitflags;

bitflags! {
    /// Per-command routing flags (spec §4.7). Stored on a [`crate::table::CommandEntry`]
    /// and consulted by [`crate::session::Session::dispatch_line`] before a
    /// handler ever runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandAttributes: u8 {
        /// If clear, the command line is lowercased before matching this
        /// entry's name.
        const CASE_SENSITIVE             = 1 << 0;
        /// Executed locally even when the session is attached to a remote
        /// debuggee (e.g. `.help`, `.sympath`).
        const LOCAL_IN_REMOTE_CONNECTION  = 1 << 1;
        /// Only meaningful while *not* attached to a remote debuggee; has no
        /// bearing on remote routing once attached.
        const LOCAL_IN_DEBUGGER_MODE      = 1 << 2;
        /// Pressing Enter at an empty prompt reruns this command.
        const REPEAT_ON_ENTER             = 1 << 3;
        /// The command may continue running past a subsequent debuggee halt
        /// without the interpreter surfacing it as an interruption.
        const WONT_STOP_DEBUGGER          = 1 << 4;
    }
}

impl Default for CommandAttributes {
    fn default() -> Self {
        CommandAttributes::empty()
    }
}
