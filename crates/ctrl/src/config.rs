//! Controller configuration, loaded from environment variables with
//! defaults, mirroring `SISCTL_BIND`/`std::env::var` in the teacher's
//! `crates/daemon/src/main.rs` (no config-file format is invented beyond
//! what the teacher does).

/// Where the controller reads/writes debuggee packets. `None` means no
/// transport is attached and the REPL runs purely against the in-process
/// fake host (useful for local scripting without a debuggee present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    Serial(String),
    Tcp(String),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperdbgConfig {
    /// `.sympath`'s initial value.
    pub symbol_search_path: String,
    pub transport: TransportTarget,
    /// Debuggee word width in bits, used by `pack_script`/`unpack_script`.
    pub word_width_bits: u8,
    /// `EnvFilter` spec passed straight through to `tracing_subscriber`.
    pub log_filter: String,
    /// Start in kernel-debugger mode (enables `pause`) vs. user mode.
    pub kernel_mode: bool,
    /// Depth of the inbound packet queue fed by the transport-read thread.
    pub inbound_queue_depth: usize,
}

impl Default for HyperdbgConfig {
    fn default() -> Self {
        Self {
            symbol_search_path: "srv*https://msdl.microsoft.com/download/symbols".to_string(),
            transport: TransportTarget::None,
            word_width_bits: 64,
            log_filter: "info,hyperdbgctrl=debug".to_string(),
            kernel_mode: true,
            inbound_queue_depth: 256,
        }
    }
}

impl HyperdbgConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("HYPERDBG_SYMPATH") {
            config.symbol_search_path = path;
        }

        if let Ok(serial) = std::env::var("HYPERDBG_SERIAL") {
            config.transport = TransportTarget::Serial(serial);
        } else if let Ok(addr) = std::env::var("HYPERDBG_TCP") {
            config.transport = TransportTarget::Tcp(addr);
        }

        if let Ok(width) = std::env::var("HYPERDBG_WORD_WIDTH") {
            if let Ok(val) = width.parse() {
                config.word_width_bits = val;
            }
        }

        if let Ok(filter) = std::env::var("RUST_LOG") {
            config.log_filter = filter;
        }

        if let Ok(mode) = std::env::var("HYPERDBG_USER_MODE") {
            config.kernel_mode = !(mode == "1" || mode.eq_ignore_ascii_case("true"));
        }

        if let Ok(depth) = std::env::var("HYPERDBG_QUEUE_DEPTH") {
            if let Ok(val) = depth.parse() {
                config.inbound_queue_depth = val;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_transport() {
        assert_eq!(HyperdbgConfig::default().transport, TransportTarget::None);
    }
}
