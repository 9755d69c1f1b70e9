//! HyperDbg controller: the REPL loop, the transport-read thread with its
//! bounded inbound packet queue, tracing setup, and env-var configuration.
//! Generalized from the teacher's `crates/daemon` (`sisctl` supervising a
//! QEMU guest) to one controller supervising a debuggee over a
//! serial/TCP transport.

pub mod config;
pub mod repl;
pub mod transport_io;

pub use config::{HyperdbgConfig, TransportTarget};
