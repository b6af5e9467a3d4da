//! Serving side of the daemon.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                  Server                     │
//! ├──────────────┬───────────────┬─────────────┤
//! │ TCP listener │ admin socket  │  monitor    │
//! │ (line proto) │ (line proto)  │ (escalation)│
//! ├──────────────┴───────────────┴─────────────┤
//! │               PluginManager                 │
//! │       script │ network │ probe              │
//! └────────────────────────────────────────────┘
//! ```
//!
//! All three tasks share one cancellation token, fired on SIGINT/SIGTERM.

pub mod executor;
pub mod monitor;
pub mod protocol;
pub mod server;

pub use executor::CommandExecutor;
pub use monitor::{DiagnosticMonitor, Escalation, MonitorConfig};
pub use protocol::Request;
pub use server::{Listeners, Server};
