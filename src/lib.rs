//! Command-control engine for GDB/MI debugger backends.
//!
//! A [`Session`] owns a backend connection: it writes commands with unique
//! tokens, correlates result records with their commands, tracks debug
//! contexts (thread groups, threads, frames) from out-of-band records and
//! fans events out to listeners. [`CommandFactory`] builds commands for the
//! negotiated backend version.

pub mod config;
pub mod console;
pub mod context;
pub mod control;
pub mod error;
pub mod factory;
pub mod log;
pub mod mi;
pub mod trace;
pub mod version;

pub use config::{Config, SessionConfig};
pub use context::{ContextFilter, ContextId, DebugContext, EventListener, ListenerId, RunState};
pub use control::{CommandHandle, CommandId, CommandObserver, CommandOutput, CommandResult, Session};
pub use error::{CommandError, Error, FactoryError};
pub use factory::{BackendInfo, CommandFactory, Operation};
pub use mi::{Command, Record};
pub use version::Version;
