//! Command control: pending command table, session thread and its client side API.

pub mod completion;
pub mod correlator;
pub(crate) mod executor;
pub mod observer;
pub mod session;

pub use completion::{CommandId, CommandOutput, CommandResult, Completion};
pub use executor::SessionView;
pub use observer::CommandObserver;
pub use session::{CommandHandle, Session};
