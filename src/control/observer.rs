use crate::control::completion::{CommandId, CommandResult};
use crate::mi::{Command, Token};

/// Listener of command lifecycle. Callbacks run on the session thread.
pub trait CommandObserver: Send {
    /// Command accepted by the session (possibly merged with a pending one).
    fn on_queued(&mut self, _id: CommandId, _command: &Command) {}

    /// Command written to the backend with the given token.
    fn on_sent(&mut self, _id: CommandId, _token: Token, _command: &Command) {}

    /// Command cancelled before it was written.
    fn on_removed(&mut self, _id: CommandId, _command: &Command) {}

    /// Command completed.
    fn on_done(&mut self, _id: CommandId, _result: &CommandResult) {}
}
