use crate::error::CommandError;
use crate::mi::{Record, ResultClass, StreamKind, Value};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Client side identity of a submitted command, stable before the command
/// gets its wire token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl CommandId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CommandId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Successful command result.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub class: ResultClass,
    pub results: Vec<(String, Value)>,
    /// Console stream text received since the previous result record.
    pub console: Vec<String>,
    /// Recent out-of-band records received since the previous result record.
    pub oob: Vec<Record>,
}

impl CommandOutput {
    /// Output of a command that never gets a result record.
    pub(crate) fn written() -> Self {
        Self {
            class: ResultClass::Done,
            results: vec![],
            console: vec![],
            oob: vec![],
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        crate::mi::output::find(&self.results, key)
    }

    pub fn get_const(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_const)
    }

    /// Joined console output.
    pub fn console_text(&self) -> String {
        self.console.concat()
    }

    /// Text of out-of-band stream records of the given kind.
    pub fn stream_text(&self, kind: StreamKind) -> String {
        self.oob
            .iter()
            .filter_map(|r| match r {
                Record::Stream(s) if s.kind == kind => Some(s.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub type CommandResult = Result<CommandOutput, CommandError>;

type Callback = Box<dyn FnOnce(CommandResult) + Send>;

/// Completion target of a command. Fires exactly once: either by
/// [`Completion::complete`] or, if dropped before, with
/// [`CommandError::SessionClosed`].
pub struct Completion {
    callback: Option<Callback>,
}

impl Completion {
    pub fn new(f: impl FnOnce(CommandResult) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(f)),
        }
    }

    pub fn complete(mut self, result: CommandResult) {
        if let Some(cb) = self.callback.take() {
            cb(result);
        }
    }

    /// Drop completion without firing it.
    pub(crate) fn disarm(mut self) {
        self.callback.take();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(cb) = self.callback.take() {
            cb(Err(CommandError::SessionClosed));
        }
    }
}
