use crate::context::ContextId;
use crate::factory::OperationKind;
use crate::mi::ParseError;
use crate::version::Version;

/// Failure of a single submitted command, delivered through its completion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// Backend answered with an `^error` result record.
    #[error("{message}")]
    Backend {
        message: String,
        code: Option<String>,
    },
    /// Command was cancelled by the caller before its result arrived.
    #[error("command cancelled")]
    Cancelled,
    /// Backend stream closed (or session shut down) while the command was pending.
    #[error("connection is shut down")]
    Disconnected,
    /// Command reached a session that no longer accepts commands.
    #[error("session closed")]
    SessionClosed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("backend version is not negotiated yet, {0} is not allowed")]
    NotNegotiated(OperationKind),
    #[error("operation {operation} is not supported by backend version {version}")]
    Unsupported {
        operation: OperationKind,
        version: Version,
    },
    #[error("invalid argument for {0}: {1}")]
    InvalidArgument(OperationKind, &'static str),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("context {0} already registered")]
    Duplicate(ContextId),
    #[error("context {0} not found")]
    NotFound(ContextId),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- session errors --------------------------------------------
    #[error("session closed")]
    SessionClosed,
    #[error("blocking wait on the session thread")]
    WouldDeadlock,
    #[error("timeout while waiting for a command result")]
    Timeout,
    #[error("backend version not found in banner: {0:?}")]
    VersionNotDetected(String),

    // --------------------------------- command errors --------------------------------------------
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("command line: {0}")]
    CommandLine(#[from] ParseError),

    // --------------------------------- environment errors ----------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Return a hint to a front end - continue the session after error or drop it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::WouldDeadlock => false,
            Error::Timeout => false,
            Error::VersionNotDetected(_) => false,
            Error::Command(CommandError::Backend { .. }) => false,
            Error::Command(CommandError::Cancelled) => false,
            Error::Factory(_) => false,
            Error::Registry(_) => false,
            Error::CommandLine(_) => false,
            Error::Config(_) => false,

            Error::SessionClosed => true,
            Error::Command(CommandError::Disconnected) => true,
            Error::Command(CommandError::SessionClosed) => true,
            Error::IO(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                if $crate::log::is_enabled() {
                    $log_fn!(target: "session", "{:#}", e);
                }
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                if $crate::log::is_enabled() {
                    $log_fn!(target: "session", concat!($msg, " {:#}"), e);
                }
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
