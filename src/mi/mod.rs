//! GDB/MI line protocol: output records decoding and command encoding.

pub mod command;
pub mod cstring;
pub mod output;
pub mod parser;

pub use command::{parse_command_line, Command, CommandKind, Dialect};
pub use output::{
    AsyncKind, AsyncRecord, ExecClass, Record, ResultClass, ResultRecord, StreamKind,
    StreamRecord, Token, Value,
};
pub use parser::parse;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed c-string: {0}")]
    CString(&'static str),
    #[error("{0}")]
    Syntax(String),
    #[error("`--frame` option without `--thread`")]
    FrameWithoutThread,
}
