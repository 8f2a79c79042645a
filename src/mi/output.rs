//! Decoded MI output records.

use itertools::Itertools;
use std::fmt::{Display, Formatter};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Sequence token that ties a result record to the command that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MI value: a constant, a tuple, or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Const(String),
    /// `{a="1",b="2"}`, order is preserved and keys may repeat.
    Tuple(Vec<(String, Value)>),
    /// `["1","2"]`.
    List(Vec<Value>),
    /// `[frame={..},frame={..}]`.
    ResultList(Vec<(String, Value)>),
}

impl Value {
    pub fn as_const(&self) -> Option<&str> {
        match self {
            Value::Const(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Tuple(results) => Some(results),
            _ => None,
        }
    }

    /// Return list items. Items of a result list are returned without their names.
    pub fn as_list(&self) -> Option<Vec<&Value>> {
        match self {
            Value::List(values) => Some(values.iter().collect()),
            Value::ResultList(results) => Some(results.iter().map(|(_, v)| v).collect()),
            _ => None,
        }
    }

    /// Find first value with name `key` in a tuple or a result list.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Tuple(results) | Value::ResultList(results) => find(results, key),
            _ => None,
        }
    }
}

pub(crate) fn find<'a>(results: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    results.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn fmt_results(f: &mut Formatter<'_>, results: &[(String, Value)]) -> std::fmt::Result {
    write!(
        f,
        "{}",
        results.iter().map(|(k, v)| format!("{k}={v}")).join(",")
    )
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Const(s) => write!(f, "\"{}\"", super::cstring::escape(s, true)),
            Value::Tuple(results) => {
                f.write_str("{")?;
                fmt_results(f, results)?;
                f.write_str("}")
            }
            Value::List(values) => write!(f, "[{}]", values.iter().join(",")),
            Value::ResultList(results) => {
                f.write_str("[")?;
                fmt_results(f, results)?;
                f.write_str("]")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, IntoStaticStr)]
pub enum ResultClass {
    #[strum(serialize = "done")]
    Done,
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "connected")]
    Connected,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "exit")]
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub token: Option<Token>,
    pub class: ResultClass,
    pub results: Vec<(String, Value)>,
}

impl ResultRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        find(&self.results, key)
    }

    /// Backend error message. The message is taken from `msg` (or `message`)
    /// and formatted with `parameters` if present: `{0}`-like placeholders are
    /// replaced by parameter values.
    pub fn error_message(&self) -> Option<String> {
        let message = self
            .get("msg")
            .or_else(|| self.get("message"))
            .and_then(Value::as_const)?;

        let params = self
            .get("parameters")
            .and_then(Value::as_list)
            .map(|values| {
                values
                    .into_iter()
                    .map(|v| v.as_const().unwrap_or_default().to_string())
                    .collect::<Vec<_>>()
            });

        Some(match params {
            None => message.to_string(),
            Some(params) => params
                .iter()
                .enumerate()
                .fold(message.to_string(), |msg, (i, p)| {
                    msg.replace(&format!("{{{i}}}"), p)
                }),
        })
    }
}

/// Kind of out-of-band async record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum AsyncKind {
    /// `*` - execution state change.
    #[strum(serialize = "exec")]
    Exec,
    /// `+` - progress of a slow operation.
    #[strum(serialize = "status")]
    Status,
    /// `=` - supplementary information (thread created, library loaded, etc.).
    #[strum(serialize = "notify")]
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, IntoStaticStr)]
pub enum ExecClass {
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncRecord {
    pub token: Option<Token>,
    pub kind: AsyncKind,
    /// Record class, like `stopped` or `thread-created`.
    pub class: String,
    pub results: Vec<(String, Value)>,
}

impl AsyncRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        find(&self.results, key)
    }

    pub fn get_const(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_const)
    }

    /// Return exec class for `*` records.
    pub fn exec_class(&self) -> Option<ExecClass> {
        if self.kind != AsyncKind::Exec {
            return None;
        }
        self.class.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum StreamKind {
    /// `~` - CLI console output.
    #[strum(serialize = "console")]
    Console,
    /// `@` - output of the debugged program.
    #[strum(serialize = "target")]
    Target,
    /// `&` - backend internal log.
    #[strum(serialize = "log")]
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

/// One decoded line of backend output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
    /// `(gdb)` output terminator.
    Prompt,
    /// Line that can't be decoded. Never fatal for a session.
    ParseFailure { line: String, reason: String },
}

impl Record {
    pub fn token(&self) -> Option<Token> {
        match self {
            Record::Result(r) => r.token,
            Record::Async(r) => r.token,
            _ => None,
        }
    }

    /// True for async and stream records.
    pub fn is_out_of_band(&self) -> bool {
        matches!(self, Record::Async(_) | Record::Stream(_))
    }
}
