//! MI input side: commands and their wire representation.

use super::cstring;
use super::output::Token;
use super::parser::{c_string, identifier, token, Extra};
use super::ParseError;
use crate::context::ContextId;
use chumsky::prelude::*;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// MI command, like `-exec-run`.
    Mi,
    /// CLI command executed through the console interpreter.
    Cli,
    /// Line written verbatim, without a token. Backend never answers it with a result record.
    Raw,
}

/// Input syntax accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Backend understands `--thread` and `--frame` options.
    pub thread_frame_options: bool,
    /// Backend understands `-interpreter-exec console`.
    pub console_interpreter: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            thread_frame_options: true,
            console_interpreter: true,
        }
    }
}

/// Single request to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    /// Operation name without leading dash, or CLI text, or raw line.
    operation: String,
    args: Vec<String>,
    context: Option<ContextId>,
    coalesce_key: Option<String>,
}

impl Command {
    /// Create MI command. Leading dash in `operation` is optional.
    pub fn mi(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let operation = match operation.strip_prefix('-') {
            Some(op) => op.to_string(),
            None => operation,
        };
        Self::new(CommandKind::Mi, operation)
    }

    /// Create console (CLI) command.
    pub fn cli(text: impl Into<String>) -> Self {
        Self::new(CommandKind::Cli, text.into())
    }

    /// Create command written as is.
    pub fn raw(line: impl Into<String>) -> Self {
        Self::new(CommandKind::Raw, line.into())
    }

    fn new(kind: CommandKind, operation: String) -> Self {
        Self {
            kind,
            operation,
            args: vec![],
            context: None,
            coalesce_key: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set debug context (thread or frame) the command applies to.
    pub fn context(mut self, ctx: ContextId) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Allow merging with a pending command that has the same key.
    /// Use it only for commands without side effects.
    pub fn coalesce(mut self, key: impl Into<String>) -> Self {
        self.coalesce_key = Some(key.into());
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn target(&self) -> Option<&ContextId> {
        self.context.as_ref()
    }

    pub fn coalesce_key(&self) -> Option<&str> {
        self.coalesce_key.as_deref()
    }

    /// Render command into a wire line (with trailing `\n`) for the most recent backend syntax.
    pub fn serialize(&self, token: Option<Token>) -> String {
        self.serialize_with(token, Dialect::default())
    }

    /// Render command into a wire line (with trailing `\n`).
    pub fn serialize_with(&self, token: Option<Token>, dialect: Dialect) -> String {
        let token = token.map(|t| t.to_string()).unwrap_or_default();

        let mut line = match self.kind {
            CommandKind::Raw => self.operation.clone(),
            CommandKind::Cli if !dialect.console_interpreter => {
                format!("{token}{}", self.operation)
            }
            CommandKind::Cli => {
                let mut line = format!("{token}-interpreter-exec");
                self.push_context_options(&mut line, dialect);
                line.push_str(" console ");
                line.push_str(&cstring::quote(&self.operation));
                line
            }
            CommandKind::Mi => {
                let mut line = format!("{token}-{}", self.operation);
                self.push_context_options(&mut line, dialect);
                for arg in &self.args {
                    line.push(' ');
                    line.push_str(&render_arg(arg));
                }
                line
            }
        };
        line.push('\n');
        line
    }

    fn push_context_options(&self, line: &mut String, dialect: Dialect) {
        if !dialect.thread_frame_options {
            return;
        }
        if let Some(thread) = self.context.as_ref().and_then(ContextId::thread) {
            line.push_str(&format!(" --thread {thread}"));
        }
        if let Some(level) = self.context.as_ref().and_then(ContextId::level) {
            line.push_str(&format!(" --frame {level}"));
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.serialize(None).trim_end())
    }
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\' || c.is_control())
}

fn render_arg(arg: &str) -> String {
    if needs_quoting(arg) {
        cstring::quote(arg)
    } else {
        arg.to_string()
    }
}

fn command_line<'a>() -> impl Parser<'a, &'a str, (Option<Token>, Command), Extra<'a>> {
    let bare = any()
        .filter(|c: &char| !c.is_whitespace() && *c != '"')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(ToString::to_string);
    let arg = c_string().or(bare).padded();

    let mi = token()
        .then_ignore(just('-'))
        .then(identifier())
        .then(arg.repeated().collect::<Vec<_>>())
        .map(|((token, op), args)| (token, Command::mi(op).args(args)));

    let cli = token()
        .then(
            any()
                .filter(|c: &char| *c != '-')
                .then(any().repeated())
                .to_slice(),
        )
        .map(|(token, text): (Option<Token>, &str)| (token, Command::cli(text)));

    mi.or(cli).then_ignore(end())
}

/// Decode MI input line. Inverse of [`Command::serialize`]: recovers token,
/// operation, `--thread`/`--frame` options and arguments. Console commands
/// written through `-interpreter-exec console` are recovered as CLI commands.
pub fn parse_command_line(line: &str) -> Result<(Option<Token>, Command), ParseError> {
    let line = line.trim_end();
    let (token, mut command) = command_line()
        .parse(line)
        .into_result()
        .map_err(|errs| match errs.first() {
            Some(e) => ParseError::Syntax(e.to_string()),
            None => ParseError::Syntax("unknown syntax error".to_string()),
        })?;

    if command.kind != CommandKind::Mi {
        return Ok((token, command));
    }

    let mut thread = None;
    let mut frame = None;
    loop {
        let value = command.args.get(1).and_then(|v| v.parse::<u32>().ok());
        match (command.args.first().map(String::as_str), value) {
            (Some("--thread"), Some(v)) => thread = Some(v),
            (Some("--frame"), Some(v)) => frame = Some(v),
            _ => break,
        }
        command.args.drain(..2);
    }

    command.context = match (thread, frame) {
        (None, None) => None,
        (Some(thread), None) => Some(ContextId::Thread(thread)),
        (Some(thread), Some(level)) => Some(ContextId::Frame { thread, level }),
        (None, Some(_)) => return Err(ParseError::FrameWithoutThread),
    };

    if command.operation == "interpreter-exec"
        && command.args.len() == 2
        && command.args[0] == "console"
    {
        let text = command.args.remove(1);
        let mut cli = Command::cli(text);
        cli.context = command.context;
        return Ok((token, cli));
    }

    Ok((token, command))
}
