//! Interactive MI console of `mictl`.

pub mod print;

use crate::console::print::style::{ContextView, ErrorView, TargetOutputView};
use crate::console::print::{render_async, render_results, ExternalPrinter};
use crate::context::{ContextFilter, DebugContext, EventListener, RunState};
use crate::control::{CommandOutput, Session};
use crate::error::Error;
use crate::factory::Operation;
use crate::mi::{parse_command_line, AsyncRecord, Command, StreamKind, StreamRecord};
use crate::version::Version;
use crate::{version_switch, weak_error};
use rustyline::error::ReadlineError;
use rustyline::history::MemHistory;
use rustyline::{Config, Editor};
use std::sync::Arc;
use std::time::Duration;

const PROMPT: &str = "(mi) ";

/// Prints session events.
struct EventPrinter {
    printer: ExternalPrinter,
}

impl EventListener for EventPrinter {
    fn on_async(&mut self, record: &AsyncRecord) {
        self.printer.println(render_async(record));
    }

    fn on_stream(&mut self, record: &StreamRecord) {
        match record.kind {
            StreamKind::Console => self.printer.print(&record.text),
            StreamKind::Target => self.printer.print(TargetOutputView::from(&record.text)),
            StreamKind::Log => self.printer.print(ErrorView::from(&record.text)),
        }
    }

    fn on_context_added(&mut self, ctx: &DebugContext) {
        self.printer
            .println(format!("[{} added]", ContextView::from(&ctx.id)));
    }

    fn on_context_removed(&mut self, ctx: &DebugContext) {
        self.printer
            .println(format!("[{} removed]", ContextView::from(&ctx.id)));
    }

    fn on_disconnected(&mut self) {
        self.printer.println(ErrorView::from("backend disconnected"));
    }
}

pub struct ConsoleApp {
    session: Arc<Session>,
    timeout: Duration,
}

impl ConsoleApp {
    pub fn new(session: Arc<Session>, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    pub fn run(self) -> anyhow::Result<()> {
        let config = Config::builder().history_ignore_space(true).build();
        let mut editor: Editor<(), MemHistory> =
            Editor::with_history(config, MemHistory::new())?;

        let events = ExternalPrinter::new(&mut editor)?;
        self.session
            .add_listener(ContextFilter::All, EventPrinter { printer: events });
        let printer = ExternalPrinter::new(&mut editor)?;

        self.enable_async();
        {
            let session = self.session.clone();
            ctrlc::set_handler(move || interrupt(&session))?;
        }

        // library logs break the prompt, keep them only when asked for explicitly
        let mute_logs = std::env::var_os("RUST_LOG").is_none();
        if mute_logs {
            crate::log::disable();
        }

        loop {
            match editor.readline(PROMPT) {
                Ok(input) => {
                    let input = input.trim();
                    if input.is_empty() {
                        continue;
                    }
                    if input == "q" || input == "quit" {
                        break;
                    }
                    _ = editor.add_history_entry(input);

                    match self.handle_line(input) {
                        Ok(output) => print_output(&printer, &output),
                        Err(e) => {
                            printer.println(ErrorView::from(format!("error: {e:#}")));
                            if e.is_fatal() {
                                break;
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) if self.is_running() => {
                    interrupt(&self.session);
                }
                Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
                Err(err) => {
                    printer.println(ErrorView::from(format!("error: {err:#}")));
                    break;
                }
            }
        }

        if mute_logs {
            crate::log::enable();
        }
        self.session.terminate(self.timeout);
        Ok(())
    }

    /// Let the backend accept commands while the debugee is running.
    fn enable_async(&self) {
        let Some(version) = self.session.backend().map(|b| b.version) else {
            return;
        };
        let name = version_switch!(
            version,
            (7, 0, 0) ..= Version((7, 7, u32::MAX)) => "target-async",
            (7, 8, 0) ..= Version((u32::MAX, u32::MAX, u32::MAX)) => "mi-async",
        );
        let Some(name) = name else {
            return;
        };
        let set = Operation::GdbSet {
            name: name.to_string(),
            value: "on".to_string(),
        };
        _ = weak_error!(self
            .session
            .request(&set, None)
            .and_then(|h| h.wait_timeout(self.timeout)));
    }

    fn is_running(&self) -> bool {
        self.session
            .query(|view| {
                view.contexts()
                    .iter()
                    .any(|ctx| ctx.state == RunState::Running)
            })
            .unwrap_or_default()
    }

    fn handle_line(&self, line: &str) -> Result<CommandOutput, Error> {
        let command = if line.starts_with('-') || line.starts_with(|c: char| c.is_ascii_digit()) {
            // user tokens are replaced by session tokens
            let (_, command) = parse_command_line(line)?;
            command
        } else {
            Command::cli(line)
        };
        self.session.submit(command)?.wait_timeout(self.timeout)
    }
}

fn interrupt(session: &Session) {
    let op = Operation::ExecInterrupt { all: false };
    _ = weak_error!(session.request(&op, None), "interrupt:");
}

fn print_output(printer: &ExternalPrinter, output: &CommandOutput) {
    let class = output.class;
    if output.results.is_empty() {
        printer.println(format!("^{class}"));
    } else {
        printer.println(format!("^{class}\n{}", render_results(&output.results)));
    }
}
