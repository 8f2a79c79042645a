//! Session thread: the only owner of the backend input stream, the pending
//! command table and the context registry.

use crate::context::{
    ContextFilter, ContextId, ContextRegistry, DebugContext, EventListener, ListenerId, RunState,
};
use crate::control::completion::{CommandId, CommandOutput, Completion};
use crate::control::correlator::{Admission, Correlator, Resolution};
use crate::control::observer::CommandObserver;
use crate::error::CommandError;
use crate::factory::{BackendInfo, CommandFactory};
use crate::mi::{parse, Command, CommandKind, Dialect, ExecClass, Record, StreamKind};
use crate::trace::{Direction, MiTracer};
use crate::{mi_debug, mi_error, mi_info, mi_warn};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

pub(crate) type Task = Box<dyn FnOnce(&SessionView<'_>) + Send>;
pub(crate) type InternalTask = Box<dyn FnOnce(&mut Executor) + Send>;

pub(crate) enum Request {
    Submit {
        id: CommandId,
        command: Command,
        completion: Completion,
    },
    Cancel(CommandId),
    /// Line of backend output.
    Line(String),
    /// Backend output is closed.
    Eof(Option<io::Error>),
    AddListener {
        id: ListenerId,
        filter: ContextFilter,
        listener: Box<dyn EventListener>,
    },
    RemoveListener(ListenerId),
    AddObserver(Box<dyn CommandObserver>),
    Task(Task),
    Internal(InternalTask),
    Shutdown(Sender<()>),
}

/// Read-only view of a session state, available to tasks executed on the session thread.
pub struct SessionView<'a> {
    exec: &'a Executor,
}

impl<'a> SessionView<'a> {
    pub fn contexts(&self) -> Vec<DebugContext> {
        self.exec.registry.contexts()
    }

    pub fn context(&self, id: &ContextId) -> Option<&DebugContext> {
        self.exec.registry.get(id)
    }

    pub fn thread_state(&self, thread: u32) -> Option<RunState> {
        self.exec.registry.thread_state(thread)
    }

    pub fn backend(&self) -> Option<&BackendInfo> {
        self.exec.factory.backend()
    }

    /// Number of commands waiting for write or result.
    pub fn pending(&self) -> usize {
        self.exec.correlator.pending()
    }

    pub fn in_flight(&self) -> usize {
        self.exec.correlator.in_flight()
    }

    pub fn is_closed(&self) -> bool {
        self.exec.is_closed()
    }
}

/// Backend selection used by the backends without `--thread` and `--frame` options.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Selection {
    thread: Option<u32>,
    frame: Option<u32>,
}

pub(crate) struct Executor {
    writer: Option<Box<dyn Write + Send>>,
    correlator: Correlator,
    registry: ContextRegistry,
    factory: CommandFactory,
    tracer: MiTracer,
    oob: VecDeque<Record>,
    oob_history: usize,
    console: Vec<String>,
    selection: Selection,
    closed: Arc<AtomicBool>,
}

impl Executor {
    pub(crate) fn new(
        writer: Box<dyn Write + Send>,
        max_in_flight: usize,
        oob_history: usize,
        factory: CommandFactory,
        tracer: MiTracer,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            writer: Some(writer),
            correlator: Correlator::new(max_in_flight),
            registry: ContextRegistry::new(),
            factory,
            tracer,
            oob: VecDeque::with_capacity(oob_history),
            oob_history,
            console: vec![],
            selection: Selection::default(),
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Serve requests until shutdown or until every request sender is gone.
    pub(crate) fn run(mut self, requests: Receiver<Request>) {
        while let Ok(req) = requests.recv() {
            if let Some(ack) = self.handle(req) {
                self.close(CommandError::Disconnected);
                while let Ok(req) = requests.try_recv() {
                    self.reject(req);
                }
                _ = ack.send(());
                return;
            }
            self.pump();
            self.registry.flush();
        }
        self.close(CommandError::Disconnected);
    }

    /// Handle a request, return shutdown acknowledge channel if shutdown requested.
    fn handle(&mut self, req: Request) -> Option<Sender<()>> {
        match req {
            Request::Submit {
                id,
                command,
                completion,
            } => {
                if self.is_closed() {
                    completion.complete(Err(CommandError::SessionClosed));
                    return None;
                }
                let admission = self.correlator.submit(id, command, completion);
                if admission == Admission::Coalesced {
                    mi_debug!(target: "session", "command {id} coalesced with a pending one");
                }
            }
            Request::Cancel(id) => {
                if !self.correlator.cancel(id) {
                    mi_debug!(target: "session", "cancel of completed command {id}");
                }
            }
            Request::Line(line) => self.on_line(&line),
            Request::Eof(err) => {
                match err {
                    None => mi_info!(target: "session", "backend output closed"),
                    Some(e) => mi_error!(target: "session", "read from backend: {e}"),
                }
                self.close(CommandError::Disconnected);
            }
            Request::AddListener {
                id,
                filter,
                listener,
            } => {
                self.registry.insert_listener(id, filter, listener);
            }
            Request::RemoveListener(id) => {
                self.registry.remove_listener(id);
            }
            Request::AddObserver(observer) => self.correlator.add_observer(observer),
            Request::Task(task) => task(&SessionView { exec: self }),
            Request::Internal(task) => task(self),
            Request::Shutdown(ack) => return Some(ack),
        }
        None
    }

    fn reject(&mut self, req: Request) {
        match req {
            Request::Submit { completion, .. } => {
                completion.complete(Err(CommandError::SessionClosed));
            }
            Request::Shutdown(ack) => {
                _ = ack.send(());
            }
            Request::Task(task) => task(&SessionView { exec: self }),
            _ => {}
        }
    }

    fn on_line(&mut self, line: &str) {
        self.tracer.line(Direction::In, line);
        if line.trim().is_empty() {
            return;
        }

        match parse(line) {
            Record::Result(record) => {
                let console = std::mem::take(&mut self.console);
                let oob = self.oob.drain(..).collect();
                if self.correlator.on_result(&record, console, oob) == Resolution::Orphaned {
                    mi_warn!(target: "session", "orphaned result record: {}", line.trim_end());
                }
            }
            Record::Async(record) => {
                if record.exec_class() == Some(ExecClass::Stopped) {
                    // backend selects the innermost frame of a stopped thread
                    let thread = record.get_const("thread-id").and_then(|t| t.parse().ok());
                    if thread.is_some() {
                        self.selection = Selection {
                            thread,
                            frame: Some(0),
                        };
                    }
                }
                self.registry.on_async(&record);
                self.remember(Record::Async(record));
            }
            Record::Stream(record) => {
                if record.kind == StreamKind::Console {
                    self.console.push(record.text.clone());
                }
                self.registry.on_stream(&record);
                self.remember(Record::Stream(record));
            }
            Record::Prompt => {}
            Record::ParseFailure { line, reason } => {
                mi_warn!(target: "session", "malformed backend line {line:?}: {reason}");
            }
        }
    }

    fn remember(&mut self, record: Record) {
        if self.oob_history == 0 {
            return;
        }
        if self.oob.len() == self.oob_history {
            self.oob.pop_front();
        }
        self.oob.push_back(record);
    }

    fn dialect(&self) -> Dialect {
        self.factory
            .backend()
            .map(BackendInfo::dialect)
            .unwrap_or_default()
    }

    /// Write queued commands while the in-flight window allows it.
    fn pump(&mut self) {
        while !self.is_closed() {
            let Some(command) = self.correlator.peek().cloned() else {
                break;
            };

            // selection commands go first on the wire, so they take tokens first
            let dialect = self.dialect();
            if !dialect.thread_frame_options {
                self.select_context(&command, dialect);
            }
            let Some((token, command)) = self.correlator.next_to_send() else {
                break;
            };
            self.track_selection(&command);

            if !self.write_line(&command.serialize_with(Some(token), dialect)) {
                break;
            }
            if command.kind() == CommandKind::Raw {
                self.correlator
                    .complete(token, Ok(CommandOutput::written()));
            }
        }
    }

    /// Make command's thread and frame current on backends that can't take
    /// them as command options. Selection is changed for stopped threads only.
    fn select_context(&mut self, command: &Command, dialect: Dialect) {
        let Some(target) = command.target() else {
            return;
        };
        let Some(thread) = target.thread() else {
            return;
        };
        if self.registry.thread_state(thread) != Some(RunState::Stopped) {
            return;
        }

        if self.selection.thread != Some(thread) {
            self.send_internal(
                Command::mi("thread-select").arg(thread.to_string()),
                dialect,
            );
            self.selection = Selection {
                thread: Some(thread),
                frame: Some(0),
            };
        }
        if let Some(level) = target.level() {
            if self.selection.frame != Some(level) {
                self.send_internal(
                    Command::mi("stack-select-frame").arg(level.to_string()),
                    dialect,
                );
                self.selection.frame = Some(level);
            }
        }
    }

    fn track_selection(&mut self, command: &Command) {
        if command.kind() != CommandKind::Mi {
            return;
        }
        let arg = command
            .arguments()
            .first()
            .and_then(|a| a.parse::<u32>().ok());
        match (command.operation(), arg) {
            ("thread-select", Some(thread)) => {
                self.selection = Selection {
                    thread: Some(thread),
                    frame: Some(0),
                }
            }
            ("stack-select-frame", Some(level)) => self.selection.frame = Some(level),
            _ => {}
        }
    }

    fn send_internal(&mut self, command: Command, dialect: Dialect) {
        let op = command.operation().to_string();
        let completion = Completion::new(move |res| {
            if let Err(e) = res {
                mi_warn!(target: "session", "-{op} failed: {e}");
            }
        });
        let token = self.correlator.send_internal(command.clone(), completion);
        self.write_line(&command.serialize_with(Some(token), dialect));
    }

    fn write_line(&mut self, line: &str) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        self.tracer.line(Direction::Out, line);

        let res = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush());
        if let Err(e) = res {
            mi_error!(target: "session", "write to backend: {e}");
            self.close(CommandError::Disconnected);
            return false;
        }
        true
    }

    pub(crate) fn set_backend(&mut self, info: BackendInfo) -> bool {
        let version = info.version;
        let set = self.factory.set_backend(info);
        if set {
            mi_info!(target: "factory", "backend version {version}");
        }
        set
    }

    /// Cancel every pending command, close the backend input and notify listeners.
    fn close(&mut self, err: CommandError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let n = self.correlator.drain(err);
        mi_debug!(target: "session", "session closed, {n} pending commands completed");
        self.writer.take();
        self.registry.disconnect();
    }
}
