use crate::config::SessionConfig;
use crate::context::{ContextFilter, ContextId, EventListener, ListenerId};
use crate::control::completion::{CommandId, CommandOutput, CommandResult, Completion};
use crate::control::executor::{Executor, Request, SessionView};
use crate::control::observer::CommandObserver;
use crate::error::{Error, Result};
use crate::factory::{BackendInfo, CommandFactory, Operation};
use crate::mi::{Command, Value};
use crate::trace::MiTracer;
use crate::version::Version;
use crate::{mi_debug, mi_info, mi_warn};
use std::cell::OnceCell;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, SendError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Connection to a single MI backend.
///
/// All writes to the backend, result correlation and listener callbacks happen
/// on a dedicated session thread, in the order requests were accepted.
/// Session methods are safe to call from any thread.
pub struct Session {
    requests: Sender<Request>,
    factory: CommandFactory,
    config: SessionConfig,
    closed: Arc<AtomicBool>,
    session_thread: ThreadId,
    executor: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start a session over backend output `reader` and backend input `writer`.
    pub fn start<R, W>(reader: R, writer: W, config: SessionConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::start_with(reader, writer, config, MiTracer::new())
    }

    /// Start a session with custom MI traffic tracer.
    pub fn start_with<R, W>(
        reader: R,
        writer: W,
        config: SessionConfig,
        tracer: MiTracer,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (requests, rx) = channel();
        let closed = Arc::new(AtomicBool::new(false));
        let factory = CommandFactory::new();

        let executor = Executor::new(
            Box::new(writer),
            config.max_in_flight,
            config.oob_history,
            factory.clone(),
            tracer,
            closed.clone(),
        );
        let handle = thread::Builder::new()
            .name("mi-session".to_string())
            .spawn(move || executor.run(rx))?;
        let session_thread = handle.thread().id();

        let lines = requests.clone();
        thread::Builder::new()
            .name("mi-reader".to_string())
            .spawn(move || read_lines(reader, lines))?;

        Ok(Self {
            requests,
            factory,
            config,
            closed,
            session_thread,
            executor: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn factory(&self) -> &CommandFactory {
        &self.factory
    }

    /// Negotiated backend, `None` before [`Session::negotiate`].
    pub fn backend(&self) -> Option<&BackendInfo> {
        self.factory.backend()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_session_thread(&self) -> bool {
        thread::current().id() == self.session_thread
    }

    fn send(&self, req: Request) -> Result<()> {
        self.requests.send(req).map_err(|_| Error::SessionClosed)
    }

    /// Submit a command, the result is delivered through returned handle.
    pub fn submit(&self, command: Command) -> Result<CommandHandle> {
        let (tx, rx) = channel();
        let id = self.submit_with(command, move |res| {
            _ = tx.send(res);
        })?;
        Ok(CommandHandle {
            id,
            rx,
            result: OnceCell::new(),
            requests: self.requests.clone(),
            session_thread: self.session_thread,
        })
    }

    /// Submit a command, `callback` is called on the session thread exactly once.
    pub fn submit_with<F>(&self, command: Command, callback: F) -> Result<CommandId>
    where
        F: FnOnce(CommandResult) + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let id = CommandId::next();
        let req = Request::Submit {
            id,
            command,
            completion: Completion::new(callback),
        };
        if let Err(SendError(req)) = self.requests.send(req) {
            // rejected request must not fire its completion
            if let Request::Submit { completion, .. } = req {
                completion.disarm();
            }
            return Err(Error::SessionClosed);
        }
        Ok(id)
    }

    /// Build a command for the negotiated backend and submit it.
    pub fn request(
        &self,
        operation: &Operation,
        context: Option<ContextId>,
    ) -> Result<CommandHandle> {
        let command = self.factory.create(operation, context)?;
        self.submit(command)
    }

    pub fn add_listener(
        &self,
        filter: ContextFilter,
        listener: impl EventListener + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        _ = self.send(Request::AddListener {
            id,
            filter,
            listener: Box::new(listener),
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        _ = self.send(Request::RemoveListener(id));
    }

    pub fn add_observer(&self, observer: impl CommandObserver + 'static) {
        _ = self.send(Request::AddObserver(Box::new(observer)));
    }

    /// Run `task` on the session thread.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&SessionView<'_>) + Send + 'static,
    {
        self.send(Request::Task(Box::new(task)))
    }

    /// Run `f` on the session thread and wait for its result.
    pub fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SessionView<'_>) -> T + Send + 'static,
    {
        if self.on_session_thread() {
            return Err(Error::WouldDeadlock);
        }
        let (tx, rx) = channel();
        self.execute(move |view| {
            _ = tx.send(f(view));
        })?;
        rx.recv().map_err(|_| Error::SessionClosed)
    }

    /// Detect backend version and features. Commands other than the version
    /// probe can be built by the session factory only after negotiation.
    pub fn negotiate(&self, timeout: Duration) -> Result<BackendInfo> {
        if let Some(info) = self.factory.backend() {
            return Ok(info.clone());
        }

        let banner = self
            .request(&Operation::GdbVersion, None)?
            .wait_timeout(timeout)?
            .console_text();
        let version = Version::gdb_parse(&banner).ok_or_else(|| {
            Error::VersionNotDetected(banner.lines().next().unwrap_or_default().to_string())
        })?;

        let mut info = BackendInfo::new(version);
        if version >= Version::new(7, 2, 0) {
            let command = CommandFactory::create_for(&Operation::ListFeatures, None, version)?;
            match self.submit(command)?.wait_timeout(timeout) {
                Ok(output) => info.features = features(&output),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => mi_warn!(target: "factory", "list features: {e}"),
            }
        }

        let (tx, rx) = channel();
        self.send(Request::Internal(Box::new(move |exec: &mut Executor| {
            exec.set_backend(info);
            _ = tx.send(());
        })))?;
        rx.recv().map_err(|_| Error::SessionClosed)?;

        self.factory.backend().cloned().ok_or(Error::SessionClosed)
    }

    /// Ask the backend to exit, then shutdown the session.
    pub fn terminate(&self, timeout: Duration) {
        if !self.is_closed() {
            let version = self
                .factory
                .backend()
                .map(|info| info.version)
                .unwrap_or_default();
            let exit = CommandFactory::create_for(&Operation::GdbExit, None, version)
                .map_err(Error::from)
                .and_then(|cmd| self.submit(cmd))
                .and_then(|handle| handle.wait_timeout(timeout));
            if let Err(e) = exit {
                mi_debug!(target: "session", "gdb exit: {e}");
            }
        }
        self.shutdown();
    }

    /// Cancel every pending command with [`crate::error::CommandError::Disconnected`],
    /// close the backend input and stop the session thread.
    pub fn shutdown(&self) {
        let handle = match self.executor.lock() {
            Ok(mut h) => h.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        let (ack_tx, ack_rx) = channel();
        if self.send(Request::Shutdown(ack_tx)).is_err() {
            return;
        }
        // session thread can't wait for itself, request is served after current callback
        if self.on_session_thread() {
            return;
        }
        _ = ack_rx.recv();
        _ = handle.join();
        mi_info!(target: "session", "session shutdown");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn features(output: &CommandOutput) -> Vec<String> {
    output
        .get("features")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .into_iter()
        .filter_map(Value::as_const)
        .map(ToString::to_string)
        .collect()
}

fn read_lines(reader: impl Read, lines: Sender<Request>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                _ = lines.send(Request::Eof(None));
                return;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if lines.send(Request::Line(line)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                _ = lines.send(Request::Eof(Some(e)));
                return;
            }
        }
    }
}

/// Handle of a submitted command.
pub struct CommandHandle {
    id: CommandId,
    rx: Receiver<CommandResult>,
    result: OnceCell<CommandResult>,
    requests: Sender<Request>,
    session_thread: ThreadId,
}

impl CommandHandle {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Block until the command completes.
    pub fn wait(self) -> Result<CommandOutput> {
        Ok(self.fetch(None)??)
    }

    /// Block until the command completes or `timeout` expires.
    /// Command is not cancelled on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<CommandOutput> {
        Ok(self.fetch(Some(timeout))??)
    }

    /// Return command result if it is already known.
    pub fn try_result(&self) -> Option<CommandResult> {
        if let Some(res) = self.result.get() {
            return Some(res.clone());
        }
        let res = self.rx.try_recv().ok()?;
        Some(self.result.get_or_init(|| res).clone())
    }

    /// Cancel the command. Completes with [`crate::error::CommandError::Cancelled`]
    /// if the command is still pending.
    pub fn cancel(&self) {
        _ = self.requests.send(Request::Cancel(self.id));
    }

    fn fetch(&self, timeout: Option<Duration>) -> Result<CommandResult> {
        if let Some(res) = self.result.get() {
            return Ok(res.clone());
        }

        let res = match self.rx.try_recv() {
            Ok(res) => res,
            Err(TryRecvError::Disconnected) => return Err(Error::SessionClosed),
            Err(TryRecvError::Empty) => {
                if thread::current().id() == self.session_thread {
                    return Err(Error::WouldDeadlock);
                }
                match timeout {
                    None => self.rx.recv().map_err(|_| Error::SessionClosed)?,
                    Some(timeout) => match self.rx.recv_timeout(timeout) {
                        Ok(res) => res,
                        Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout),
                        Err(RecvTimeoutError::Disconnected) => return Err(Error::SessionClosed),
                    },
                }
            }
        };
        Ok(self.result.get_or_init(|| res).clone())
    }
}
