//! Registry of live debug contexts (thread groups, threads, frames) and
//! routing of asynchronous backend events to context listeners.

use crate::error::RegistryError;
use crate::mi::{AsyncKind, AsyncRecord, ExecClass, StreamRecord, Value};
use crate::{mi_debug, muted_error};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use strum_macros::{Display, IntoStaticStr};

/// Identity of a debug context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// Thread group (inferior), like `i1`.
    Container(String),
    /// Backend global thread number.
    Thread(u32),
    /// Stack frame of a thread, level 0 is the innermost frame.
    Frame { thread: u32, level: u32 },
}

impl ContextId {
    pub fn thread(&self) -> Option<u32> {
        match self {
            ContextId::Thread(t) => Some(*t),
            ContextId::Frame { thread, .. } => Some(*thread),
            ContextId::Container(_) => None,
        }
    }

    pub fn level(&self) -> Option<u32> {
        match self {
            ContextId::Frame { level, .. } => Some(*level),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&str> {
        match self {
            ContextId::Container(g) => Some(g),
            _ => None,
        }
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextId::Container(g) => write!(f, "group {g}"),
            ContextId::Thread(t) => write!(f, "thread {t}"),
            ContextId::Frame { thread, level } => write!(f, "frame #{level} of thread {thread}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum RunState {
    #[strum(serialize = "unknown")]
    Unknown,
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "stopped")]
    Stopped,
}

/// Live debug context.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugContext {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    pub pid: Option<u32>,
    pub state: RunState,
}

impl DebugContext {
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            parent: None,
            pid: None,
            state: RunState::Unknown,
        }
    }

    pub fn with_parent(self, parent: ContextId) -> Self {
        Self {
            parent: Some(parent),
            ..self
        }
    }

    pub fn with_pid(self, pid: u32) -> Self {
        Self {
            pid: Some(pid),
            ..self
        }
    }

    pub fn with_state(self, state: RunState) -> Self {
        Self { state, ..self }
    }
}

/// Which events a listener is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextFilter {
    /// Every event, including stream output and events without context.
    All,
    /// Events of a thread group and its threads.
    Container(String),
    /// Events of a single thread.
    Thread(u32),
}

/// Receiver of asynchronous session events. Callbacks run on the session
/// thread and must not block it.
pub trait EventListener: Send {
    /// Called for every out-of-band async record that matches listener filter.
    fn on_async(&mut self, _record: &AsyncRecord) {}

    /// Called for console, target and log stream output (only for [`ContextFilter::All`]).
    fn on_stream(&mut self, _record: &StreamRecord) {}

    fn on_context_added(&mut self, _ctx: &DebugContext) {}

    fn on_context_removed(&mut self, _ctx: &DebugContext) {}

    /// Called once when the session is closed.
    fn on_disconnected(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Context an event belongs to.
#[derive(Debug, Clone, PartialEq)]
enum Scope {
    /// Event without context.
    Global,
    /// `thread-id="all"` like events.
    AllThreads,
    Container(String),
    Thread { id: u32, group: Option<String> },
}

impl Scope {
    fn matches(&self, filter: &ContextFilter) -> bool {
        match (filter, self) {
            (ContextFilter::All, _) => true,
            (_, Scope::AllThreads) => true,
            (ContextFilter::Container(g), Scope::Container(g2)) => g == g2,
            (ContextFilter::Container(g), Scope::Thread { group, .. }) => {
                group.as_deref() == Some(g.as_str())
            }
            (ContextFilter::Thread(t), Scope::Thread { id, .. }) => t == id,
            _ => false,
        }
    }

    fn concerns(&self, ctx: &ContextId) -> bool {
        match (ctx, self) {
            (ContextId::Container(g), Scope::Container(g2)) => g == g2,
            (ContextId::Container(g), Scope::Thread { group, .. }) => {
                group.as_deref() == Some(g.as_str())
            }
            (ContextId::Thread(t), Scope::Thread { id, .. }) => t == id,
            (ContextId::Frame { thread, .. }, Scope::Thread { id, .. }) => thread == id,
            _ => false,
        }
    }
}

#[derive(Debug)]
enum Notification {
    Added(DebugContext, Scope),
    Removed(DebugContext, Scope),
    Async(AsyncRecord, Scope),
    Stream(StreamRecord),
}

impl Notification {
    fn scope(&self) -> &Scope {
        match self {
            Notification::Added(_, scope)
            | Notification::Removed(_, scope)
            | Notification::Async(_, scope) => scope,
            Notification::Stream(_) => &Scope::Global,
        }
    }

    fn concerns(&self, id: &ContextId) -> bool {
        match self {
            Notification::Added(ctx, _) | Notification::Removed(ctx, _) if &ctx.id == id => true,
            _ => self.scope().concerns(id),
        }
    }
}

struct Subscription {
    filter: ContextFilter,
    listener: Box<dyn EventListener>,
}

/// Registry of live debug contexts. Owned by the session thread.
///
/// Notifications are queued and delivered to listeners by [`ContextRegistry::flush`].
/// Unregistering a context delivers queued notifications of this context first,
/// any later event about it is discarded.
/// Number of removed contexts remembered to drop their late events.
const RETIRED_CAPACITY: usize = 512;

#[derive(Default)]
pub struct ContextRegistry {
    contexts: IndexMap<ContextId, DebugContext>,
    /// Removed contexts, oldest first.
    retired: IndexSet<ContextId>,
    listeners: IndexMap<ListenerId, Subscription>,
    outbox: VecDeque<Notification>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &mut self,
        filter: ContextFilter,
        listener: Box<dyn EventListener>,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.insert_listener(id, filter, listener);
        id
    }

    pub(crate) fn insert_listener(
        &mut self,
        id: ListenerId,
        filter: ContextFilter,
        listener: Box<dyn EventListener>,
    ) {
        self.listeners.insert(id, Subscription { filter, listener });
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.shift_remove(&id).is_some()
    }

    pub fn get(&self, id: &ContextId) -> Option<&DebugContext> {
        self.contexts.get(id)
    }

    /// Snapshot of live contexts in registration order.
    pub fn contexts(&self) -> Vec<DebugContext> {
        self.contexts.values().cloned().collect()
    }

    pub fn thread_state(&self, thread: u32) -> Option<RunState> {
        self.contexts
            .get(&ContextId::Thread(thread))
            .map(|ctx| ctx.state)
    }

    fn scope_of(&self, id: &ContextId) -> Scope {
        match id {
            ContextId::Container(g) => Scope::Container(g.clone()),
            ContextId::Thread(t) | ContextId::Frame { thread: t, .. } => Scope::Thread {
                id: *t,
                group: self.group_of(*t),
            },
        }
    }

    fn group_of(&self, thread: u32) -> Option<String> {
        self.contexts
            .get(&ContextId::Thread(thread))
            .and_then(|ctx| ctx.parent.as_ref())
            .and_then(|p| p.container())
            .map(ToString::to_string)
    }

    /// Add a new context. Context with the same identity must not be alive.
    pub fn register(&mut self, ctx: DebugContext) -> Result<(), RegistryError> {
        if self.contexts.contains_key(&ctx.id) {
            return Err(RegistryError::Duplicate(ctx.id));
        }
        self.retired.shift_remove(&ctx.id);

        let scope = match (&ctx.id, &ctx.parent) {
            (ContextId::Thread(id), Some(ContextId::Container(g))) => Scope::Thread {
                id: *id,
                group: Some(g.clone()),
            },
            (id, _) => self.scope_of(id),
        };
        mi_debug!(target: "registry", "register {}", ctx.id);
        self.contexts.insert(ctx.id.clone(), ctx.clone());
        self.outbox.push_back(Notification::Added(ctx, scope));
        Ok(())
    }

    /// Remove a context and all its descendants. Queued notifications
    /// of removed contexts are delivered before removal notification.
    pub fn unregister(&mut self, id: &ContextId) -> Result<DebugContext, RegistryError> {
        if !self.contexts.contains_key(id) {
            return Err(RegistryError::NotFound(id.clone()));
        }

        self.deliver_pending_of(id);

        let children: Vec<ContextId> = self
            .contexts
            .values()
            .filter(|ctx| ctx.parent.as_ref() == Some(id))
            .map(|ctx| ctx.id.clone())
            .collect();
        for child in children {
            muted_error!(self.unregister(&child), "unregister child:");
        }

        let scope = self.scope_of(id);
        let ctx = self
            .contexts
            .shift_remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        self.retire(id.clone());
        mi_debug!(target: "registry", "unregister {id}");

        self.deliver(Notification::Removed(ctx.clone(), scope));
        Ok(ctx)
    }

    fn retire(&mut self, id: ContextId) {
        if self.retired.len() >= RETIRED_CAPACITY {
            self.retired.shift_remove_index(0);
        }
        self.retired.insert(id);
    }

    /// Update registry state by an async record and queue it for listeners.
    pub fn on_async(&mut self, record: &AsyncRecord) {
        let scope = self.record_scope(record);

        let retired = match &scope {
            Scope::Thread { id, .. } => self.retired.contains(&ContextId::Thread(*id)),
            Scope::Container(g) => self.retired.contains(&ContextId::Container(g.clone())),
            _ => false,
        };
        let is_lifecycle = matches!(
            record.class.as_str(),
            "thread-group-added" | "thread-group-started" | "thread-created"
        );
        if retired && !is_lifecycle {
            mi_debug!(target: "registry", "drop event `{}` of removed context", record.class);
            return;
        }

        match record.kind {
            AsyncKind::Notify => self.on_notify(record, scope),
            AsyncKind::Exec => {
                self.on_exec(record);
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
            }
            AsyncKind::Status => {
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
            }
        }
    }

    /// Queue stream output for listeners.
    pub fn on_stream(&mut self, record: &StreamRecord) {
        self.outbox.push_back(Notification::Stream(record.clone()));
    }

    fn on_notify(&mut self, record: &AsyncRecord, scope: Scope) {
        let group_id = || record.get_const("id").map(ToString::to_string);
        let thread_id = || record.get_const("id").and_then(|id| id.parse::<u32>().ok());

        match record.class.as_str() {
            "thread-group-added" | "thread-group-started" | "thread-group-created" => {
                let Some(group) = group_id() else {
                    self.outbox
                        .push_back(Notification::Async(record.clone(), scope));
                    return;
                };
                let pid = record.get_const("pid").and_then(|p| p.parse::<u32>().ok());
                let id = ContextId::Container(group);
                match self.contexts.get_mut(&id) {
                    Some(ctx) => {
                        if pid.is_some() {
                            ctx.pid = pid;
                            ctx.state = RunState::Running;
                        }
                    }
                    None => {
                        let mut ctx = DebugContext::new(id);
                        if let Some(pid) = pid {
                            ctx = ctx.with_pid(pid).with_state(RunState::Running);
                        }
                        muted_error!(self.register(ctx));
                    }
                }
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
            }
            "thread-group-exited" | "thread-group-removed" => {
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
                if let Some(group) = group_id() {
                    let id = ContextId::Container(group);
                    if self.contexts.contains_key(&id) {
                        muted_error!(self.unregister(&id));
                    }
                }
            }
            "thread-created" => {
                let Some(thread) = thread_id() else {
                    self.outbox
                        .push_back(Notification::Async(record.clone(), scope));
                    return;
                };
                let mut ctx = DebugContext::new(ContextId::Thread(thread))
                    .with_state(RunState::Running);
                if let Some(group) = record.get_const("group-id") {
                    ctx = ctx.with_parent(ContextId::Container(group.to_string()));
                }
                muted_error!(self.register(ctx));
                let scope = self.scope_of(&ContextId::Thread(thread));
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
            }
            "thread-exited" => {
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
                if let Some(thread) = thread_id() {
                    let id = ContextId::Thread(thread);
                    if self.contexts.contains_key(&id) {
                        muted_error!(self.unregister(&id));
                    }
                }
            }
            _ => {
                self.outbox
                    .push_back(Notification::Async(record.clone(), scope));
            }
        }
    }

    fn on_exec(&mut self, record: &AsyncRecord) {
        let Some(class) = record.exec_class() else {
            return;
        };
        let state = match class {
            ExecClass::Running => RunState::Running,
            ExecClass::Stopped => RunState::Stopped,
        };

        let threads: Option<Vec<u32>> = match class {
            ExecClass::Running => thread_list(record.get("thread-id")),
            ExecClass::Stopped => match record.get("stopped-threads") {
                Some(v) => thread_list(Some(v)),
                None => thread_list(record.get("thread-id")),
            },
        };

        let affected: Vec<u32> = match threads {
            None => self
                .contexts
                .keys()
                .filter_map(|id| match id {
                    ContextId::Thread(t) => Some(*t),
                    _ => None,
                })
                .collect(),
            Some(threads) => threads,
        };

        for thread in affected {
            let Some(ctx) = self.contexts.get_mut(&ContextId::Thread(thread)) else {
                continue;
            };
            ctx.state = state;

            // frames are not valid after resume
            if state == RunState::Running {
                let frames: Vec<ContextId> = self
                    .contexts
                    .keys()
                    .filter(|id| matches!(id, ContextId::Frame { thread: t, .. } if *t == thread))
                    .cloned()
                    .collect();
                for frame in frames {
                    muted_error!(self.unregister(&frame));
                }
            }
        }
    }

    fn record_scope(&self, record: &AsyncRecord) -> Scope {
        let thread = match record.class.as_str() {
            "thread-created" | "thread-exited" => record.get_const("id"),
            _ => record.get_const("thread-id"),
        };
        match thread {
            Some("all") => return Scope::AllThreads,
            Some(t) => {
                if let Ok(id) = t.parse::<u32>() {
                    let group = self
                        .group_of(id)
                        .or_else(|| record.get_const("group-id").map(ToString::to_string));
                    return Scope::Thread { id, group };
                }
            }
            None => {}
        }

        if record.class.starts_with("thread-group-") {
            if let Some(g) = record.get_const("id") {
                return Scope::Container(g.to_string());
            }
        }
        match record
            .get_const("group-id")
            .or_else(|| record.get_const("thread-group"))
        {
            Some(g) => Scope::Container(g.to_string()),
            None => Scope::Global,
        }
    }

    fn deliver(&mut self, notification: Notification) {
        let scope = notification.scope().clone();
        for sub in self.listeners.values_mut() {
            if !scope.matches(&sub.filter) {
                continue;
            }
            let listener = sub.listener.as_mut();
            match &notification {
                Notification::Added(ctx, _) => listener.on_context_added(ctx),
                Notification::Removed(ctx, _) => listener.on_context_removed(ctx),
                Notification::Async(record, _) => listener.on_async(record),
                Notification::Stream(record) => listener.on_stream(record),
            }
        }
    }

    fn deliver_pending_of(&mut self, id: &ContextId) {
        let (own, rest): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.outbox)
            .into_iter()
            .partition(|n| n.concerns(id));
        self.outbox = rest;
        for notification in own {
            self.deliver(notification);
        }
    }

    /// Deliver all queued notifications.
    pub fn flush(&mut self) {
        while let Some(notification) = self.outbox.pop_front() {
            self.deliver(notification);
        }
    }

    /// Deliver queued notifications and report session end to every listener.
    pub fn disconnect(&mut self) {
        self.flush();
        for sub in self.listeners.values_mut() {
            sub.listener.on_disconnected();
        }
    }
}

/// `None` means "all threads".
fn thread_list(value: Option<&Value>) -> Option<Vec<u32>> {
    match value? {
        Value::Const(s) if s == "all" => None,
        Value::Const(s) => Some(s.parse::<u32>().into_iter().collect()),
        v => Some(
            v.as_list()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| v.as_const()?.parse::<u32>().ok())
                .collect(),
        ),
    }
}
