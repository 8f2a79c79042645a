//! Pending command table: queueing, token assignment and correlation of
//! result records with their commands.

use crate::control::completion::{CommandId, CommandOutput, CommandResult, Completion};
use crate::control::observer::CommandObserver;
use crate::error::CommandError;
use crate::mi::{Command, Record, ResultClass, ResultRecord, Token, Value};
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Attached to a pending command with the same coalescing key.
    Coalesced,
    /// New pending entry.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Number of completed targets.
    Completed(usize),
    /// Result of a cancelled command.
    Suppressed,
    /// No pending command with this token.
    Orphaned,
}

struct Target {
    id: CommandId,
    completion: Completion,
}

struct Entry {
    command: Command,
    targets: SmallVec<[Target; 1]>,
    /// Written by the session itself, not counted in the in-flight window.
    internal: bool,
}

pub struct Correlator {
    queue: VecDeque<Entry>,
    in_flight: IndexMap<Token, Entry>,
    max_in_flight: usize,
    last_token: u32,
    observers: Vec<Box<dyn CommandObserver>>,
}

fn notify(observers: &mut [Box<dyn CommandObserver>], f: impl Fn(&mut dyn CommandObserver)) {
    for obs in observers.iter_mut() {
        f(obs.as_mut());
    }
}

impl Correlator {
    /// Create correlator that keeps at most `max_in_flight` commands on the wire.
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: IndexMap::new(),
            max_in_flight: max_in_flight.max(1),
            last_token: 0,
            observers: vec![],
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn CommandObserver>) {
        self.observers.push(observer);
    }

    /// Number of commands waiting for write or result.
    pub fn pending(&self) -> usize {
        self.queue.len() + self.in_flight.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn submit(&mut self, id: CommandId, command: Command, completion: Completion) -> Admission {
        notify(&mut self.observers, |o| o.on_queued(id, &command));

        let target = Target { id, completion };
        if let Some(key) = command.coalesce_key() {
            let same_key = self
                .in_flight
                .values_mut()
                .chain(self.queue.iter_mut())
                .find(|e| e.command.coalesce_key() == Some(key));
            if let Some(entry) = same_key {
                entry.targets.push(target);
                return Admission::Coalesced;
            }
        }

        let mut targets = SmallVec::new();
        targets.push(target);
        self.queue.push_back(Entry {
            command,
            targets,
            internal: false,
        });
        Admission::Queued
    }

    fn allocate_token(&mut self) -> Token {
        loop {
            self.last_token = match self.last_token {
                u32::MAX => 1,
                t => t + 1,
            };
            let token = Token(self.last_token);
            if !self.in_flight.contains_key(&token) {
                return token;
            }
        }
    }

    fn window_full(&self) -> bool {
        self.in_flight.values().filter(|e| !e.internal).count() >= self.max_in_flight
    }

    /// Next command to write, if the in-flight window allows it. Token is not
    /// allocated yet, so commands written before it get lower tokens.
    pub fn peek(&self) -> Option<&Command> {
        if self.window_full() {
            return None;
        }
        self.queue.front().map(|e| &e.command)
    }

    /// Take the next queued command if the in-flight window allows it.
    /// The command is considered written from now on.
    pub fn next_to_send(&mut self) -> Option<(Token, Command)> {
        if self.window_full() {
            return None;
        }
        let entry = self.queue.pop_front()?;
        let token = self.allocate_token();
        let command = entry.command.clone();
        for target in &entry.targets {
            notify(&mut self.observers, |o| o.on_sent(target.id, token, &command));
        }
        self.in_flight.insert(token, entry);
        Some((token, command))
    }

    /// Register a command that is written immediately, bypassing the queue.
    pub fn send_internal(&mut self, command: Command, completion: Completion) -> Token {
        let token = self.allocate_token();
        let id = CommandId::next();
        notify(&mut self.observers, |o| o.on_sent(id, token, &command));
        let mut targets = SmallVec::new();
        targets.push(Target { id, completion });
        self.in_flight.insert(
            token,
            Entry {
                command,
                targets,
                internal: true,
            },
        );
        token
    }

    /// Complete a command by its result record.
    pub fn on_result(
        &mut self,
        record: &ResultRecord,
        console: Vec<String>,
        oob: Vec<Record>,
    ) -> Resolution {
        let Some(token) = record.token else {
            return Resolution::Orphaned;
        };
        if !self.in_flight.contains_key(&token) {
            return Resolution::Orphaned;
        }

        let result = match record.class {
            ResultClass::Error => Err(CommandError::Backend {
                message: record
                    .error_message()
                    .unwrap_or_else(|| "unknown backend error".to_string()),
                code: record
                    .get("code")
                    .and_then(Value::as_const)
                    .map(ToString::to_string),
            }),
            class => Ok(CommandOutput {
                class,
                results: record.results.clone(),
                console,
                oob,
            }),
        };
        self.complete(token, result)
    }

    /// Complete every target of an in-flight command.
    pub fn complete(&mut self, token: Token, result: CommandResult) -> Resolution {
        let Some(entry) = self.in_flight.shift_remove(&token) else {
            return Resolution::Orphaned;
        };
        if entry.targets.is_empty() {
            return Resolution::Suppressed;
        }

        let n = entry.targets.len();
        for target in entry.targets {
            notify(&mut self.observers, |o| o.on_done(target.id, &result));
            target.completion.complete(result.clone());
        }
        Resolution::Completed(n)
    }

    /// Cancel a single completion target. Queued command without targets is
    /// never written. Result of a written command without targets is suppressed.
    pub fn cancel(&mut self, id: CommandId) -> bool {
        let position = |entry: &Entry| entry.targets.iter().position(|t| t.id == id);

        let found = self
            .queue
            .iter()
            .enumerate()
            .find_map(|(i, e)| position(e).map(|j| (i, j)));
        if let Some((i, j)) = found {
            let target = self.queue[i].targets.remove(j);
            if self.queue[i].targets.is_empty() {
                if let Some(entry) = self.queue.remove(i) {
                    notify(&mut self.observers, |o| o.on_removed(id, &entry.command));
                }
            }
            self.cancel_target(target);
            return true;
        }

        let found = self
            .in_flight
            .values_mut()
            .find_map(|e| position(&*e).map(|j| e.targets.remove(j)));
        match found {
            Some(target) => {
                self.cancel_target(target);
                true
            }
            None => false,
        }
    }

    fn cancel_target(&mut self, target: Target) {
        let result = Err(CommandError::Cancelled);
        notify(&mut self.observers, |o| o.on_done(target.id, &result));
        target.completion.complete(result);
    }

    /// Complete all pending commands with an error. Return number of completed targets.
    pub fn drain(&mut self, err: CommandError) -> usize {
        let entries: Vec<Entry> = self
            .in_flight
            .drain(..)
            .map(|(_, e)| e)
            .chain(self.queue.drain(..))
            .collect();

        let result: CommandResult = Err(err);
        let mut n = 0;
        for entry in entries {
            for target in entry.targets {
                notify(&mut self.observers, |o| o.on_done(target.id, &result));
                target.completion.complete(result.clone());
                n += 1;
            }
        }
        n
    }
}
