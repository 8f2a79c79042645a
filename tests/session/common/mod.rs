use micontrol::{Command, EventListener, Session, SessionConfig};
use micontrol::mi::{AsyncRecord, StreamRecord};
use micontrol::DebugContext;
use os_pipe::PipeWriter;
use std::io::{BufRead, BufReader, Write};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(200);

/// Scripted MI backend connected to a session with pipes.
pub struct FakeBackend {
    input: Receiver<String>,
    output: Option<PipeWriter>,
}

impl FakeBackend {
    /// Next line written by the session, without trailing newline.
    pub fn expect_line(&self) -> String {
        match self.input.recv_timeout(TIMEOUT) {
            Ok(line) => line,
            Err(e) => panic!("no line from session: {e}"),
        }
    }

    /// Assert that the session writes nothing for a while.
    pub fn expect_silence(&self) {
        match self.input.recv_timeout(QUIET) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(line) => panic!("unexpected line: {line}"),
            Err(RecvTimeoutError::Disconnected) => panic!("session input closed"),
        }
    }

    /// Assert that the session closes backend input.
    pub fn expect_eof(&self) {
        loop {
            match self.input.recv_timeout(TIMEOUT) {
                Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => panic!("session input is still open"),
                Ok(_) => {}
            }
        }
    }

    /// Expect a tokenized MI line `{token}{expected}` and return the token.
    pub fn expect_command(&self, expected: &str) -> u32 {
        let line = self.expect_line();
        let (token, rest) = split_token(&line);
        assert_eq!(rest, expected, "line: {line}");
        token.unwrap_or_else(|| panic!("line without token: {line}"))
    }

    pub fn send(&mut self, line: &str) {
        let out = self.output.as_mut().expect("backend output closed");
        out.write_all(line.as_bytes()).unwrap();
        out.write_all(b"\n").unwrap();
        out.flush().unwrap();
    }

    /// Answer `-gdb-version` with a banner, and `-list-features` if asked.
    pub fn answer_version(&mut self, banner: &str, features: Option<&str>) {
        let token = self.expect_command("-gdb-version");
        self.send(&format!(r#"~"{banner}\n""#));
        self.send(r#"~"Copyright (C) 2022 Free Software Foundation, Inc.\n""#);
        self.send(&format!("{token}^done"));
        self.send("(gdb)");
        if let Some(features) = features {
            let token = self.expect_command("-list-features");
            self.send(&format!("{token}^done,features=[{features}]"));
            self.send("(gdb)");
        }
    }

    /// Close backend output, session sees EOF.
    pub fn close(&mut self) {
        self.output.take();
    }
}

pub fn split_token(line: &str) -> (Option<u32>, &str) {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    let token = line[..digits].parse().ok();
    (token, &line[digits..])
}

pub fn start() -> (Session, FakeBackend) {
    start_with(SessionConfig::default())
}

pub fn start_with(config: SessionConfig) -> (Session, FakeBackend) {
    let (out_reader, out_writer) = os_pipe::pipe().unwrap();
    let (in_reader, in_writer) = os_pipe::pipe().unwrap();

    let session = Session::start(out_reader, in_writer, config).unwrap();

    let (tx, rx) = channel();
    thread::spawn(move || {
        let mut lines = BufReader::new(in_reader);
        loop {
            let mut line = String::new();
            match lines.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {
                    if tx.send(line.trim_end().to_string()).is_err() {
                        return;
                    }
                }
            }
        }
    });

    (
        session,
        FakeBackend {
            input: rx,
            output: Some(out_writer),
        },
    )
}

/// Negotiate a session with a backend that answers with `banner`.
pub fn negotiate(session: &Session, backend: &mut FakeBackend, banner: &str, features: Option<&str>) {
    thread::scope(|s| {
        let h = s.spawn(|| session.negotiate(TIMEOUT));
        backend.answer_version(banner, features);
        h.join().unwrap().unwrap();
    });
}

/// Round trip a command, every line sent by the backend before is processed after it.
pub fn sync(session: &Session, backend: &mut FakeBackend) {
    let ping = session
        .submit(Command::mi("gdb-show").arg("version"))
        .unwrap();
    let token = backend.expect_command("-gdb-show version");
    backend.send(&format!(r#"{token}^done,value="12.1""#));
    ping.wait().unwrap();
}

/// Poll `cond` until it holds or timeout expires.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Listener that records every event as a string.
#[derive(Clone, Default)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl EventListener for Recorder {
    fn on_async(&mut self, record: &AsyncRecord) {
        self.events.lock().unwrap().push(record.class.clone());
    }

    fn on_stream(&mut self, record: &StreamRecord) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}: {}", record.kind, record.text.trim_end()));
    }

    fn on_context_added(&mut self, ctx: &DebugContext) {
        self.events.lock().unwrap().push(format!("+{}", ctx.id));
    }

    fn on_context_removed(&mut self, ctx: &DebugContext) {
        self.events.lock().unwrap().push(format!("-{}", ctx.id));
    }

    fn on_disconnected(&mut self) {
        self.events.lock().unwrap().push("disconnected".to_string());
    }
}
