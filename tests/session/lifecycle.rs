use crate::common::{split_token, start, wait_until, Recorder, TIMEOUT};
use micontrol::{
    Command, CommandError, CommandHandle, ContextFilter, Error, EventListener,
};
use micontrol::mi::AsyncRecord;
use std::collections::HashMap;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_shutdown() {
    let (session, backend) = start();
    let recorder = Recorder::default();
    session.add_listener(ContextFilter::All, recorder.clone());

    let pending = session.submit(Command::mi("exec-continue")).unwrap();
    backend.expect_command("-exec-continue");

    session.shutdown();
    assert!(session.is_closed());
    assert!(matches!(
        pending.wait(),
        Err(Error::Command(CommandError::Disconnected))
    ));
    assert!(matches!(
        session.submit(Command::mi("exec-run")),
        Err(Error::SessionClosed)
    ));
    assert!(matches!(
        session.query(|view| view.pending()),
        Err(Error::SessionClosed)
    ));
    assert_eq!(recorder.events(), vec!["disconnected"]);

    // second shutdown is a no-op
    session.shutdown();
    backend.expect_eof();
}

#[test]
fn test_backend_eof() {
    let (session, mut backend) = start();
    let recorder = Recorder::default();
    session.add_listener(ContextFilter::Thread(1), recorder.clone());

    let pending = session.submit(Command::mi("exec-finish")).unwrap();
    backend.expect_command("-exec-finish");
    backend.close();

    assert!(matches!(
        pending.wait_timeout(TIMEOUT),
        Err(Error::Command(CommandError::Disconnected))
    ));
    assert!(wait_until(|| session.is_closed()));
    assert!(wait_until(|| recorder.events() == vec!["disconnected"]));
    assert!(session.submit(Command::mi("exec-run")).is_err());
}

#[test]
fn test_timeout_keeps_command_pending() {
    let (session, mut backend) = start();

    let cmd = session.submit(Command::mi("break-list")).unwrap();
    let token = backend.expect_command("-break-list");
    assert!(matches!(
        cmd.wait_timeout(std::time::Duration::from_millis(50)),
        Err(Error::Timeout)
    ));
    backend.send(&format!("{token}^done"));
    assert!(cmd.wait().is_ok());
}

struct BlockingListener {
    handle: Mutex<Option<CommandHandle>>,
    result: Sender<Result<(), Error>>,
}

impl EventListener for BlockingListener {
    fn on_async(&mut self, _: &AsyncRecord) {
        if let Some(h) = self.handle.lock().unwrap().take() {
            _ = self.result.send(h.wait_timeout(TIMEOUT).map(|_| ()));
        }
    }
}

#[test]
fn test_wait_on_session_thread_is_rejected() {
    let (session, mut backend) = start();

    let cmd = session.submit(Command::mi("exec-run")).unwrap();
    let token = backend.expect_command("-exec-run");
    let (tx, rx) = channel();
    session.add_listener(
        ContextFilter::All,
        BlockingListener {
            handle: Mutex::new(Some(cmd)),
            result: tx,
        },
    );

    backend.send(r#"=thread-group-added,id="i1""#);
    assert!(matches!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Err(Error::WouldDeadlock)
    ));
    backend.send(&format!("{token}^running"));
}

#[test]
fn test_completions_fire_once_under_concurrency() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;

    let (session, mut backend) = start();
    let fired: Arc<Mutex<HashMap<(usize, usize), Vec<bool>>>> = Arc::default();

    thread::scope(|s| {
        s.spawn(move || {
            for _ in 0..THREADS * PER_THREAD {
                let line = backend.expect_line();
                let (token, _) = split_token(&line);
                backend.send(&format!("{}^done", token.unwrap()));
            }
        });

        for t in 0..THREADS {
            let session = &session;
            let fired = fired.clone();
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let fired = fired.clone();
                    let cmd = Command::mi("data-evaluate-expression").arg(format!("{t}*{i}"));
                    session
                        .submit_with(cmd, move |res| {
                            fired.lock().unwrap().entry((t, i)).or_default().push(res.is_ok());
                        })
                        .unwrap();
                }
            });
        }
    });

    assert!(wait_until(|| fired.lock().unwrap().len() == THREADS * PER_THREAD));
    assert!(fired
        .lock()
        .unwrap()
        .values()
        .all(|results| results == &[true]));
}

#[test]
fn test_terminate() {
    let (session, mut backend) = start();

    thread::scope(|s| {
        s.spawn(|| session.terminate(TIMEOUT));
        let token = backend.expect_command("-gdb-exit");
        backend.send(&format!("{token}^exit"));
        backend.expect_eof();
    });
    assert!(session.is_closed());
}
