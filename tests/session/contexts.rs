use crate::common::{start, sync, Recorder};
use micontrol::{ContextFilter, ContextId, RunState};

#[test]
fn test_thread_state_tracking() {
    let (session, mut backend) = start();
    let recorder = Recorder::default();
    session.add_listener(ContextFilter::Container("i1".to_string()), recorder.clone());

    backend.send(r#"=thread-group-started,id="i1",pid="4242""#);
    backend.send(r#"=thread-created,id="1",group-id="i1""#);
    backend.send(r#"=thread-created,id="2",group-id="i1""#);
    backend.send(r#"*running,thread-id="all""#);
    backend.send(r#"*stopped,reason="breakpoint-hit",thread-id="1",stopped-threads="all""#);
    sync(&session, &mut backend);

    let (contexts, t1, t2) = session
        .query(|view| (view.contexts(), view.thread_state(1), view.thread_state(2)))
        .unwrap();
    assert_eq!(contexts.len(), 3);
    assert_eq!(contexts[0].id, ContextId::Container("i1".to_string()));
    assert_eq!(contexts[0].pid, Some(4242));
    assert_eq!(
        contexts[1].parent,
        Some(ContextId::Container("i1".to_string()))
    );
    assert_eq!(t1, Some(RunState::Stopped));
    assert_eq!(t2, Some(RunState::Stopped));

    backend.send(r#"=thread-exited,id="2",group-id="i1""#);
    backend.send(r#"*stopped,thread-id="2""#);
    sync(&session, &mut backend);

    assert_eq!(session.query(|view| view.thread_state(2)).unwrap(), None);
    assert_eq!(
        recorder.events(),
        vec![
            "+group i1",
            "thread-group-started",
            "+thread 1",
            "thread-created",
            "+thread 2",
            "thread-created",
            "running",
            "stopped",
            "thread-exited",
            "-thread 2",
        ]
    );
}

#[test]
fn test_listener_filters() {
    let (session, mut backend) = start();
    let all = Recorder::default();
    let thread = Recorder::default();
    session.add_listener(ContextFilter::All, all.clone());
    let thread_listener = session.add_listener(ContextFilter::Thread(7), thread.clone());

    backend.send(r#"=thread-created,id="7",group-id="i1""#);
    backend.send(r#"=thread-created,id="8",group-id="i1""#);
    backend.send(r#"@"program output\n""#);
    backend.send(r#"*stopped,thread-id="8""#);
    sync(&session, &mut backend);

    session.remove_listener(thread_listener);
    backend.send(r#"*running,thread-id="7""#);
    sync(&session, &mut backend);

    assert_eq!(thread.events(), vec!["+thread 7", "thread-created"]);
    assert_eq!(
        all.events(),
        vec![
            "+thread 7",
            "thread-created",
            "+thread 8",
            "thread-created",
            "target: program output",
            "stopped",
            "running",
        ]
    );
}

#[test]
fn test_execute_on_session_thread() {
    let (session, _backend) = start();
    let (tx, rx) = std::sync::mpsc::channel();
    session
        .execute(move |view| {
            let name = std::thread::current().name().map(String::from);
            tx.send((name, view.pending(), view.is_closed())).unwrap();
        })
        .unwrap();
    let (name, pending, closed) = rx.recv().unwrap();
    assert_eq!(name.as_deref(), Some("mi-session"));
    assert_eq!(pending, 0);
    assert!(!closed);
}
