use crate::common::{negotiate, start, sync, TIMEOUT};
use micontrol::factory::BackendState;
use micontrol::{Command, ContextId, Error, FactoryError, Operation, Version};
use std::thread;

#[test]
fn test_negotiate_modern_backend() {
    let (session, mut backend) = start();
    assert_eq!(session.factory().state(), BackendState::NotNegotiated);
    assert!(matches!(
        session.request(&Operation::ExecRun, None),
        Err(Error::Factory(FactoryError::NotNegotiated(_)))
    ));

    negotiate(
        &session,
        &mut backend,
        "GNU gdb (GDB) 12.1",
        Some(r#""frozen-varobjs","pending-breakpoints","thread-info""#),
    );

    let info = session.backend().unwrap();
    assert_eq!(info.version, Version::new(12, 1, 0));
    assert!(info.has_feature("thread-info"));
    assert!(info.supports_thread_frame_options());

    // already negotiated, no wire traffic
    let again = session.negotiate(TIMEOUT).unwrap();
    assert_eq!(&again, info);
    backend.expect_silence();

    let frames = session
        .request(
            &Operation::StackListFrames { range: None },
            Some(ContextId::Thread(2)),
        )
        .unwrap();
    let token = backend.expect_command("-stack-list-frames --thread 2");
    backend.send(&format!(r#"{token}^done,stack=[frame={{level="0",addr="0x1"}}]"#));
    assert!(frames.wait().is_ok());
}

#[test]
fn test_version_not_detected() {
    let (session, mut backend) = start();

    thread::scope(|s| {
        let h = s.spawn(|| session.negotiate(TIMEOUT));
        let token = backend.expect_command("-gdb-version");
        backend.send(r#"~"LLDB-MI 1.0\n""#);
        backend.send(&format!("{token}^done"));
        assert!(matches!(
            h.join().unwrap(),
            Err(Error::VersionNotDetected(_))
        ));
    });
    assert_eq!(session.backend(), None);
}

#[test]
fn test_selection_injected_on_old_backend() {
    let (session, mut backend) = start();
    negotiate(&session, &mut backend, "GNU gdb 6.8-debian", None);
    assert!(!session.backend().unwrap().supports_thread_frame_options());

    backend.send(r#"=thread-created,id="1",group-id="i1""#);
    backend.send(r#"=thread-created,id="2",group-id="i1""#);
    backend.send(r#"*stopped,reason="signal-received",thread-id="1",stopped-threads="all""#);
    sync(&session, &mut backend);

    let frames = session
        .request(
            &Operation::StackListFrames { range: Some((0, 3)) },
            Some(ContextId::Frame {
                thread: 2,
                level: 1,
            }),
        )
        .unwrap();

    let select_thread = backend.expect_command("-thread-select 2");
    let select_frame = backend.expect_command("-stack-select-frame 1");
    let token = backend.expect_command("-stack-list-frames 0 3");
    // tokens grow in wire order
    assert!(select_thread < select_frame, "{select_thread} {select_frame}");
    assert!(select_frame < token, "{select_frame} {token}");
    backend.send(&format!(r#"{select_thread}^done,new-thread-id="2""#));
    backend.send(&format!("{select_frame}^done"));
    backend.send(&format!("{token}^done,stack=[]"));
    assert!(frames.wait().is_ok());

    // selection is unchanged, command goes as is
    let again = session
        .request(
            &Operation::StackInfoDepth { max_depth: None },
            Some(ContextId::Frame {
                thread: 2,
                level: 1,
            }),
        )
        .unwrap();
    let token = backend.expect_command("-stack-info-depth");
    backend.send(&format!(r#"{token}^done,depth="4""#));
    assert!(again.wait().is_ok());
}

#[test]
fn test_running_thread_is_not_selected() {
    let (session, mut backend) = start();
    negotiate(&session, &mut backend, "GNU gdb 6.8-debian", None);

    backend.send(r#"=thread-created,id="3",group-id="i1""#);
    sync(&session, &mut backend);
    let cmd = session
        .submit(Command::mi("exec-interrupt").context(ContextId::Thread(3)))
        .unwrap();
    let token = backend.expect_command("-exec-interrupt");
    backend.send(&format!("{token}^done"));
    assert!(cmd.wait().is_ok());
}
