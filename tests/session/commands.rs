use crate::common::{start, start_with, TIMEOUT};
use micontrol::mi::{Record, ResultClass, StreamKind, Value};
use micontrol::{Command, CommandError, Error, SessionConfig};

#[test]
fn test_exec_run() {
    let (session, mut backend) = start();

    let run = session.submit(Command::mi("-exec-run")).unwrap();
    let token = backend.expect_command("-exec-run");
    backend.send(r#"=thread-group-started,id="i1",pid="31337""#);
    backend.send(r#"*running,thread-id="all""#);
    backend.send(&format!("{token}^running"));
    backend.send("(gdb)");

    let output = run.wait_timeout(TIMEOUT).unwrap();
    assert_eq!(output.class, ResultClass::Running);
    assert_eq!(output.oob.len(), 2);
    assert!(matches!(&output.oob[1], Record::Async(r) if r.class == "running"));
}

#[test]
fn test_backend_error() {
    let (session, mut backend) = start();

    let bp = session
        .submit(Command::mi("break-insert").arg("nosuchfunc"))
        .unwrap();
    let token = backend.expect_command("-break-insert nosuchfunc");
    backend.send(&format!(
        r#"{token}^error,msg="Function \"nosuchfunc\" not defined.""#
    ));

    let err = bp.wait().unwrap_err();
    let Error::Command(CommandError::Backend { message, code }) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(message, r#"Function "nosuchfunc" not defined."#);
    assert_eq!(code, None);
}

#[test]
fn test_results_are_routed_by_token() {
    let (session, mut backend) = start();

    let handles: Vec<_> = (0..3)
        .map(|i| {
            session
                .submit(Command::mi("data-evaluate-expression").arg(format!("{i}+1")))
                .unwrap()
        })
        .collect();

    // wire order is submission order
    let tokens: Vec<u32> = (0..3)
        .map(|i| backend.expect_command(&format!("-data-evaluate-expression {i}+1")))
        .collect();
    assert!(tokens.windows(2).all(|w| w[0] != w[1]));

    for i in [2, 0, 1] {
        backend.send(&format!(r#"{}^done,value="{}""#, tokens[i], i + 1));
    }

    for (i, h) in handles.into_iter().enumerate() {
        let output = h.wait().unwrap();
        assert_eq!(output.get_const("value"), Some((i + 1).to_string().as_str()));
    }
}

#[test]
fn test_coalesced_queries() {
    let (session, mut backend) = start();

    let first = session
        .submit(Command::mi("thread-info").coalesce("thread-info"))
        .unwrap();
    let second = session
        .submit(Command::mi("thread-info").coalesce("thread-info"))
        .unwrap();

    let token = backend.expect_command("-thread-info");
    backend.expect_silence();
    backend.send(&format!(
        r#"{token}^done,threads=[{{id="1",state="stopped"}}],current-thread-id="1""#
    ));

    let first = first.wait().unwrap();
    let second = second.wait().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.get_const("current-thread-id"), Some("1"));
    assert!(matches!(first.get("threads"), Some(Value::List(l)) if l.len() == 1));
}

#[test]
fn test_in_flight_window() {
    let (session, mut backend) = start_with(SessionConfig {
        max_in_flight: 1,
        ..SessionConfig::default()
    });

    let a = session.submit(Command::mi("break-list")).unwrap();
    let b = session.submit(Command::mi("stack-info-depth")).unwrap();

    let token = backend.expect_command("-break-list");
    backend.expect_silence();
    assert!(b.try_result().is_none());

    backend.send(&format!("{token}^done"));
    let token = backend.expect_command("-stack-info-depth");
    backend.send(&format!(r#"{token}^done,depth="3""#));

    assert!(a.wait().is_ok());
    assert_eq!(b.wait().unwrap().get_const("depth"), Some("3"));
}

#[test]
fn test_cancel_queued_command() {
    let (session, mut backend) = start_with(SessionConfig {
        max_in_flight: 1,
        ..SessionConfig::default()
    });

    let a = session.submit(Command::mi("exec-next")).unwrap();
    let b = session.submit(Command::mi("exec-step")).unwrap();
    let token = backend.expect_command("-exec-next");

    b.cancel();
    assert_eq!(
        b.wait_timeout(TIMEOUT).unwrap_err().to_string(),
        CommandError::Cancelled.to_string()
    );

    backend.send(&format!("{token}^running"));
    assert!(a.wait().is_ok());
    // cancelled command is never written
    backend.expect_silence();
}

#[test]
fn test_cancel_written_command() {
    let (session, mut backend) = start();

    let slow = session.submit(Command::mi("data-list-register-names")).unwrap();
    let token = backend.expect_command("-data-list-register-names");
    slow.cancel();
    assert!(matches!(
        slow.wait_timeout(TIMEOUT),
        Err(Error::Command(CommandError::Cancelled))
    ));

    // late result is consumed silently, session keeps working
    backend.send(&format!(r#"{token}^done,register-names=["rax"]"#));
    let next = session.submit(Command::mi("break-list")).unwrap();
    let token = backend.expect_command("-break-list");
    backend.send(&format!("{token}^done"));
    assert!(next.wait().is_ok());
    assert_eq!(slow.try_result(), Some(Err(CommandError::Cancelled)));
}

#[test]
fn test_console_command() {
    let (session, mut backend) = start();

    let info = session.submit(Command::cli("info threads")).unwrap();
    let token = backend.expect_command(r#"-interpreter-exec console "info threads""#);
    backend.send(r#"~"No threads.\n""#);
    backend.send(r#"&"warning: nothing to show\n""#);
    backend.send(&format!("{token}^done"));

    let output = info.wait().unwrap();
    assert_eq!(output.console_text(), "No threads.\n");
    assert_eq!(output.stream_text(StreamKind::Log), "warning: nothing to show\n");
}

#[test]
fn test_malformed_and_orphaned_lines() {
    let (session, mut backend) = start();

    let cmd = session.submit(Command::mi("gdb-set").args(["width", "0"])).unwrap();
    let token = backend.expect_command("-gdb-set width 0");
    backend.send("this is not mi at all");
    backend.send(r#"*stopped,reason="#);
    backend.send("9999^done");
    backend.send(&format!("{token}^done"));

    let output = cmd.wait().unwrap();
    assert_eq!(output.class, ResultClass::Done);
    assert!(output.oob.is_empty());
}

#[test]
fn test_raw_command() {
    let (session, backend) = start();

    let answer = session.submit(Command::raw("y")).unwrap();
    assert_eq!(backend.expect_line(), "y");
    let output = answer.wait().unwrap();
    assert_eq!(output.class, ResultClass::Done);
    assert!(output.results.is_empty());
}

#[test]
fn test_submit_with_callback() {
    let (session, mut backend) = start();

    let (tx, rx) = std::sync::mpsc::channel();
    session
        .submit_with(Command::mi("list-thread-groups"), move |res| {
            tx.send((std::thread::current().name().map(String::from), res))
                .unwrap();
        })
        .unwrap();
    let token = backend.expect_command("-list-thread-groups");
    backend.send(&format!(r#"{token}^done,groups=[]"#));

    let (thread, res) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(thread.as_deref(), Some("mi-session"));
    assert!(res.is_ok());
}
