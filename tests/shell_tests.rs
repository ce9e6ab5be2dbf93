use rollgate::error::CommandError;
use rollgate::shell;

#[tokio::test]
async fn run_succeeds_for_zero_exit() {
    assert!(shell::run("echo hello").await.is_ok());
}

#[tokio::test]
async fn run_fails_for_nonzero_exit() {
    let err = shell::run("false").await.unwrap_err();
    assert!(matches!(err, CommandError::Failed { .. }));
}

#[tokio::test]
async fn run_capture_returns_stdout() {
    let out = shell::run_capture("echo hello").await.unwrap();
    assert_eq!(out, b"hello\n");
}

#[tokio::test]
async fn run_capture_fails_for_nonzero_exit() {
    let err = shell::run_capture("exit 3").await.unwrap_err();
    match err {
        CommandError::Failed { status } => assert_eq!(status.code(), Some(3)),
        other => panic!("expected Failed, got: {other}"),
    }
}

#[tokio::test]
async fn run_capture_handles_multiline_output() {
    let out = shell::run_capture("printf 'line1\\nline2\\n'").await.unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 2);
}

#[tokio::test]
async fn run_capture_does_not_expand_single_quoted_vars() {
    let out = shell::run_capture("echo '$USER'").await.unwrap();
    assert_eq!(out, b"$USER\n");
}

#[tokio::test]
async fn run_fails_for_missing_binary() {
    // sh itself starts fine; the missing command surfaces as a 127 exit.
    let err = shell::run("nonexistent_command_12345").await.unwrap_err();
    match err {
        CommandError::Failed { status } => assert_eq!(status.code(), Some(127)),
        other => panic!("expected Failed, got: {other}"),
    }
}
