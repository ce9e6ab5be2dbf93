use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failure of an operator-supplied shell command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to run shell: {0}")]
    Io(#[from] std::io::Error),

    #[error("command exited with {status}")]
    Failed { status: ExitStatus },
}

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("no 200 response from {url} within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

/// Why a single update run was aborted. None of these are fatal: the
/// supervisor keeps the previous child in service and waits for the next
/// trigger.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("pull command failed: {0}")]
    PullFailed(#[source] CommandError),

    #[error("id command failed: {0}")]
    IdFailed(#[source] CommandError),

    #[error("failed to spawn child on port {port}: {source}")]
    SpawnFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("child on port {port} never became healthy: {source}")]
    HealthFailed {
        port: u16,
        #[source]
        source: HealthError,
    },
}

/// Fatal supervisor failure. Anything here terminates the process.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("reverse proxy terminated: {0}")]
    Proxy(#[source] std::io::Error),
}
