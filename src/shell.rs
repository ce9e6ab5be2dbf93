//! Execution of operator-supplied shell command strings.
//!
//! Both entry points run the string under `sh -c` and treat a non-zero exit
//! as failure. [`run`] inherits stdout/stderr so pull commands stream their
//! progress into the supervisor's output; [`run_capture`] pipes stdout so id
//! commands can be read back.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::CommandError;

/// Run a shell command to completion, inheriting stdout and stderr.
pub async fn run(command: &str) -> Result<(), CommandError> {
    tracing::info!(command, "running command");

    let status = Command::new("sh").arg("-c").arg(command).status().await?;
    if !status.success() {
        return Err(CommandError::Failed { status });
    }
    Ok(())
}

/// Run a shell command to completion and return its stdout as bytes.
pub async fn run_capture(command: &str) -> Result<Vec<u8>, CommandError> {
    tracing::info!(command, "running command");

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(CommandError::Failed {
            status: output.status,
        });
    }
    Ok(output.stdout)
}
