//! One supervised subprocess serving HTTP on a reserved slot port.
//!
//! Spawning moves the OS handle into a reaper task that waits for the exit
//! and publishes a [`ChildExit`] event; the [`ChildHandle`] kept in the
//! registry carries only the pid, so kills stay possible while the reaper
//! owns the wait.

use std::io;
use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Notification from a reaper task that a child process has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub port: u16,
    pub pid: i32,
}

/// Substitute `<<PORT>>` and `<<HEALTHCHECK>>` in an exec command template.
/// Plain substring replacement, all occurrences, no escaping.
pub fn expand_template(exec_cmd: &str, port: u16, healthcheck_path: &str) -> String {
    exec_cmd
        .replace("<<PORT>>", &port.to_string())
        .replace("<<HEALTHCHECK>>", healthcheck_path)
}

/// Signal-capable handle to a launched child process.
#[derive(Debug)]
pub struct ChildHandle {
    pub port: u16,
    /// Artifact id reported at the moment this child was launched.
    pub id: String,
    pub health_url: String,
    pid: Option<Pid>,
}

impl ChildHandle {
    /// Expand the exec template for `port`, launch it under `sh -c` with
    /// inherited stdout/stderr, and start the reaper task that reports the
    /// exit on `exit_tx`.
    pub fn spawn(
        exec_cmd: &str,
        port: u16,
        id: &str,
        healthcheck_path: &str,
        exit_tx: mpsc::Sender<ChildExit>,
    ) -> io::Result<Self> {
        let command = expand_template(exec_cmd, port, healthcheck_path);
        tracing::info!(port, command = %command, "launching child");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        let raw_pid = child.id().map(|p| p as i32);

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!(port, "child exited normally");
                }
                Ok(status) => {
                    tracing::warn!(port, %status, "child exited abnormally");
                }
                Err(e) => {
                    tracing::warn!(port, error = %e, "failed to wait for child");
                }
            }
            if let Some(pid) = raw_pid {
                let _ = exit_tx.send(ChildExit { port, pid }).await;
            }
        });

        Ok(Self {
            port,
            id: id.to_string(),
            health_url: format!("http://localhost:{port}{healthcheck_path}"),
            pid: raw_pid.map(Pid::from_raw),
        })
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid.map(Pid::as_raw)
    }

    /// Best-effort SIGKILL.
    pub fn kill(&self) {
        self.signal(Signal::SIGKILL);
    }

    /// Best-effort SIGTERM, giving the child a chance to exit cleanly.
    pub fn terminate(&self) {
        self.signal(Signal::SIGTERM);
    }

    fn signal(&self, sig: Signal) {
        let Some(pid) = self.pid else { return };
        match signal::kill(pid, sig) {
            Ok(()) => {
                tracing::info!(port = self.port, pid = pid.as_raw(), signal = %sig, "signaled child");
            }
            // Already reaped or never existed.
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => {
                tracing::warn!(port = self.port, pid = pid.as_raw(), error = %e, "failed to signal child");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_port_and_healthcheck() {
        let cmd = expand_template("serve --port <<PORT>> --check <<HEALTHCHECK>>", 9101, "/heathz");
        assert_eq!(cmd, "serve --port 9101 --check /heathz");
    }

    #[test]
    fn expands_all_occurrences() {
        let cmd = expand_template("<<PORT>> <<PORT>> <<HEALTHCHECK>><<HEALTHCHECK>>", 9102, "/hc");
        assert_eq!(cmd, "9102 9102 /hc/hc");
    }

    #[test]
    fn leaves_plain_commands_untouched() {
        assert_eq!(expand_template("echo hello", 9101, "/heathz"), "echo hello");
    }
}
