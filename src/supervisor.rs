//! Process-level lifecycle: the event loop that turns timer ticks, signals,
//! and child exits into update runs, and the shutdown path that tears the
//! children down.
//!
//! Triggers flow through a bounded channel of capacity one, drained by a
//! single worker task, so update runs are serialized structurally and a
//! burst of triggers coalesces into at most one pending run.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::child::ChildExit;
use crate::config::Config;
use crate::error::SupervisorError;
use crate::proxy::{self, backends::BackendSet, ProxyState};
use crate::registry::ChildRegistry;
use crate::update::UpdateCoordinator;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Request for one update run.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub forced: bool,
}

/// Everything the update coordinator and the supervisor share. Lock order
/// when holding more than one: registry, then current_id, then backends.
#[derive(Debug)]
pub struct SharedState {
    pub registry: Mutex<ChildRegistry>,
    pub current_id: Mutex<String>,
    pub backends: Arc<BackendSet>,
}

impl SharedState {
    pub fn new(child_port1: u16, child_port2: u16) -> Self {
        Self {
            registry: Mutex::new(ChildRegistry::new(child_port1, child_port2)),
            current_id: Mutex::new(String::new()),
            backends: Arc::new(BackendSet::new()),
        }
    }
}

pub struct Supervisor {
    config: Config,
    state: Arc<SharedState>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        let state = Arc::new(SharedState::new(config.child_port1, config.child_port2));
        Self { config, state }
    }

    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    /// Run until SIGINT/SIGTERM. Only a reverse-proxy failure is an error;
    /// everything else is logged and survived.
    pub async fn run(self) -> Result<(), SupervisorError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(SupervisorError::Proxy)?;
        tracing::info!(%addr, "reverse proxy listening");

        let client = reqwest::Client::new();
        let proxy_state = ProxyState {
            backends: self.state.backends.clone(),
            client: client.clone(),
        };
        let mut proxy_task = tokio::spawn(proxy::serve(listener, proxy_state));

        let (trigger_tx, mut trigger_rx) = mpsc::channel::<Trigger>(1);
        let (exit_tx, mut exit_rx) = mpsc::channel::<ChildExit>(16);
        let draining = CancellationToken::new();

        // Single consumer of the trigger channel. The first run is the
        // startup update and is always forced.
        let coordinator = UpdateCoordinator::new(
            self.config.clone(),
            self.state.clone(),
            client,
            exit_tx.clone(),
        );
        let worker_draining = draining.clone();
        let worker = tokio::spawn(async move {
            if let Err(e) = coordinator.run(true).await {
                tracing::error!(error = %e, "initial update failed");
            }
            loop {
                tokio::select! {
                    _ = worker_draining.cancelled() => break,
                    trigger = trigger_rx.recv() => match trigger {
                        Some(t) => {
                            if let Err(e) = coordinator.run(t.forced).await {
                                tracing::error!(forced = t.forced, error = %e, "update failed");
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        let mut ticker = tokio::time::interval(self.config.interval);
        // The interval's first tick completes immediately; the startup update
        // already covers it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("update interval elapsed, checking for updates");
                    Self::enqueue(&trigger_tx, &draining, Trigger { forced: false });
                }
                _ = sighup.recv() => {
                    tracing::info!("received SIGHUP, forcing update");
                    Self::enqueue(&trigger_tx, &draining, Trigger { forced: true });
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT, shutting down");
                    break;
                }
                Some(exit) = exit_rx.recv() => {
                    self.handle_child_exit(exit, &trigger_tx, &draining).await;
                }
                result = &mut proxy_task => {
                    draining.cancel();
                    worker.abort();
                    let err = match result {
                        Ok(Ok(())) => std::io::Error::other("proxy server exited"),
                        Ok(Err(e)) => e,
                        Err(e) => std::io::Error::other(e),
                    };
                    tracing::error!(error = %err, "reverse proxy terminated");
                    return Err(SupervisorError::Proxy(err));
                }
            }
        }

        draining.cancel();
        worker.abort();
        self.shutdown(&mut exit_rx).await;
        proxy_task.abort();
        Ok(())
    }

    /// A reaper reported an exit. Drop the child (pid-matched, so a slot
    /// re-occupied in the meantime is untouched) and schedule a respawn run.
    /// The run is forced when the exited child was the one in service, since
    /// an unchanged id must not short-circuit its replacement.
    async fn handle_child_exit(
        &self,
        exit: ChildExit,
        trigger_tx: &mpsc::Sender<Trigger>,
        draining: &CancellationToken,
    ) {
        let removed = {
            let mut registry = self.state.registry.lock().await;
            registry
                .remove_exited(exit.port, exit.pid, &self.state.backends)
                .await
        };

        let forced = match &removed {
            Some(child) => {
                tracing::warn!(port = exit.port, id = %child.id, "registered child exited");
                let current = self.state.current_id.lock().await;
                child.id == *current
            }
            None => false,
        };

        Self::enqueue(trigger_tx, draining, Trigger { forced });
    }

    fn enqueue(
        trigger_tx: &mpsc::Sender<Trigger>,
        draining: &CancellationToken,
        trigger: Trigger,
    ) {
        if draining.is_cancelled() {
            tracing::debug!("draining, trigger dropped");
            return;
        }
        match trigger_tx.try_send(trigger) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("update already pending, trigger coalesced");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// SIGTERM every registered child, reap exits for up to
    /// [`SHUTDOWN_GRACE`], then SIGKILL whatever remains and reap again.
    async fn shutdown(&self, exit_rx: &mut mpsc::Receiver<ChildExit>) {
        {
            let registry = self.state.registry.lock().await;
            tracing::info!(children = registry.len(), "terminating child processes");
            registry.terminate_all();
        }

        if !self.reap_until_empty(exit_rx, SHUTDOWN_GRACE).await {
            tracing::warn!("children still running after grace period, sending SIGKILL");
            self.state.registry.lock().await.kill_all();
            self.reap_until_empty(exit_rx, KILL_GRACE).await;
        }

        tracing::info!("shutdown complete");
    }

    /// Drain exit events until the registry is empty or `window` passes.
    async fn reap_until_empty(
        &self,
        exit_rx: &mut mpsc::Receiver<ChildExit>,
        window: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            if self.state.registry.lock().await.is_empty() {
                return true;
            }
            match tokio::time::timeout_at(deadline, exit_rx.recv()).await {
                Ok(Some(exit)) => {
                    let mut registry = self.state.registry.lock().await;
                    registry
                        .remove_exited(exit.port, exit.pid, &self.state.backends)
                        .await;
                }
                Ok(None) => return self.state.registry.lock().await.is_empty(),
                Err(_) => return false,
            }
        }
    }
}
