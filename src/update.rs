//! The update run: fetch, identify, and roll the serving child forward.
//!
//! One run walks a fixed sequence:
//!
//! 1. Run the pull command.
//! 2. Capture the id command's stdout, trimmed, as the new artifact id.
//! 3. Unforced runs stop here when the id matches the one in service.
//! 4. Pick a slot port, retiring an occupant if both slots are taken.
//! 5. Launch the child on that slot.
//! 6. Probe its health endpoint until 200 or the deadline; on failure the
//!    child is killed and nothing was registered.
//! 7. Register the child: registry entry plus proxy backend.
//! 8. Publish the new id as current.
//! 9. Retire every remaining sibling, whether outdated or supplanted by a
//!    forced update of the same id.
//!
//! Health precedes registration so the proxy never routes to an unverified
//! child; id publication follows registration so a concurrent trigger seeing
//! the new id can rely on a matching healthy backend; retirement runs last
//! so its id comparison is against the published id.
//!
//! Runs are serialized by construction: the supervisor's single update
//! worker is the only caller.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::child::{ChildExit, ChildHandle};
use crate::config::Config;
use crate::error::UpdateError;
use crate::health;
use crate::proxy::backends::backend_url;
use crate::shell;
use crate::supervisor::SharedState;

/// What a successful update run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Unforced run found the id unchanged; nothing was spawned.
    Unchanged,
    /// A new child is in service.
    Deployed { id: String, port: u16 },
}

pub struct UpdateCoordinator {
    config: Config,
    state: Arc<SharedState>,
    client: reqwest::Client,
    exit_tx: mpsc::Sender<ChildExit>,
}

impl UpdateCoordinator {
    pub fn new(
        config: Config,
        state: Arc<SharedState>,
        client: reqwest::Client,
        exit_tx: mpsc::Sender<ChildExit>,
    ) -> Self {
        Self {
            config,
            state,
            client,
            exit_tx,
        }
    }

    /// Execute one update run. Every error is local to the run: the child in
    /// service and the current id are untouched by a failed run.
    pub async fn run(&self, forced: bool) -> Result<UpdateOutcome, UpdateError> {
        tracing::info!(forced, "starting update run");

        shell::run(&self.config.pull_cmd)
            .await
            .map_err(UpdateError::PullFailed)?;

        let stdout = shell::run_capture(&self.config.id_cmd)
            .await
            .map_err(UpdateError::IdFailed)?;
        let new_id = String::from_utf8_lossy(&stdout).trim().to_string();
        tracing::info!(id = %new_id, "artifact id resolved");

        if !forced {
            let current = self.state.current_id.lock().await;
            if new_id == *current {
                tracing::info!(id = %new_id, "id unchanged, no update required");
                return Ok(UpdateOutcome::Unchanged);
            }
        }

        let port = {
            let mut registry = self.state.registry.lock().await;
            let current = self.state.current_id.lock().await.clone();
            registry.select_slot(&current, &self.state.backends).await
        };
        tracing::info!(port, "slot selected for new child");

        let child = ChildHandle::spawn(
            &self.config.exec_cmd,
            port,
            &new_id,
            &self.config.healthcheck_path,
            self.exit_tx.clone(),
        )
        .map_err(|source| UpdateError::SpawnFailed { port, source })?;

        if let Err(source) = health::wait_healthy(
            &self.client,
            &child.health_url,
            self.config.health_timeout,
        )
        .await
        {
            tracing::warn!(port, error = %source, "health probe failed, killing child");
            child.kill();
            return Err(UpdateError::HealthFailed { port, source });
        }
        tracing::info!(port, "child passed healthcheck");

        {
            let mut registry = self.state.registry.lock().await;
            registry.insert(child);
            self.state.backends.upsert(port, backend_url(port)).await;
        }

        *self.state.current_id.lock().await = new_id.clone();

        {
            let mut registry = self.state.registry.lock().await;
            registry
                .retire_stale(&new_id, port, &self.state.backends)
                .await;
        }

        tracing::info!(id = %new_id, port, "update complete");
        Ok(UpdateOutcome::Deployed { id: new_id, port })
    }
}
