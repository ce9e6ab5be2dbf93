//! Registry of live children keyed by slot port, and the slot-selection
//! policy deciding which of the two reserved ports a new child may take.

use std::collections::HashMap;

use crate::child::ChildHandle;
use crate::proxy::backends::BackendSet;

/// Mapping from slot port to the child occupying it. At most two entries,
/// one per reserved port. Mutation happens under the supervisor's registry
/// mutex; this type itself is plain data.
#[derive(Debug)]
pub struct ChildRegistry {
    port1: u16,
    port2: u16,
    children: HashMap<u16, ChildHandle>,
}

impl ChildRegistry {
    pub fn new(port1: u16, port2: u16) -> Self {
        Self {
            port1,
            port2,
            children: HashMap::new(),
        }
    }

    pub fn insert(&mut self, child: ChildHandle) {
        self.children.insert(child.port, child);
    }

    pub fn get(&self, port: u16) -> Option<&ChildHandle> {
        self.children.get(&port)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn ports(&self) -> Vec<u16> {
        self.children.keys().copied().collect()
    }

    /// Pick the slot for the next child, freeing one if necessary.
    ///
    /// A free slot is taken as-is (`port1` first). With both slots occupied,
    /// the first child whose id differs from `current_id` is retired to make
    /// room; if both carry `current_id` (a forced update of an unchanged
    /// artifact), the child on `port1` is retired so the new one can overlap
    /// the survivor.
    pub async fn select_slot(&mut self, current_id: &str, backends: &BackendSet) -> u16 {
        if !self.children.contains_key(&self.port1) {
            return self.port1;
        }
        if !self.children.contains_key(&self.port2) {
            return self.port2;
        }

        for port in [self.port1, self.port2] {
            if self.children[&port].id != current_id {
                tracing::info!(port, "both slots occupied, retiring stale child");
                self.free(port, backends).await;
                return port;
            }
        }

        tracing::info!(port = self.port1, "both children current, retiring first slot");
        self.free(self.port1, backends).await;
        self.port1
    }

    /// Kill and drop every child other than the one on `new_port`. After a
    /// deploy only the new child stays: a sibling either carries an outdated
    /// id or was supplanted by a forced update of the same id.
    pub async fn retire_stale(&mut self, new_id: &str, new_port: u16, backends: &BackendSet) {
        let stale: Vec<(u16, bool)> = self
            .children
            .values()
            .filter(|c| c.port != new_port)
            .map(|c| (c.port, c.id == new_id))
            .collect();
        for (port, supplanted) in stale {
            if supplanted {
                tracing::info!(port, "retiring supplanted child");
            } else {
                tracing::info!(port, "retiring outdated child");
            }
            self.free(port, backends).await;
        }
    }

    /// Drop the entry for an exited child. The pid must match: a stale exit
    /// event for a slot that has since been re-occupied is a no-op.
    pub async fn remove_exited(
        &mut self,
        port: u16,
        pid: i32,
        backends: &BackendSet,
    ) -> Option<ChildHandle> {
        match self.children.get(&port) {
            Some(child) if child.pid() == Some(pid) => {
                let child = self.children.remove(&port);
                backends.remove_by_port(port).await;
                child
            }
            _ => None,
        }
    }

    async fn free(&mut self, port: u16, backends: &BackendSet) {
        if let Some(child) = self.children.remove(&port) {
            child.kill();
            backends.remove_by_port(port).await;
        }
    }

    /// Ask every registered child to exit.
    pub fn terminate_all(&self) {
        for child in self.children.values() {
            child.terminate();
        }
    }

    /// Force-kill every registered child.
    pub fn kill_all(&self) {
        for child in self.children.values() {
            child.kill();
        }
    }
}
