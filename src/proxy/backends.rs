//! The live backend set of the reverse proxy: which child URLs requests are
//! currently round-robined across.

use tokio::sync::Mutex;

/// Base URL for a child serving on `port`.
pub fn backend_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

#[derive(Debug)]
struct Backend {
    port: u16,
    url: String,
}

#[derive(Debug, Default)]
struct Inner {
    backends: Vec<Backend>,
    next: usize,
}

/// Round-robin backend set keyed by slot port. Mutations and routing share
/// one mutex, so in-flight picks never observe a half-applied change.
#[derive(Debug, Default)]
pub struct BackendSet {
    inner: Mutex<Inner>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend, or replace the URL already registered for its port.
    pub async fn upsert(&self, port: u16, url: String) {
        let mut inner = self.inner.lock().await;
        match inner.backends.iter().position(|b| b.port == port) {
            Some(index) => inner.backends[index].url = url,
            None => inner.backends.push(Backend { port, url }),
        }
        tracing::info!(port, "backend added");
    }

    /// Remove the backend registered for `port`, if any.
    pub async fn remove_by_port(&self, port: u16) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.backends.len();
        inner.backends.retain(|b| b.port != port);
        let removed = inner.backends.len() < before;
        if removed {
            tracing::info!(port, "backend removed");
        }
        removed
    }

    /// Next backend URL in rotation, or `None` when the set is empty.
    pub async fn pick(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        if inner.backends.is_empty() {
            return None;
        }
        let index = inner.next % inner.backends.len();
        inner.next = inner.next.wrapping_add(1);
        Some(inner.backends[index].url.clone())
    }

    pub async fn ports(&self) -> Vec<u16> {
        self.inner.lock().await.backends.iter().map(|b| b.port).collect()
    }

    pub async fn urls(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .backends
            .iter()
            .map(|b| b.url.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.backends.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.backends.is_empty()
    }
}
