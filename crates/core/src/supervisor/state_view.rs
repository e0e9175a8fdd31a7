//! Lock-free aggregated view of per-server statuses (§4.5 `StateView`).
//!
//! Refreshed by draining a channel fed by every `ServerActor`'s status
//! updates, mirroring `FileIndexWatcher`'s broadcast-driven refresh.
//! Readers never touch actor internals.

use crate::types::ServerStatus;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct StateViewInner {
    pub servers: HashMap<String, ServerStatus>,
}

impl StateViewInner {
    pub fn tool_count_total(&self) -> usize {
        self.servers.values().map(|s| s.tool_count).sum()
    }
}

pub struct StateView {
    inner: Arc<ArcSwap<StateViewInner>>,
}

impl StateView {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(StateViewInner::default())),
        }
    }

    pub fn load(&self) -> Arc<StateViewInner> {
        self.inner.load_full()
    }

    pub fn set_status(&self, status: ServerStatus) {
        let mut next = (**self.inner.load()).clone();
        next.servers.insert(status.name.clone(), status);
        self.inner.store(Arc::new(next));
    }

    pub fn remove(&self, name: &str) {
        let mut next = (**self.inner.load()).clone();
        next.servers.remove(name);
        self.inner.store(Arc::new(next));
    }

    /// Spawns a background task draining `status_rx` and applying updates
    /// to the view until `token` is cancelled.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        mut status_rx: mpsc::UnboundedReceiver<ServerStatus>,
        token: CancellationToken,
    ) {
        let view = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    status = status_rx.recv() => {
                        match status {
                            Some(status) => view.set_status(status),
                            None => break,
                        }
                    }
                }
            }
        });
    }
}

impl Default for StateView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServerState;

    fn status(name: &str, tool_count: usize) -> ServerStatus {
        ServerStatus {
            name: name.to_string(),
            enabled: true,
            quarantined: false,
            state: ServerState::Connected,
            connected: true,
            last_error: None,
            retry_count: 0,
            tool_count,
            tools: Vec::new(),
            oauth_status: None,
            token_expires_at: None,
        }
    }

    #[test]
    fn set_and_load_reflects_latest_status() {
        let view = StateView::new();
        view.set_status(status("s1", 3));
        let snapshot = view.load();
        assert_eq!(snapshot.servers.get("s1").unwrap().tool_count, 3);
    }

    #[test]
    fn remove_drops_entry() {
        let view = StateView::new();
        view.set_status(status("s1", 3));
        view.remove("s1");
        assert!(view.load().servers.is_empty());
    }

    #[test]
    fn tool_count_total_sums_across_servers() {
        let view = StateView::new();
        view.set_status(status("s1", 3));
        view.set_status(status("s2", 4));
        assert_eq!(view.load().tool_count_total(), 7);
    }

    #[tokio::test]
    async fn refresher_applies_channel_updates() {
        let view = Arc::new(StateView::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        view.spawn_refresher(rx, token.clone());

        tx.send(status("s1", 5)).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(view.load().servers.get("s1").unwrap().tool_count, 5);

        token.cancel();
    }
}
