//! Registry of live client connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

/// Set of currently open connections, keyed by a per-connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: Mutex<HashMap<Uuid, SocketAddr>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection from `peer`.
    ///
    /// The connection stays registered until the returned guard is dropped,
    /// whichever way the connection task ends.
    #[must_use]
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = Uuid::new_v4();
        let open = {
            let mut live = self.live.lock();
            live.insert(id, peer);
            live.len()
        };
        info!(connection_id = %id, peer = %peer, open, "Client connected");
        ConnectionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    /// Whether no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    /// Peers of all open connections.
    #[must_use]
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.live.lock().values().copied().collect()
    }

    fn unregister(&self, id: Uuid) {
        let removed = self.live.lock().remove(&id);
        if let Some(peer) = removed {
            info!(connection_id = %id, peer = %peer, "Client disconnected");
        }
    }
}

/// Keeps one connection registered while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: Uuid,
}

impl ConnectionGuard {
    /// Id assigned to this connection.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn guard_drop_unregisters() {
        let registry = Arc::new(ConnectionRegistry::new());
        let a = registry.register(peer(4000));
        let b = registry.register(peer(4001));
        assert_eq!(registry.len(), 2);
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(registry.peers(), vec![peer(4001)]);
        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_drop_runs_during_unwind() {
        let registry = Arc::new(ConnectionRegistry::new());
        let inner = Arc::clone(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.register(peer(4002));
            panic!("connection task blew up");
        }));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
