use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};

use crate::frame::Frame;

pub type DeviceId = String;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry side of a live connection.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub device_id: DeviceId,
    pub sender: mpsc::Sender<Frame>,
    /// Fired (or dropped) to stop the connection's serving loop.
    pub close: oneshot::Sender<()>,
}

/// Connection registry with dual indices for O(1) lookups.
///
/// DashMap shard locks are only held for the map operation itself. Callers
/// get cloned senders back and do their buffer sends after every guard is
/// released.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: fast lookup by device_id for event routing - O(1)
    device_index: DashMap<DeviceId, HashSet<ConnectionId>>,

    /// Set by `close_all`. Registration holds it shared for the whole insert.
    closed: RwLock<bool>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            device_index: DashMap::new(),
            closed: RwLock::new(false),
        }
    }

    /// Register a new connection - O(1)
    ///
    /// Returns `None` once the registry is closed; `sender` and `close` are
    /// dropped so the serving side ends on its own.
    pub fn register(
        &self,
        device_id: DeviceId,
        sender: mpsc::Sender<Frame>,
        close: oneshot::Sender<()>,
    ) -> Option<ConnectionId> {
        let closed = self.closed.read();
        if *closed {
            return None;
        }

        let connection_id = ConnectionId::new();

        self.connections.insert(
            connection_id.clone(),
            ConnectionInfo {
                device_id: device_id.clone(),
                sender,
                close,
            },
        );

        self.device_index
            .entry(device_id)
            .or_default()
            .insert(connection_id.clone());

        Some(connection_id)
    }

    /// Unregister a connection - O(1). Returns false if it was already gone.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.remove(connection_id).is_some()
    }

    fn remove(&self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        let (_, info) = self.connections.remove(connection_id)?;

        if let Some(mut entry) = self.device_index.get_mut(&info.device_id) {
            entry.remove(connection_id);

            // Clean up empty device entries
            if entry.is_empty() {
                drop(entry); // Release lock before removal
                self.device_index
                    .remove_if(&info.device_id, |_, connections| connections.is_empty());
            }
        }

        Some(info)
    }

    /// Cloned senders for every live connection of `device_id`.
    pub fn senders(&self, device_id: &str) -> Vec<(ConnectionId, mpsc::Sender<Frame>)> {
        let Some(connection_ids) = self.device_index.get(device_id) else {
            return Vec::new();
        };

        connection_ids
            .iter()
            .filter_map(|conn_id| {
                self.connections
                    .get(conn_id)
                    .map(|info| (conn_id.clone(), info.sender.clone()))
            })
            .collect()
    }

    pub fn connection_count(&self, device_id: &str) -> usize {
        self.device_index
            .get(device_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Refuses further registrations, then signals close on every connection
    /// and empties the registry. Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        // Waits out registrations already in flight.
        *self.closed.write() = true;

        let connection_ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for connection_id in connection_ids {
            if let Some(info) = self.remove(&connection_id) {
                // The serving loop may already be gone.
                let _ = info.close.send(());
                closed += 1;
            }
        }

        closed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> (mpsc::Sender<Frame>, oneshot::Sender<()>) {
        let (tx, _rx) = mpsc::channel(1);
        let (close, _closed) = oneshot::channel();
        (tx, close)
    }

    #[test]
    fn register_indexes_connection_by_device() {
        let registry = ConnectionRegistry::new();
        let (tx, close) = channels();
        let id = registry.register("d1".to_string(), tx, close).unwrap();

        let senders = registry.senders("d1");
        assert_eq!(senders.len(), 1);
        assert_eq!(senders[0].0, id);
        assert!(registry.senders("d2").is_empty());
    }

    #[test]
    fn unregister_removes_empty_device_entry() {
        let registry = ConnectionRegistry::new();
        let (tx, close) = channels();
        let id = registry.register("d1".to_string(), tx, close).unwrap();

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert_eq!(registry.connection_count("d1"), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_keeps_other_connections_of_device() {
        let registry = ConnectionRegistry::new();
        let (tx1, close1) = channels();
        let (tx2, close2) = channels();
        let first = registry.register("d1".to_string(), tx1, close1).unwrap();
        let second = registry.register("d1".to_string(), tx2, close2).unwrap();

        registry.unregister(&first);

        let senders = registry.senders("d1");
        assert_eq!(senders.len(), 1);
        assert_eq!(senders[0].0, second);
    }

    #[test]
    fn close_all_signals_every_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let (close, mut closed) = oneshot::channel();
        registry.register("d1".to_string(), tx, close);

        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.connection_count("d1"), 0);
        assert_eq!(closed.try_recv(), Ok(()));
    }

    #[test]
    fn register_after_close_all_is_refused() {
        let registry = ConnectionRegistry::new();
        registry.close_all();

        let (tx, mut rx) = mpsc::channel(1);
        let (close, mut closed) = oneshot::channel();

        assert!(registry.register("d1".to_string(), tx, close).is_none());
        assert!(registry.is_closed());
        assert!(registry.is_empty());
        assert_eq!(registry.connection_count("d1"), 0);
        assert!(rx.try_recv().is_err());
        assert!(closed.try_recv().is_err());
    }

    #[test]
    fn close_all_racing_registrations_leaves_none_open() {
        let registry = std::sync::Arc::new(ConnectionRegistry::new());

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..200)
                        .map(|_| {
                            let (tx, _rx) = mpsc::channel(1);
                            let (close, closed) = oneshot::channel();
                            let registered = registry
                                .register(format!("d{worker}"), tx, close)
                                .is_some();
                            (registered, closed)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        registry.close_all();

        for worker in workers {
            for (registered, mut closed) in worker.join().unwrap() {
                if registered {
                    assert_eq!(closed.try_recv(), Ok(()));
                } else {
                    assert!(closed.try_recv().is_err());
                }
            }
        }
        assert!(registry.is_empty());
        for worker in 0..4 {
            assert_eq!(registry.connection_count(&format!("d{worker}")), 0);
        }
    }
}
