// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Cluster coordination: distributed locks, device responsibility and the
//! client-to-node map.
//!
//! Membership and discovery belong to the distribution layer. The
//! standalone coordinator runs every deployment without a cluster: it is
//! always responsible, its locks are process local, and the client map is
//! a plain concurrent map.

use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::types::{ClientId, NodeId};

/// Releasable handle of an acquired named lock. Dropping it releases the
/// lock.
#[derive(Debug)]
pub struct LockGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
    name: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        log::debug!("cluster: released lock {}", self.name);
    }
}

/// Coordination contract the message plane depends on.
pub trait Coordinator {
    fn node_id(&self) -> &str;

    /// Whether this node owns `device_id` under the current membership.
    fn is_local_node_responsible(&self, device_id: &str) -> bool;

    /// Record `client_id` as connected to `node`.
    fn set_client_node(&self, client_id: &str, node: &str);

    /// Forget `client_id` if it is still mapped to `node`.
    fn remove_client_node(&self, client_id: &str, node: &str);

    /// Node currently owning `client_id`.
    fn client_node(&self, client_id: &str) -> Option<NodeId>;
}

/// Single-node coordinator with process local locks.
#[derive(Debug, Clone)]
pub struct StandaloneCoordinator {
    node_id: NodeId,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    clients: Arc<DashMap<ClientId, NodeId>>,
}

impl StandaloneCoordinator {
    #[must_use]
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            locks: Arc::new(DashMap::new()),
            clients: Arc::new(DashMap::new()),
        }
    }

    async fn acquire_lock(&self, name: &str, timeout: Duration) -> Option<LockGuard> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Some(LockGuard {
                _guard: guard,
                name: name.to_string(),
            }),
            Err(_elapsed) => {
                log::warn!("cluster: lock {name} not acquired within {timeout:?}");
                None
            }
        }
    }
}

impl Coordinator for StandaloneCoordinator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn is_local_node_responsible(&self, _device_id: &str) -> bool {
        true
    }

    fn set_client_node(&self, client_id: &str, node: &str) {
        self.clients.insert(client_id.to_string(), node.to_string());
    }

    fn remove_client_node(&self, client_id: &str, node: &str) {
        self.clients
            .remove_if(client_id, |_, mapped| mapped == node);
    }

    fn client_node(&self, client_id: &str) -> Option<NodeId> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }
}

/// Coordinator backend resolved from config.
///
/// A clustered deployment plugs its coordinator in as a new variant; the
/// message plane only sees this enum.
#[derive(Debug, Clone)]
pub enum CoordinatorHandle {
    Standalone(StandaloneCoordinator),
}

impl CoordinatorHandle {
    #[must_use]
    pub fn standalone(node_id: &str) -> Self {
        Self::Standalone(StandaloneCoordinator::new(node_id))
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::Standalone(inner) => inner.node_id(),
        }
    }

    /// Consistent-hash responsibility of device connectors.
    #[must_use]
    pub fn is_local_node_responsible(&self, device_id: &str) -> bool {
        match self {
            Self::Standalone(inner) => inner.is_local_node_responsible(device_id),
        }
    }

    /// Acquire a named lock, waiting at most `timeout`. Cluster-wide
    /// destructive maintenance must hold its lock.
    pub async fn acquire_lock(&self, name: &str, timeout: Duration) -> Option<LockGuard> {
        match self {
            Self::Standalone(inner) => inner.acquire_lock(name, timeout).await,
        }
    }

    pub fn set_client_node(&self, client_id: &str, node: &str) {
        match self {
            Self::Standalone(inner) => inner.set_client_node(client_id, node),
        }
    }

    pub fn remove_client_node(&self, client_id: &str, node: &str) {
        match self {
            Self::Standalone(inner) => inner.remove_client_node(client_id, node),
        }
    }

    #[must_use]
    pub fn client_node(&self, client_id: &str) -> Option<NodeId> {
        match self {
            Self::Standalone(inner) => inner.client_node(client_id),
        }
    }
}

/// Stable hash used to spread device ids over cluster members.
#[must_use]
pub fn consistent_bucket(device_id: &str, buckets: usize) -> usize {
    if buckets == 0 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    usize::try_from(hasher.finish() % buckets as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let coordinator = StandaloneCoordinator::new("node-0");
        let guard = coordinator
            .acquire_lock("purge", Duration::from_millis(50))
            .await;
        assert!(guard.is_some());

        // Second acquire times out while the first guard is held.
        let blocked = coordinator
            .acquire_lock("purge", Duration::from_millis(50))
            .await;
        assert!(blocked.is_none());

        drop(guard);
        let again = coordinator
            .acquire_lock("purge", Duration::from_millis(50))
            .await;
        assert!(again.is_some());
    }

    #[test]
    fn test_client_map() {
        let coordinator = StandaloneCoordinator::new("node-0");
        coordinator.set_client_node("c1", "node-0");
        assert_eq!(coordinator.client_node("c1").as_deref(), Some("node-0"));

        // Removal is conditional on the mapped node.
        coordinator.remove_client_node("c1", "node-1");
        assert!(coordinator.client_node("c1").is_some());
        coordinator.remove_client_node("c1", "node-0");
        assert!(coordinator.client_node("c1").is_none());
    }

    #[test]
    fn test_consistent_bucket_is_stable() {
        assert_eq!(
            consistent_bucket("plc-7", 4),
            consistent_bucket("plc-7", 4)
        );
        assert!(consistent_bucket("plc-7", 4) < 4);
    }
}
