//! The node cache: a bounded LRU of idle, already-connected peers, plus
//! a short-TTL deny-list of peers whose connect never finished.
//!
//! Per spec.md's design notes, this is deliberately *not* a process-wide
//! global — it's a small value owned by whichever back-end opened it,
//! exactly as the teacher threads its peer/session registries through as
//! cloneable handles rather than reaching for a `static`.

use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::node::Node;

/// Upper bound on the idle node list.
pub const CACHE_MAX: usize = 100;

/// How long a dead-listed peer stays off-limits.
pub const DEAD_TTL: Duration = Duration::from_secs(60);

/// Outcome of [`NodeCache::acquire`].
pub enum Acquired {
    /// An idle connection for this address was pooled; it's yours now.
    Hit(Node),
    /// This address is on the deny-list and hasn't expired yet.
    Dead,
    /// Nothing pooled for this address; the caller should connect fresh.
    Miss,
}

struct Inner {
    /// MRU at the front, LRU at the back.
    idle: VecDeque<Node>,
    dead: Vec<(SocketAddrV4, Instant)>,
}

pub struct NodeCache {
    inner: Mutex<Inner>,
    cache_max: usize,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_MAX)
    }

    pub fn with_capacity(cache_max: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                idle: VecDeque::new(),
                dead: Vec::new(),
            }),
            cache_max,
        }
    }

    /// Look up a node for `addr`: an idle pooled connection, a dead-list
    /// hit, or a miss (caller must create a new node).
    pub async fn acquire(&self, addr: SocketAddrV4) -> Acquired {
        let mut inner = self.inner.lock().await;

        if let Some(pos) = inner.idle.iter().position(|n| n.addr == addr) {
            let node = inner.idle.remove(pos).expect("position just checked");
            tracing::debug!(%addr, "node cache hit");
            return Acquired::Hit(node);
        }

        let now = Instant::now();
        inner.dead.retain(|(_, expiry)| *expiry > now);

        if inner.dead.iter().any(|(a, _)| *a == addr) {
            tracing::debug!(%addr, "node cache: address is dead-listed");
            return Acquired::Dead;
        }

        Acquired::Miss
    }

    /// Called when a request is done with a node. A node whose connect
    /// never completed is dead-listed for [`DEAD_TTL`]; otherwise it's
    /// pushed to the MRU end of the idle list, evicting the LRU entry if
    /// the cache is now over [`Self::with_capacity`]'s bound.
    pub async fn release(&self, node: Node) {
        let mut inner = self.inner.lock().await;
        let addr = node.addr;

        if !node.is_live() {
            drop(node); // aborts the pending connect task, closes nothing else
            inner.dead.push((addr, Instant::now() + DEAD_TTL));
            tracing::debug!(%addr, "node dead-listed (connect never completed)");
            return;
        }

        inner.idle.push_front(node);
        if inner.idle.len() > self.cache_max {
            let evicted = inner.idle.pop_back();
            tracing::trace!(addr = ?evicted.map(|n| n.addr), "evicted LRU idle node");
        }
    }

    /// Current idle pool size (for tests/observability).
    pub async fn idle_count(&self) -> usize {
        self.inner.lock().await.idle.len()
    }

    /// Pre-seed the dead-list (used by tests to exercise §8 scenario 5).
    pub async fn mark_dead_for_test(&self, addr: SocketAddrV4, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner.dead.push((addr, Instant::now() + ttl));
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new()
    }
}
