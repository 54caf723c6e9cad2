use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, warn};

/// Number of virtual points per node used by [`Ring::default`].
pub const DEFAULT_REPLICAS: usize = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("no node exists in the ring")]
    NoNodeExists,

    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node identifier must not be empty")]
    InvalidNode,
}

/// State guarded by the ring's lock.
///
/// Invariant: `sorted_points` is always exactly the ascending key set of
/// `points`, and every member of `nodes` owns its full set of virtual
/// points in `points` (modulo hash collisions, which overwrite).
#[derive(Default)]
struct RingState {
    /// Physical-node membership.
    nodes: HashSet<String>,

    /// Virtual hash point -> owning node.
    points: HashMap<u32, String>,

    /// Ascending view of the keys of `points`, rebuilt wholesale on every
    /// membership change.
    sorted_points: Vec<u32>,
}

impl RingState {
    fn rebuild_sorted(&mut self) {
        self.sorted_points = self.points.keys().copied().collect();
        self.sorted_points.sort_unstable();
    }
}

/// A consistent hash ring.
///
/// Maps string-named nodes onto points of the 32-bit hash circle and routes
/// each lookup key to the nearest node clockwise, so that membership changes
/// redistribute only a bounded fraction of keys. All methods take `&self`;
/// the ring is safe to share across threads (typically behind an `Arc`),
/// with lookups taking a shared lock and membership changes an exclusive
/// one.
pub struct Ring {
    /// The number of virtual points placed on the circle per node.
    replicas: usize,

    state: RwLock<RingState>,
}

impl Default for Ring {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}

impl Ring {
    /// Create an empty ring with `replicas` virtual points per node.
    pub fn new(replicas: usize) -> Self {
        Ring {
            replicas,
            state: RwLock::new(RingState::default()),
        }
    }

    /// Create a ring pre-populated with an initial node set.
    ///
    /// Duplicate and empty identifiers in the initial set are skipped.
    pub fn with_nodes<I, S>(replicas: usize, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ring = Self::new(replicas);
        for node in nodes {
            let node: &str = node.as_ref();
            if let Err(err) = ring.add_node(node) {
                debug!(node, %err, "skipping initial node");
            }
        }
        ring
    }

    /// The number of virtual points placed per node, fixed at construction.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Register a new node on the ring.
    ///
    /// Places `replicas` virtual points for the node and rebuilds the
    /// sorted index before releasing the lock, so concurrent lookups never
    /// observe a half-updated ring.
    pub fn add_node(&self, node: &str) -> Result<(), RingError> {
        if node.is_empty() {
            return Err(RingError::InvalidNode);
        }

        let mut state = self.state.write().expect("ring lock poisoned");
        if state.nodes.contains(node) {
            return Err(RingError::NodeAlreadyExists(node.to_string()));
        }

        for index in 0..self.replicas {
            let point = hash_point(&virtual_point(node, index));
            if let Some(previous) = state.points.insert(point, node.to_string()) {
                warn!(point, node, %previous, "virtual point collision, overwriting");
            }
        }
        state.nodes.insert(node.to_string());
        state.rebuild_sorted();

        debug!(
            node,
            nodes = state.nodes.len(),
            points = state.sorted_points.len(),
            "node added to ring"
        );
        Ok(())
    }

    /// Remove a node from the ring.
    ///
    /// Recomputes the exact virtual points placed by [`Ring::add_node`] and
    /// deletes them; keys previously routed to this node fall through to
    /// the next node clockwise.
    pub fn remove_node(&self, node: &str) -> Result<(), RingError> {
        let mut state = self.state.write().expect("ring lock poisoned");
        if !state.nodes.remove(node) {
            return Err(RingError::NodeNotFound(node.to_string()));
        }

        for index in 0..self.replicas {
            let point = hash_point(&virtual_point(node, index));
            state.points.remove(&point);
        }
        state.rebuild_sorted();

        debug!(
            node,
            nodes = state.nodes.len(),
            points = state.sorted_points.len(),
            "node removed from ring"
        );
        Ok(())
    }

    /// Get the node responsible for the given key.
    ///
    /// Hashes the key to a point on the circle and selects the smallest
    /// ring point at or after it, wrapping to the smallest point overall
    /// when the key hashes past every placed point. For a fixed membership
    /// this is a pure function of the key.
    pub fn get_node(&self, key: &str) -> Result<String, RingError> {
        let state = self.state.read().expect("ring lock poisoned");
        if state.sorted_points.is_empty() {
            return Err(RingError::NoNodeExists);
        }

        let point = hash_point(key);
        let index = state.sorted_points.partition_point(|&p| p < point);
        let selected = if index == state.sorted_points.len() {
            state.sorted_points[0]
        } else {
            state.sorted_points[index]
        };

        let owner = state
            .points
            .get(&selected)
            .expect("sorted_points out of sync with points");
        Ok(owner.clone())
    }

    /// Whether `node` is currently a member of the ring.
    pub fn contains_node(&self, node: &str) -> bool {
        self.state.read().expect("ring lock poisoned").nodes.contains(node)
    }

    /// Current physical-node membership, in unspecified order.
    pub fn nodes(&self) -> Vec<String> {
        let state = self.state.read().expect("ring lock poisoned");
        state.nodes.iter().cloned().collect()
    }

    /// The number of physical nodes on the ring.
    pub fn len(&self) -> usize {
        self.state.read().expect("ring lock poisoned").nodes.len()
    }

    /// Whether the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.state.read().expect("ring lock poisoned").nodes.is_empty()
    }

    /// Reset the ring to the empty state, keeping the replica count.
    pub fn clear(&self) {
        let mut state = self.state.write().expect("ring lock poisoned");
        *state = RingState::default();
        debug!("ring cleared");
    }
}

/// Deterministic pre-hash name of one virtual point.
///
/// The separator keeps distinct `(node, index)` pairs distinct before
/// hashing ("a", 12 vs "a1", 2).
fn virtual_point(node: &str, index: usize) -> String {
    format!("{node}-{index}")
}

fn hash_point(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}
