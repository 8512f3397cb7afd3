//! Store (named root container) model.

use crate::model::node::NodeId;

/// Internal store identifier.
pub type StoreId = i64;

/// Named top-level container with a pointer to its current root node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    pub id: StoreId,
    /// Display name as created; lookups use the normalized key.
    pub name: String,
    pub root_node_id: Option<NodeId>,
    /// Next version number to allocate. Never decreases, so deleted
    /// version numbers are never handed out again.
    pub next_version_id: i64,
    /// Optimistic concurrency counter.
    pub version: i64,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

impl Store {
    /// Highest version number ever allocated for this store, if any.
    pub fn last_allocated_version(&self) -> Option<i64> {
        (self.next_version_id > 1).then(|| self.next_version_id - 1)
    }
}
