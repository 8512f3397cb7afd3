//! Version root snapshots and their layered-node entries.

use crate::model::node::NodeId;
use crate::model::store::StoreId;

/// Internal version root identifier.
pub type VersionRootId = i64;

/// Immutable snapshot of a store at one version number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRoot {
    pub id: VersionRootId,
    pub store_id: StoreId,
    pub version_id: i64,
    pub root_node_id: NodeId,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    pub creator: String,
    pub tag: Option<String>,
    pub description: Option<String>,
}

/// Insert payload for a version root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersionRoot {
    pub store_id: StoreId,
    pub version_id: i64,
    pub root_node_id: NodeId,
    pub created_at: i64,
    pub creator: String,
    pub tag: Option<String>,
    pub description: Option<String>,
}

/// Range filters over one store's version roots.
///
/// `Before`/`After` bounds are exclusive, `Between` bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRootFilter {
    CreatedBefore(i64),
    CreatedAfter(i64),
    CreatedBetween { from: i64, to: i64 },
    VersionBefore(i64),
    VersionAfter(i64),
    VersionBetween { from: i64, to: i64 },
}

/// Checksum/path record of a layered file frozen in a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLayeredEntry {
    pub version_root_id: VersionRootId,
    pub md5sum: String,
    pub path: String,
}
