//! Persistence core of the AVM versioned node store.
//! Stores, nodes, links, version roots and locks over SQLite.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod names;
pub mod repo;
pub mod service;

pub use config::{AvmConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, open_db_in_memory_with, open_db_with, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::link::{ChildEntry, HistoryLink, MergeLink};
pub use model::lock::{Lock, LockDataFilter, NewLock};
pub use model::node::{Node, NodeFieldMask, NodeId, NodeKind};
pub use model::property::{PropertyValue, StoreProperty};
pub use model::qname::QName;
pub use model::store::{Store, StoreId};
pub use model::version::{NewVersionRoot, VersionLayeredEntry, VersionRoot, VersionRootFilter};
pub use names::NamePolicy;
pub use repo::link_repo::{LinkRepository, SqliteLinkRepository};
pub use repo::lock_repo::{LockRepository, SqliteLockRepository};
pub use repo::node_repo::{ContentUrlScan, NodeRepository, SqliteNodeRepository};
pub use repo::store_repo::{SqliteStoreRepository, StoreRepository};
pub use repo::version_repo::{SqliteVersionRootRepository, VersionRootRepository};
pub use repo::{RepoError, RepoResult, UpdateOutcome};
pub use service::lineage_service::{CommonAncestor, LineageService};
pub use service::reaper_service::{IntegrityReport, ReapSummary, ReaperService};
pub use service::store_service::{StorePurgeSummary, StoreService};
pub use service::version_service::{SnapshotRequest, VersionService};
pub use service::{ServiceError, ServiceResult};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
