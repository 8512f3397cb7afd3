//! Snapshot use-case service.
//!
//! # Responsibility
//! - Allocate gap-free version numbers and persist version roots.
//! - Purge single versions in dependency order.
//!
//! # Invariants
//! - Allocation and insert share one immediate transaction, so two
//!   concurrent snapshots of one store never receive the same number.
//! - A purged version number is never handed out again.

use crate::model::node::NodeId;
use crate::model::store::Store;
use crate::model::version::{NewVersionRoot, VersionLayeredEntry, VersionRoot};
use crate::names::NamePolicy;
use crate::repo::node_repo::{NodeRepository, SqliteNodeRepository};
use crate::repo::store_repo::{SqliteStoreRepository, StoreRepository};
use crate::repo::version_repo::{SqliteVersionRootRepository, VersionRootRepository};
use crate::service::{now_epoch_ms, set_root_flag, ServiceError, ServiceResult};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Snapshot parameters for `VersionService::create_snapshot`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub tag: Option<String>,
    pub description: Option<String>,
    pub creator: String,
    /// Copy the previous version's layered entries into the new one.
    pub carry_layered_entries: bool,
}

/// Version root lifecycle over one connection.
pub struct VersionService<'conn> {
    conn: &'conn Connection,
    policy: NamePolicy,
}

impl<'conn> VersionService<'conn> {
    pub fn new(conn: &'conn Connection, policy: NamePolicy) -> Self {
        Self { conn, policy }
    }

    /// Freezes `root_node_id` as the next version of `store_name`.
    ///
    /// # Side effects
    /// - Marks the root node `is_root`.
    /// - Advances the store's version watermark.
    /// - Emits `snapshot_create` logging events.
    pub fn create_snapshot(
        &self,
        store_name: &str,
        root_node_id: NodeId,
        request: &SnapshotRequest,
    ) -> ServiceResult<VersionRoot> {
        let result = self.create_snapshot_in_tx(store_name, root_node_id, request);
        match &result {
            Ok(root) => info!(
                "event=snapshot_create module=service status=ok store={} version_id={} root_node_id={}",
                store_name, root.version_id, root.root_node_id
            ),
            Err(err) => error!(
                "event=snapshot_create module=service status=error store={} error={}",
                store_name, err
            ),
        }
        result
    }

    fn create_snapshot_in_tx(
        &self,
        store_name: &str,
        root_node_id: NodeId,
        request: &SnapshotRequest,
    ) -> ServiceResult<VersionRoot> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stores = SqliteStoreRepository::try_new(&tx, self.policy)?;
        let nodes = SqliteNodeRepository::try_new(&tx)?;
        let versions = SqliteVersionRootRepository::try_new(&tx)?;

        let store = require_store(&stores, store_name)?;
        if nodes.get_node(root_node_id)?.is_none() {
            return Err(ServiceError::NodeNotFound(root_node_id));
        }

        let previous = versions.get_max_version(store.id)?;
        let version_id = stores.allocate_version_id(store.id)?;
        let root = versions.create_version_root(&NewVersionRoot {
            store_id: store.id,
            version_id,
            root_node_id,
            created_at: now_epoch_ms(),
            creator: request.creator.clone(),
            tag: request.tag.clone(),
            description: request.description.clone(),
        })?;
        set_root_flag(&nodes, root_node_id, true)?;

        if request.carry_layered_entries {
            if let Some(previous) = previous {
                for entry in versions.list_layered_entries(previous.id)? {
                    versions.create_layered_entry(&VersionLayeredEntry {
                        version_root_id: root.id,
                        ..entry
                    })?;
                }
            }
        }

        tx.commit()?;
        Ok(root)
    }

    /// Deletes one version: layered entries, then the root row, then the
    /// frozen root's `is_root` flag unless the store still points at it.
    pub fn purge_version(&self, store_name: &str, version_id: i64) -> ServiceResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stores = SqliteStoreRepository::try_new(&tx, self.policy)?;
        let nodes = SqliteNodeRepository::try_new(&tx)?;
        let versions = SqliteVersionRootRepository::try_new(&tx)?;

        let store = require_store(&stores, store_name)?;
        let root = versions
            .get_by_version(store.id, version_id)?
            .ok_or_else(|| ServiceError::VersionNotFound {
                store: store_name.to_string(),
                version_id,
            })?;

        let entries = versions.delete_layered_entries(root.id)?;
        versions.delete_version_root(root.id)?;
        let still_referenced = store.root_node_id == Some(root.root_node_id)
            || versions.get_by_root(root.root_node_id)?.is_some();
        if !still_referenced {
            set_root_flag(&nodes, root.root_node_id, false)?;
        }

        tx.commit()?;
        info!(
            "event=version_purge module=service status=ok store={} version_id={} layered_entries={}",
            store_name, version_id, entries
        );
        Ok(())
    }

    /// Highest live version number of `store_name`, if any.
    pub fn latest_snapshot_id(&self, store_name: &str) -> ServiceResult<Option<i64>> {
        let stores = SqliteStoreRepository::try_new(self.conn, self.policy)?;
        let versions = SqliteVersionRootRepository::try_new(self.conn)?;
        let store = require_store(&stores, store_name)?;
        Ok(versions.get_max_version(store.id)?.map(|root| root.version_id))
    }

    /// Number the next snapshot of `store_name` will receive.
    pub fn next_version_id(&self, store_name: &str) -> ServiceResult<i64> {
        let stores = SqliteStoreRepository::try_new(self.conn, self.policy)?;
        Ok(require_store(&stores, store_name)?.next_version_id)
    }

    /// Every live version of `store_name`, oldest first.
    pub fn list_versions(&self, store_name: &str) -> ServiceResult<Vec<VersionRoot>> {
        let stores = SqliteStoreRepository::try_new(self.conn, self.policy)?;
        let versions = SqliteVersionRootRepository::try_new(self.conn)?;
        let store = require_store(&stores, store_name)?;
        Ok(versions.list_version_roots(store.id)?)
    }
}

pub(crate) fn require_store<S: StoreRepository>(stores: &S, name: &str) -> ServiceResult<Store> {
    stores
        .get_store_by_name(name)?
        .ok_or_else(|| ServiceError::StoreNotFound(name.to_string()))
}
