//! Store lifecycle service.
//!
//! # Responsibility
//! - Validate store names and reject duplicates under the name policy.
//! - Create, rename and purge stores in dependency order.
//! - Answer administrative property searches grouped by store.
//!
//! # Invariants
//! - A new store always points at a fresh root directory flagged `is_root`.
//! - Purge never deletes nodes; unreachable nodes are left to the reaper.

use crate::model::node::Node;
use crate::model::property::StoreProperty;
use crate::model::store::Store;
use crate::names::NamePolicy;
use crate::repo::node_repo::{NodeRepository, SqliteNodeRepository};
use crate::repo::store_repo::{SqliteStoreRepository, StoreRepository};
use crate::repo::version_repo::{SqliteVersionRootRepository, VersionRootRepository};
use crate::repo::UpdateOutcome;
use crate::service::version_service::require_store;
use crate::service::{now_epoch_ms, set_root_flag, ServiceError, ServiceResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;

// No path separators or colons; no surrounding whitespace.
static STORE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^:/\\\s](?:[^:/\\]*[^:/\\\s])?$").expect("valid store name regex")
});

/// Rows touched by `StoreService::purge_store`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorePurgeSummary {
    pub versions: usize,
    pub layered_entries: usize,
    pub new_nodes_cleared: usize,
    pub properties: usize,
}

/// Store lifecycle over one connection.
pub struct StoreService<'conn> {
    conn: &'conn Connection,
    policy: NamePolicy,
}

impl<'conn> StoreService<'conn> {
    pub fn new(conn: &'conn Connection, policy: NamePolicy) -> Self {
        Self { conn, policy }
    }

    /// Creates `name` with an empty root directory.
    pub fn create_store(&self, name: &str) -> ServiceResult<Store> {
        validate_store_name(name)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stores = SqliteStoreRepository::try_new(&tx, self.policy)?;
        let nodes = SqliteNodeRepository::try_new(&tx)?;

        if stores.get_store_by_name(name)?.is_some() {
            return Err(ServiceError::StoreExists(name.to_string()));
        }

        let mut root = Node::plain_directory(now_epoch_ms());
        root.is_root = true;
        let root = nodes.create_node(&root)?;
        let store = stores.create_store(name, root.id)?;

        tx.commit()?;
        Ok(store)
    }

    /// Renames a store; a case-only rename of the same store is allowed.
    pub fn rename_store(&self, from: &str, to: &str) -> ServiceResult<Store> {
        validate_store_name(to)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stores = SqliteStoreRepository::try_new(&tx, self.policy)?;

        let mut store = require_store(&stores, from)?;
        if let Some(existing) = stores.get_store_by_name(to)? {
            if existing.id != store.id {
                return Err(ServiceError::StoreExists(to.to_string()));
            }
        }

        store.name = to.to_string();
        match stores.update_store(&store)? {
            UpdateOutcome::Applied { version } => store.version = version,
            UpdateOutcome::NotFound => return Err(ServiceError::StoreNotFound(from.to_string())),
            UpdateOutcome::Conflict { expected, actual } => {
                return Err(ServiceError::Conflict {
                    entity: "store",
                    expected,
                    actual,
                })
            }
        }

        tx.commit()?;
        Ok(store)
    }

    /// Removes a store and everything keyed by it except nodes.
    ///
    /// # Side effects
    /// - Clears `is_root` on the current root and every version root.
    /// - Clears new-in-store marks left by an open generation.
    /// - Emits a `store_purge` logging event.
    pub fn purge_store(&self, name: &str) -> ServiceResult<StorePurgeSummary> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stores = SqliteStoreRepository::try_new(&tx, self.policy)?;
        let nodes = SqliteNodeRepository::try_new(&tx)?;
        let versions = SqliteVersionRootRepository::try_new(&tx)?;

        let store = require_store(&stores, name)?;
        let mut summary = StorePurgeSummary::default();

        if let Some(root_id) = store.root_node_id {
            set_root_flag(&nodes, root_id, false)?;
        }
        for root in versions.list_version_roots(store.id)? {
            set_root_flag(&nodes, root.root_node_id, false)?;
            summary.layered_entries += versions.delete_layered_entries(root.id)?;
            versions.delete_version_root(root.id)?;
            summary.versions += 1;
        }
        summary.new_nodes_cleared = nodes.clear_new_in_store(store.id)?;
        summary.properties = stores.delete_properties(store.id)?;
        stores.delete_store(store.id)?;

        tx.commit()?;
        info!(
            "event=store_purge module=service status=ok store={} versions={} layered_entries={} new_nodes_cleared={} properties={}",
            name,
            summary.versions,
            summary.layered_entries,
            summary.new_nodes_cleared,
            summary.properties
        );
        Ok(summary)
    }

    /// Store properties matching the `%`/`_` patterns, grouped by store name.
    pub fn query_stores_property_keys(
        &self,
        namespace_pattern: &str,
        local_name_pattern: &str,
    ) -> ServiceResult<BTreeMap<String, Vec<StoreProperty>>> {
        let stores = SqliteStoreRepository::try_new(self.conn, self.policy)?;
        let names: BTreeMap<_, _> = stores
            .list_stores()?
            .into_iter()
            .map(|store| (store.id, store.name))
            .collect();

        let mut grouped: BTreeMap<String, Vec<StoreProperty>> = BTreeMap::new();
        for property in stores.find_properties(None, namespace_pattern, local_name_pattern)? {
            if let Some(name) = names.get(&property.store_id) {
                grouped.entry(name.clone()).or_default().push(property);
            }
        }
        Ok(grouped)
    }
}

/// Rejects blank names and names containing `:`, `/` or `\`.
pub fn validate_store_name(name: &str) -> ServiceResult<()> {
    if STORE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStoreName(name.to_string()))
    }
}
