//! Store registry repository: named roots and their properties.
//!
//! # Responsibility
//! - Persist stores, their current root pointer and version watermark.
//! - Persist store properties and answer pattern searches over them.
//!
//! # Invariants
//! - Store names are unique under the active `NamePolicy`.
//! - `next_version_id` never decreases, whatever the caller writes.
//! - `delete_store` does not remove properties.

use crate::model::node::NodeId;
use crate::model::property::{PropertyValue, StoreProperty};
use crate::model::qname::QName;
use crate::model::store::{Store, StoreId};
use crate::names::NamePolicy;
use crate::repo::{
    ensure_connection_ready, property_from_row, property_to_columns, RepoError, RepoResult,
    UpdateOutcome,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const STORE_SELECT_SQL: &str = "SELECT
    id,
    name,
    root_node_id,
    next_version_id,
    version,
    created_at
FROM avm_stores";

const REQUIRED_TABLES: &[&str] = &["avm_stores", "avm_store_properties"];

/// Repository interface for stores and store properties.
pub trait StoreRepository {
    fn get_store(&self, id: StoreId) -> RepoResult<Option<Store>>;
    fn get_store_by_name(&self, name: &str) -> RepoResult<Option<Store>>;
    /// The store whose current root is `root_node_id`, if any.
    fn get_store_by_root(&self, root_node_id: NodeId) -> RepoResult<Option<Store>>;
    fn list_stores(&self) -> RepoResult<Vec<Store>>;
    fn create_store(&self, name: &str, root_node_id: Option<NodeId>) -> RepoResult<Store>;
    /// Rewrites name, root and watermark if `store.version` is still current.
    fn update_store(&self, store: &Store) -> RepoResult<UpdateOutcome>;
    fn delete_store(&self, id: StoreId) -> RepoResult<()>;
    /// Hands out the next version number and advances the watermark.
    fn allocate_version_id(&self, id: StoreId) -> RepoResult<i64>;

    fn insert_property(&self, store_id: StoreId, name: &QName, value: &PropertyValue)
        -> RepoResult<()>;
    fn update_property(&self, store_id: StoreId, name: &QName, value: &PropertyValue)
        -> RepoResult<()>;
    fn get_property(&self, store_id: StoreId, name: &QName) -> RepoResult<Option<PropertyValue>>;
    fn get_properties(&self, store_id: StoreId) -> RepoResult<BTreeMap<QName, PropertyValue>>;
    fn delete_property(&self, store_id: StoreId, name: &QName) -> RepoResult<bool>;
    fn delete_properties(&self, store_id: StoreId) -> RepoResult<usize>;
    /// Properties whose namespace and local name match the `%`/`_` patterns,
    /// in one store or across all stores.
    fn find_properties(
        &self,
        store_id: Option<StoreId>,
        namespace_pattern: &str,
        local_name_pattern: &str,
    ) -> RepoResult<Vec<StoreProperty>>;
}

/// SQLite-backed store repository.
pub struct SqliteStoreRepository<'conn> {
    conn: &'conn Connection,
    policy: NamePolicy,
}

impl<'conn> SqliteStoreRepository<'conn> {
    /// Creates repository from a migrated connection and the name policy.
    pub fn try_new(conn: &'conn Connection, policy: NamePolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, policy })
    }

    fn query_one(&self, sql: &str, bind: Value) -> RepoResult<Option<Store>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([bind])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_store_row(row)?));
        }
        Ok(None)
    }
}

impl StoreRepository for SqliteStoreRepository<'_> {
    fn get_store(&self, id: StoreId) -> RepoResult<Option<Store>> {
        self.query_one(
            &format!("{STORE_SELECT_SQL} WHERE id = ?1;"),
            Value::Integer(id),
        )
    }

    fn get_store_by_name(&self, name: &str) -> RepoResult<Option<Store>> {
        self.query_one(
            &format!("{STORE_SELECT_SQL} WHERE name_key = ?1;"),
            Value::Text(self.policy.key(name).into_owned()),
        )
    }

    fn get_store_by_root(&self, root_node_id: NodeId) -> RepoResult<Option<Store>> {
        self.query_one(
            &format!("{STORE_SELECT_SQL} WHERE root_node_id = ?1;"),
            Value::Integer(root_node_id),
        )
    }

    fn list_stores(&self) -> RepoResult<Vec<Store>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STORE_SELECT_SQL} ORDER BY name_key ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut stores = Vec::new();
        while let Some(row) = rows.next()? {
            stores.push(parse_store_row(row)?);
        }
        Ok(stores)
    }

    fn create_store(&self, name: &str, root_node_id: Option<NodeId>) -> RepoResult<Store> {
        let key = self.policy.key(name);
        self.conn.execute(
            "INSERT INTO avm_stores (name, name_key, root_node_id) VALUES (?1, ?2, ?3);",
            params![name, &*key, root_node_id],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_store(id)?
            .ok_or_else(|| RepoError::not_found("store", id))
    }

    fn update_store(&self, store: &Store) -> RepoResult<UpdateOutcome> {
        let key = self.policy.key(&store.name);
        let changed = self.conn.execute(
            "UPDATE avm_stores
             SET name = ?3,
                 name_key = ?4,
                 root_node_id = ?5,
                 next_version_id = MAX(next_version_id, ?6),
                 version = version + 1
             WHERE id = ?1 AND version = ?2;",
            params![
                store.id,
                store.version,
                store.name,
                &*key,
                store.root_node_id,
                store.next_version_id,
            ],
        )?;
        if changed == 1 {
            return Ok(UpdateOutcome::Applied {
                version: store.version + 1,
            });
        }

        let actual: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM avm_stores WHERE id = ?1;",
                [store.id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match actual {
            None => UpdateOutcome::NotFound,
            Some(actual) => UpdateOutcome::Conflict {
                expected: store.version,
                actual,
            },
        })
    }

    fn delete_store(&self, id: StoreId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM avm_stores WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("store", id));
        }
        Ok(())
    }

    fn allocate_version_id(&self, id: StoreId) -> RepoResult<i64> {
        let allocated: Option<i64> = self
            .conn
            .query_row(
                "UPDATE avm_stores
                 SET next_version_id = next_version_id + 1
                 WHERE id = ?1
                 RETURNING next_version_id - 1;",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        allocated.ok_or_else(|| RepoError::not_found("store", id))
    }

    fn insert_property(
        &self,
        store_id: StoreId,
        name: &QName,
        value: &PropertyValue,
    ) -> RepoResult<()> {
        let columns = property_to_columns(value)?;
        self.conn.execute(
            "INSERT INTO avm_store_properties (
                store_id,
                namespace,
                local_name,
                value_kind,
                long_value,
                double_value,
                text_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                store_id,
                name.namespace,
                name.local_name,
                columns.kind,
                columns.long_value,
                columns.double_value,
                columns.text_value,
            ],
        )?;
        Ok(())
    }

    fn update_property(
        &self,
        store_id: StoreId,
        name: &QName,
        value: &PropertyValue,
    ) -> RepoResult<()> {
        let columns = property_to_columns(value)?;
        let changed = self.conn.execute(
            "UPDATE avm_store_properties
             SET value_kind = ?4,
                 long_value = ?5,
                 double_value = ?6,
                 text_value = ?7
             WHERE store_id = ?1 AND namespace = ?2 AND local_name = ?3;",
            params![
                store_id,
                name.namespace,
                name.local_name,
                columns.kind,
                columns.long_value,
                columns.double_value,
                columns.text_value,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(
                "store property",
                format!("{store_id}/{name}"),
            ));
        }
        Ok(())
    }

    fn get_property(&self, store_id: StoreId, name: &QName) -> RepoResult<Option<PropertyValue>> {
        let mut stmt = self.conn.prepare(
            "SELECT value_kind, long_value, double_value, text_value
             FROM avm_store_properties
             WHERE store_id = ?1 AND namespace = ?2 AND local_name = ?3;",
        )?;
        let mut rows = stmt.query(params![store_id, name.namespace, name.local_name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(property_from_row(row)?));
        }
        Ok(None)
    }

    fn get_properties(&self, store_id: StoreId) -> RepoResult<BTreeMap<QName, PropertyValue>> {
        let properties = self.find_properties(Some(store_id), "%", "%")?;
        Ok(properties
            .into_iter()
            .map(|property| (property.name, property.value))
            .collect())
    }

    fn delete_property(&self, store_id: StoreId, name: &QName) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM avm_store_properties
             WHERE store_id = ?1 AND namespace = ?2 AND local_name = ?3;",
            params![store_id, name.namespace, name.local_name],
        )?;
        Ok(changed > 0)
    }

    fn delete_properties(&self, store_id: StoreId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM avm_store_properties WHERE store_id = ?1;",
            [store_id],
        )?;
        Ok(changed)
    }

    fn find_properties(
        &self,
        store_id: Option<StoreId>,
        namespace_pattern: &str,
        local_name_pattern: &str,
    ) -> RepoResult<Vec<StoreProperty>> {
        let mut sql = String::from(
            "SELECT store_id, namespace, local_name, value_kind, long_value, double_value, text_value
             FROM avm_store_properties
             WHERE namespace GLOB ? AND local_name GLOB ?",
        );
        let mut bind_values = vec![
            Value::Text(crate::names::like_to_glob(namespace_pattern)),
            Value::Text(crate::names::like_to_glob(local_name_pattern)),
        ];
        if let Some(store_id) = store_id {
            sql.push_str(" AND store_id = ?");
            bind_values.push(Value::Integer(store_id));
        }
        sql.push_str(" ORDER BY store_id ASC, namespace ASC, local_name ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(StoreProperty {
                store_id: row.get("store_id")?,
                name: QName::new(
                    row.get::<_, String>("namespace")?,
                    row.get::<_, String>("local_name")?,
                ),
                value: property_from_row(row)?,
            });
        }
        Ok(properties)
    }
}

fn parse_store_row(row: &Row<'_>) -> RepoResult<Store> {
    Ok(Store {
        id: row.get("id")?,
        name: row.get("name")?,
        root_node_id: row.get("root_node_id")?,
        next_version_id: row.get("next_version_id")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
    })
}
