//! Version root repository: per-store snapshots and layered-node entries.
//!
//! # Responsibility
//! - Persist immutable version roots keyed by `(store, version number)`.
//! - Answer max-version and range queries used by snapshot allocation.
//! - Persist checksum/path entries of layered files frozen in a version.
//!
//! # Invariants
//! - Creating a version root raises its store's watermark, so a number is
//!   never reported free again after its row is deleted.
//! - `delete_version_root` does not remove layered entries.

use crate::model::node::NodeId;
use crate::model::store::StoreId;
use crate::model::version::{
    NewVersionRoot, VersionLayeredEntry, VersionRoot, VersionRootFilter, VersionRootId,
};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const VERSION_ROOT_SELECT_SQL: &str = "SELECT
    id,
    store_id,
    version_id,
    root_node_id,
    created_at,
    creator,
    tag,
    description
FROM avm_version_roots";

const REQUIRED_TABLES: &[&str] = &[
    "avm_version_roots",
    "avm_version_layered_entries",
    "avm_stores",
];

/// Repository interface for version roots.
pub trait VersionRootRepository {
    fn create_version_root(&self, root: &NewVersionRoot) -> RepoResult<VersionRoot>;
    /// Writes tag, description and creator; identity columns are immutable.
    fn update_version_root(&self, root: &VersionRoot) -> RepoResult<()>;
    fn get_version_root(&self, id: VersionRootId) -> RepoResult<Option<VersionRoot>>;
    fn get_by_version(&self, store_id: StoreId, version_id: i64)
        -> RepoResult<Option<VersionRoot>>;
    fn get_by_root(&self, root_node_id: NodeId) -> RepoResult<Option<VersionRoot>>;
    /// Live version root with the highest number.
    fn get_max_version(&self, store_id: StoreId) -> RepoResult<Option<VersionRoot>>;
    /// Highest number ever allocated, including deleted versions.
    fn get_max_version_id(&self, store_id: StoreId) -> RepoResult<Option<i64>>;
    fn list_version_roots(&self, store_id: StoreId) -> RepoResult<Vec<VersionRoot>>;
    fn list_version_roots_in(
        &self,
        store_id: StoreId,
        filter: VersionRootFilter,
    ) -> RepoResult<Vec<VersionRoot>>;
    fn delete_version_root(&self, id: VersionRootId) -> RepoResult<()>;

    fn create_layered_entry(&self, entry: &VersionLayeredEntry) -> RepoResult<()>;
    fn delete_layered_entries(&self, version_root_id: VersionRootId) -> RepoResult<usize>;
    fn list_layered_entries(
        &self,
        version_root_id: VersionRootId,
    ) -> RepoResult<Vec<VersionLayeredEntry>>;
}

/// SQLite-backed version root repository.
pub struct SqliteVersionRootRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteVersionRootRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    fn query_roots(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<VersionRoot>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut roots = Vec::new();
        while let Some(row) = rows.next()? {
            roots.push(parse_version_root_row(row)?);
        }
        Ok(roots)
    }

    fn query_root(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Option<VersionRoot>> {
        Ok(self.query_roots(sql, bind_values)?.into_iter().next())
    }
}

impl VersionRootRepository for SqliteVersionRootRepository<'_> {
    fn create_version_root(&self, root: &NewVersionRoot) -> RepoResult<VersionRoot> {
        self.conn.execute(
            "INSERT INTO avm_version_roots (
                store_id,
                version_id,
                root_node_id,
                created_at,
                creator,
                tag,
                description
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                root.store_id,
                root.version_id,
                root.root_node_id,
                root.created_at,
                root.creator,
                root.tag.as_deref(),
                root.description.as_deref(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.conn.execute(
            "UPDATE avm_stores
             SET next_version_id = MAX(next_version_id, ?2 + 1)
             WHERE id = ?1;",
            params![root.store_id, root.version_id],
        )?;

        Ok(VersionRoot {
            id,
            store_id: root.store_id,
            version_id: root.version_id,
            root_node_id: root.root_node_id,
            created_at: root.created_at,
            creator: root.creator.clone(),
            tag: root.tag.clone(),
            description: root.description.clone(),
        })
    }

    fn update_version_root(&self, root: &VersionRoot) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE avm_version_roots
             SET creator = ?2,
                 tag = ?3,
                 description = ?4
             WHERE id = ?1;",
            params![
                root.id,
                root.creator,
                root.tag.as_deref(),
                root.description.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("version root", root.id));
        }
        Ok(())
    }

    fn get_version_root(&self, id: VersionRootId) -> RepoResult<Option<VersionRoot>> {
        self.query_root(
            &format!("{VERSION_ROOT_SELECT_SQL} WHERE id = ?;"),
            vec![Value::Integer(id)],
        )
    }

    fn get_by_version(
        &self,
        store_id: StoreId,
        version_id: i64,
    ) -> RepoResult<Option<VersionRoot>> {
        self.query_root(
            &format!("{VERSION_ROOT_SELECT_SQL} WHERE store_id = ? AND version_id = ?;"),
            vec![Value::Integer(store_id), Value::Integer(version_id)],
        )
    }

    fn get_by_root(&self, root_node_id: NodeId) -> RepoResult<Option<VersionRoot>> {
        self.query_root(
            &format!("{VERSION_ROOT_SELECT_SQL} WHERE root_node_id = ?;"),
            vec![Value::Integer(root_node_id)],
        )
    }

    fn get_max_version(&self, store_id: StoreId) -> RepoResult<Option<VersionRoot>> {
        self.query_root(
            &format!(
                "{VERSION_ROOT_SELECT_SQL}
                 WHERE store_id = ?
                 ORDER BY version_id DESC
                 LIMIT 1;"
            ),
            vec![Value::Integer(store_id)],
        )
    }

    fn get_max_version_id(&self, store_id: StoreId) -> RepoResult<Option<i64>> {
        let max: Option<Option<i64>> = self
            .conn
            .query_row(
                "SELECT MAX(
                    COALESCE(
                        (SELECT MAX(version_id) FROM avm_version_roots WHERE store_id = s.id),
                        0
                    ),
                    s.next_version_id - 1
                 )
                 FROM avm_stores s
                 WHERE s.id = ?1;",
                [store_id],
                |row| row.get(0),
            )
            .optional()?;

        match max.flatten() {
            Some(value) if value >= 1 => Ok(Some(value)),
            Some(_) => Ok(None),
            None => {
                // Version roots of a store that no longer has a registry row.
                let live: Option<i64> = self.conn.query_row(
                    "SELECT MAX(version_id) FROM avm_version_roots WHERE store_id = ?1;",
                    [store_id],
                    |row| row.get(0),
                )?;
                Ok(live)
            }
        }
    }

    fn list_version_roots(&self, store_id: StoreId) -> RepoResult<Vec<VersionRoot>> {
        self.query_roots(
            &format!("{VERSION_ROOT_SELECT_SQL} WHERE store_id = ? ORDER BY version_id ASC;"),
            vec![Value::Integer(store_id)],
        )
    }

    fn list_version_roots_in(
        &self,
        store_id: StoreId,
        filter: VersionRootFilter,
    ) -> RepoResult<Vec<VersionRoot>> {
        let mut bind_values = vec![Value::Integer(store_id)];
        let predicate = match filter {
            VersionRootFilter::CreatedBefore(to) => {
                bind_values.push(Value::Integer(to));
                "created_at < ?"
            }
            VersionRootFilter::CreatedAfter(from) => {
                bind_values.push(Value::Integer(from));
                "created_at > ?"
            }
            VersionRootFilter::CreatedBetween { from, to } => {
                bind_values.push(Value::Integer(from));
                bind_values.push(Value::Integer(to));
                "created_at BETWEEN ? AND ?"
            }
            VersionRootFilter::VersionBefore(to) => {
                bind_values.push(Value::Integer(to));
                "version_id < ?"
            }
            VersionRootFilter::VersionAfter(from) => {
                bind_values.push(Value::Integer(from));
                "version_id > ?"
            }
            VersionRootFilter::VersionBetween { from, to } => {
                bind_values.push(Value::Integer(from));
                bind_values.push(Value::Integer(to));
                "version_id BETWEEN ? AND ?"
            }
        };

        self.query_roots(
            &format!(
                "{VERSION_ROOT_SELECT_SQL}
                 WHERE store_id = ? AND {predicate}
                 ORDER BY version_id ASC;"
            ),
            bind_values,
        )
    }

    fn delete_version_root(&self, id: VersionRootId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM avm_version_roots WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("version root", id));
        }
        Ok(())
    }

    fn create_layered_entry(&self, entry: &VersionLayeredEntry) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO avm_version_layered_entries (version_root_id, md5sum, path)
             VALUES (?1, ?2, ?3);",
            params![entry.version_root_id, entry.md5sum, entry.path],
        )?;
        Ok(())
    }

    fn delete_layered_entries(&self, version_root_id: VersionRootId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM avm_version_layered_entries WHERE version_root_id = ?1;",
            [version_root_id],
        )?;
        Ok(changed)
    }

    fn list_layered_entries(
        &self,
        version_root_id: VersionRootId,
    ) -> RepoResult<Vec<VersionLayeredEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT version_root_id, md5sum, path
             FROM avm_version_layered_entries
             WHERE version_root_id = ?1
             ORDER BY path ASC;",
        )?;
        let mut rows = stmt.query([version_root_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(VersionLayeredEntry {
                version_root_id: row.get(0)?,
                md5sum: row.get(1)?,
                path: row.get(2)?,
            });
        }
        Ok(entries)
    }
}

fn parse_version_root_row(row: &Row<'_>) -> RepoResult<VersionRoot> {
    Ok(VersionRoot {
        id: row.get("id")?,
        store_id: row.get("store_id")?,
        version_id: row.get("version_id")?,
        root_node_id: row.get("root_node_id")?,
        created_at: row.get("created_at")?,
        creator: row.get("creator")?,
        tag: row.get("tag")?,
        description: row.get("description")?,
    })
}
