//! Lock repository: application-level subtree locks and their data rows.
//!
//! # Invariants
//! - At most one lock per `(store_name, path)`.
//! - Prefix deletes respect path segment boundaries: `/a/b` covers
//!   `/a/b` and `/a/b/c`, never `/a/bc`.

use crate::model::lock::{Lock, LockDataFilter, LockId, NewLock};
use crate::names::escape_glob;
use crate::repo::{ensure_connection_ready, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeMap;

const REQUIRED_TABLES: &[&str] = &["avm_locks", "avm_lock_data"];

/// Repository interface for subtree locks.
pub trait LockRepository {
    fn create_lock(&self, lock: &NewLock) -> RepoResult<Lock>;
    fn list_locks(&self, store_name: &str) -> RepoResult<Vec<Lock>>;
    /// Deletes locks in `store_name` under `path_prefix` (whole store when
    /// `None`) whose data matches `data_filter`, returning the count.
    fn delete_matching_locks(
        &self,
        store_name: &str,
        path_prefix: Option<&str>,
        data_filter: Option<LockDataFilter<'_>>,
    ) -> RepoResult<usize>;
}

/// SQLite-backed lock repository.
pub struct SqliteLockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLockRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    fn load_data(&self, lock_id: LockId) -> RepoResult<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(
            "SELECT data_key, data_value
             FROM avm_lock_data
             WHERE lock_id = ?1;",
        )?;
        let mut rows = stmt.query([lock_id])?;
        let mut data = BTreeMap::new();
        while let Some(row) = rows.next()? {
            data.insert(row.get(0)?, row.get(1)?);
        }
        Ok(data)
    }
}

impl LockRepository for SqliteLockRepository<'_> {
    fn create_lock(&self, lock: &NewLock) -> RepoResult<Lock> {
        self.conn.execute(
            "INSERT INTO avm_locks (store_name, path, owner) VALUES (?1, ?2, ?3);",
            params![lock.store_name, lock.path, lock.owner],
        )?;
        let id = self.conn.last_insert_rowid();

        for (key, value) in &lock.data {
            self.conn.execute(
                "INSERT INTO avm_lock_data (lock_id, data_key, data_value) VALUES (?1, ?2, ?3);",
                params![id, key, value],
            )?;
        }

        let created_at: i64 = self.conn.query_row(
            "SELECT created_at FROM avm_locks WHERE id = ?1;",
            [id],
            |row| row.get(0),
        )?;

        Ok(Lock {
            id,
            store_name: lock.store_name.clone(),
            path: lock.path.clone(),
            owner: lock.owner.clone(),
            created_at,
            data: lock.data.clone(),
        })
    }

    fn list_locks(&self, store_name: &str) -> RepoResult<Vec<Lock>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, store_name, path, owner, created_at
             FROM avm_locks
             WHERE store_name = ?1
             ORDER BY path ASC;",
        )?;
        let mut rows = stmt.query([store_name])?;
        let mut locks = Vec::new();
        while let Some(row) = rows.next()? {
            locks.push(Lock {
                id: row.get(0)?,
                store_name: row.get(1)?,
                path: row.get(2)?,
                owner: row.get(3)?,
                created_at: row.get(4)?,
                data: BTreeMap::new(),
            });
        }
        drop(rows);

        for lock in &mut locks {
            lock.data = self.load_data(lock.id)?;
        }
        Ok(locks)
    }

    fn delete_matching_locks(
        &self,
        store_name: &str,
        path_prefix: Option<&str>,
        data_filter: Option<LockDataFilter<'_>>,
    ) -> RepoResult<usize> {
        let mut sql = String::from("DELETE FROM avm_locks WHERE store_name = ?");
        let mut bind_values = vec![Value::Text(store_name.to_string())];

        if let Some(prefix) = path_prefix.map(normalize_prefix) {
            if !prefix.is_empty() {
                sql.push_str(" AND (path = ? OR path GLOB ?)");
                bind_values.push(Value::Text(prefix.to_string()));
                bind_values.push(Value::Text(format!("{}/*", escape_glob(prefix))));
            }
        }

        match data_filter {
            None => {}
            Some(LockDataFilter::Key(key)) => {
                sql.push_str(
                    " AND EXISTS (
                        SELECT 1 FROM avm_lock_data d
                        WHERE d.lock_id = avm_locks.id AND d.data_key = ?
                    )",
                );
                bind_values.push(Value::Text(key.to_string()));
            }
            Some(LockDataFilter::KeyValue(key, value)) => {
                sql.push_str(
                    " AND EXISTS (
                        SELECT 1 FROM avm_lock_data d
                        WHERE d.lock_id = avm_locks.id AND d.data_key = ? AND d.data_value = ?
                    )",
                );
                bind_values.push(Value::Text(key.to_string()));
                bind_values.push(Value::Text(value.to_string()));
            }
        }
        sql.push(';');

        let removed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(removed)
    }
}

/// Strips trailing wildcard markers and separators from a lock prefix.
///
/// An empty result means the whole store.
fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches(['%', '*', '/'])
}

#[cfg(test)]
mod tests {
    use super::normalize_prefix;

    #[test]
    fn normalize_prefix_strips_wildcards_and_separators() {
        assert_eq!(normalize_prefix("/a/b"), "/a/b");
        assert_eq!(normalize_prefix("/a/b/"), "/a/b");
        assert_eq!(normalize_prefix("/a/b%"), "/a/b");
        assert_eq!(normalize_prefix("/a/b/*"), "/a/b");
        assert_eq!(normalize_prefix("/"), "");
    }
}
