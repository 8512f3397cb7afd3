//! Node link repository: child entries, history links and merge links.
//!
//! # Responsibility
//! - Persist name-indexed containment edges between directory and child.
//! - Persist version lineage (history) and merge provenance edges.
//!
//! # Invariants
//! - Every name is folded through one `NamePolicy` before insert, lookup,
//!   pattern match and delete; `(parent, name key)` is unique.
//! - A node has at most one history ancestor and is the target of at most
//!   one merge.

use crate::model::link::{ChildEntry, HistoryLink, MergeLink};
use crate::model::node::NodeId;
use crate::names::NamePolicy;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REQUIRED_TABLES: &[&str] = &["avm_child_entries", "avm_history_links", "avm_merge_links"];

/// Repository interface for node graph edges.
pub trait LinkRepository {
    fn get_child_entry(&self, parent_id: NodeId, name: &str) -> RepoResult<Option<ChildEntry>>;
    fn get_child_entry_by_child(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
    ) -> RepoResult<Option<ChildEntry>>;
    /// Entries under `parent_id`, optionally filtered by a `%`/`_` pattern.
    fn list_child_entries(
        &self,
        parent_id: NodeId,
        name_pattern: Option<&str>,
    ) -> RepoResult<Vec<ChildEntry>>;
    /// Every entry that references `child_id`, across all parents.
    fn list_parent_entries(&self, child_id: NodeId) -> RepoResult<Vec<ChildEntry>>;
    /// Fails with a constraint violation if the name is taken under the parent.
    fn create_child_entry(&self, entry: &ChildEntry) -> RepoResult<()>;
    /// Renames the entry identified by `(parent_id, child_id)`.
    fn rename_child_entry(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
        new_name: &str,
    ) -> RepoResult<()>;
    fn delete_child_entry(&self, parent_id: NodeId, name: &str) -> RepoResult<bool>;
    fn delete_child_entry_by_child(&self, parent_id: NodeId, child_id: NodeId)
        -> RepoResult<bool>;
    fn delete_child_entries(&self, parent_id: NodeId) -> RepoResult<usize>;

    fn create_merge_link(&self, link: MergeLink) -> RepoResult<()>;
    fn delete_merge_link(&self, link: MergeLink) -> RepoResult<bool>;
    fn list_merge_links_from(&self, merge_from_id: NodeId) -> RepoResult<Vec<MergeLink>>;
    fn get_merge_link_to(&self, merge_to_id: NodeId) -> RepoResult<Option<MergeLink>>;

    fn create_history_link(&self, link: HistoryLink) -> RepoResult<()>;
    fn delete_history_link(&self, link: HistoryLink) -> RepoResult<bool>;
    /// The single direct predecessor of `descendant_id`, if any.
    fn get_history_link_by_descendant(
        &self,
        descendant_id: NodeId,
    ) -> RepoResult<Option<HistoryLink>>;
    fn get_history_link(
        &self,
        ancestor_id: NodeId,
        descendant_id: NodeId,
    ) -> RepoResult<Option<HistoryLink>>;
    fn list_history_links_by_ancestor(&self, ancestor_id: NodeId) -> RepoResult<Vec<HistoryLink>>;
}

/// SQLite-backed link repository.
pub struct SqliteLinkRepository<'conn> {
    conn: &'conn Connection,
    policy: NamePolicy,
}

impl<'conn> SqliteLinkRepository<'conn> {
    /// Creates repository from a migrated connection and the name policy.
    pub fn try_new(conn: &'conn Connection, policy: NamePolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, policy })
    }

    fn query_entries(
        &self,
        sql: &str,
        bind: impl rusqlite::Params,
    ) -> RepoResult<Vec<ChildEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_child_entry_row(row)?);
        }
        Ok(entries)
    }

    fn query_history(&self, sql: &str, id: NodeId) -> RepoResult<Vec<HistoryLink>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([id])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(HistoryLink {
                ancestor_id: row.get("ancestor_id")?,
                descendant_id: row.get("descendant_id")?,
            });
        }
        Ok(links)
    }
}

impl LinkRepository for SqliteLinkRepository<'_> {
    fn get_child_entry(&self, parent_id: NodeId, name: &str) -> RepoResult<Option<ChildEntry>> {
        let key = self.policy.key(name);
        let entry = self
            .conn
            .query_row(
                "SELECT parent_id, name, child_id
                 FROM avm_child_entries
                 WHERE parent_id = ?1 AND name_key = ?2;",
                params![parent_id, &*key],
                |row| Ok(ChildEntry::new(row.get(0)?, row.get::<_, String>(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(entry)
    }

    fn get_child_entry_by_child(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
    ) -> RepoResult<Option<ChildEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT parent_id, name, child_id
                 FROM avm_child_entries
                 WHERE parent_id = ?1 AND child_id = ?2;",
                params![parent_id, child_id],
                |row| Ok(ChildEntry::new(row.get(0)?, row.get::<_, String>(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(entry)
    }

    fn list_child_entries(
        &self,
        parent_id: NodeId,
        name_pattern: Option<&str>,
    ) -> RepoResult<Vec<ChildEntry>> {
        match name_pattern {
            None => self.query_entries(
                "SELECT parent_id, name, child_id
                 FROM avm_child_entries
                 WHERE parent_id = ?1
                 ORDER BY name_key ASC;",
                [parent_id],
            ),
            Some(pattern) => self.query_entries(
                "SELECT parent_id, name, child_id
                 FROM avm_child_entries
                 WHERE parent_id = ?1 AND name_key GLOB ?2
                 ORDER BY name_key ASC;",
                params![parent_id, self.policy.glob_pattern(pattern)],
            ),
        }
    }

    fn list_parent_entries(&self, child_id: NodeId) -> RepoResult<Vec<ChildEntry>> {
        self.query_entries(
            "SELECT parent_id, name, child_id
             FROM avm_child_entries
             WHERE child_id = ?1
             ORDER BY parent_id ASC;",
            [child_id],
        )
    }

    fn create_child_entry(&self, entry: &ChildEntry) -> RepoResult<()> {
        let key = self.policy.key(&entry.name);
        self.conn.execute(
            "INSERT INTO avm_child_entries (parent_id, name, name_key, child_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![entry.parent_id, entry.name, &*key, entry.child_id],
        )?;
        Ok(())
    }

    fn rename_child_entry(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
        new_name: &str,
    ) -> RepoResult<()> {
        let key = self.policy.key(new_name);
        let changed = self.conn.execute(
            "UPDATE avm_child_entries
             SET name = ?3, name_key = ?4
             WHERE parent_id = ?1 AND child_id = ?2;",
            params![parent_id, child_id, new_name, &*key],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(
                "child entry",
                format!("{parent_id}->{child_id}"),
            ));
        }
        Ok(())
    }

    fn delete_child_entry(&self, parent_id: NodeId, name: &str) -> RepoResult<bool> {
        let key = self.policy.key(name);
        let changed = self.conn.execute(
            "DELETE FROM avm_child_entries WHERE parent_id = ?1 AND name_key = ?2;",
            params![parent_id, &*key],
        )?;
        Ok(changed > 0)
    }

    fn delete_child_entry_by_child(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM avm_child_entries WHERE parent_id = ?1 AND child_id = ?2;",
            params![parent_id, child_id],
        )?;
        Ok(changed > 0)
    }

    fn delete_child_entries(&self, parent_id: NodeId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM avm_child_entries WHERE parent_id = ?1;",
            [parent_id],
        )?;
        Ok(changed)
    }

    fn create_merge_link(&self, link: MergeLink) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO avm_merge_links (merge_from_id, merge_to_id) VALUES (?1, ?2);",
            params![link.merge_from_id, link.merge_to_id],
        )?;
        Ok(())
    }

    fn delete_merge_link(&self, link: MergeLink) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM avm_merge_links WHERE merge_from_id = ?1 AND merge_to_id = ?2;",
            params![link.merge_from_id, link.merge_to_id],
        )?;
        Ok(changed > 0)
    }

    fn list_merge_links_from(&self, merge_from_id: NodeId) -> RepoResult<Vec<MergeLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT merge_from_id, merge_to_id
             FROM avm_merge_links
             WHERE merge_from_id = ?1
             ORDER BY merge_to_id ASC;",
        )?;
        let mut rows = stmt.query([merge_from_id])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(MergeLink {
                merge_from_id: row.get(0)?,
                merge_to_id: row.get(1)?,
            });
        }
        Ok(links)
    }

    fn get_merge_link_to(&self, merge_to_id: NodeId) -> RepoResult<Option<MergeLink>> {
        let link = self
            .conn
            .query_row(
                "SELECT merge_from_id, merge_to_id
                 FROM avm_merge_links
                 WHERE merge_to_id = ?1;",
                [merge_to_id],
                |row| {
                    Ok(MergeLink {
                        merge_from_id: row.get(0)?,
                        merge_to_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(link)
    }

    fn create_history_link(&self, link: HistoryLink) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO avm_history_links (ancestor_id, descendant_id) VALUES (?1, ?2);",
            params![link.ancestor_id, link.descendant_id],
        )?;
        Ok(())
    }

    fn delete_history_link(&self, link: HistoryLink) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM avm_history_links WHERE ancestor_id = ?1 AND descendant_id = ?2;",
            params![link.ancestor_id, link.descendant_id],
        )?;
        Ok(changed > 0)
    }

    fn get_history_link_by_descendant(
        &self,
        descendant_id: NodeId,
    ) -> RepoResult<Option<HistoryLink>> {
        let links = self.query_history(
            "SELECT ancestor_id, descendant_id
             FROM avm_history_links
             WHERE descendant_id = ?1;",
            descendant_id,
        )?;
        Ok(links.into_iter().next())
    }

    fn get_history_link(
        &self,
        ancestor_id: NodeId,
        descendant_id: NodeId,
    ) -> RepoResult<Option<HistoryLink>> {
        let found = self
            .conn
            .query_row(
                "SELECT 1
                 FROM avm_history_links
                 WHERE ancestor_id = ?1 AND descendant_id = ?2;",
                params![ancestor_id, descendant_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.map(|()| HistoryLink {
            ancestor_id,
            descendant_id,
        }))
    }

    fn list_history_links_by_ancestor(&self, ancestor_id: NodeId) -> RepoResult<Vec<HistoryLink>> {
        self.query_history(
            "SELECT ancestor_id, descendant_id
             FROM avm_history_links
             WHERE ancestor_id = ?1
             ORDER BY descendant_id ASC;",
            ancestor_id,
        )
    }
}

fn parse_child_entry_row(row: &Row<'_>) -> RepoResult<ChildEntry> {
    Ok(ChildEntry {
        parent_id: row.get("parent_id")?,
        name: row.get("name")?,
        child_id: row.get("child_id")?,
    })
}
