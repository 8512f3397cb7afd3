//! Node entity repository: nodes, aspects, properties and integrity scans.
//!
//! # Responsibility
//! - Persist node rows and their aspect/property side tables.
//! - Provide the bulk scans used by commit diffs and garbage collection.
//!
//! # Invariants
//! - Every update is guarded by the caller's `version` and advances it by one.
//! - `delete_node` removes only the node row; aspects, properties and links
//!   are the caller's to remove first.
//! - An orphan is a non-root node that no child entry points at.

use crate::model::node::{Node, NodeFieldMask, NodeId, NodeKind};
use crate::model::property::PropertyValue;
use crate::model::qname::QName;
use crate::model::store::StoreId;
use crate::repo::{
    bool_to_int, ensure_connection_ready, int_to_bool, parse_uuid, property_from_row,
    property_to_columns, RepoError, RepoResult, UpdateOutcome,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, VecDeque};

const NODE_SELECT_SQL: &str = "SELECT
    id,
    kind,
    version,
    guid,
    store_new_id,
    is_root,
    is_primary,
    created_at,
    modified_at,
    content_url,
    content_size,
    indirection,
    indirection_version,
    layer_id,
    opacity
FROM avm_nodes";

const REQUIRED_TABLES: &[&str] = &["avm_nodes", "avm_aspects", "avm_node_properties"];

/// Repository interface for node rows and their side tables.
pub trait NodeRepository {
    /// Inserts a node, keeping `node.id` when set. Returns the stored row.
    fn create_node(&self, node: &Node) -> RepoResult<Node>;
    fn get_node(&self, id: NodeId) -> RepoResult<Option<Node>>;
    /// Writes the column groups in `mask` if `node.version` is still current.
    fn update_node(&self, node: &Node, mask: NodeFieldMask) -> RepoResult<UpdateOutcome>;
    fn delete_node(&self, id: NodeId) -> RepoResult<()>;

    /// Adds an aspect; adding an existing aspect is a no-op.
    fn add_aspect(&self, node_id: NodeId, aspect: &QName) -> RepoResult<()>;
    /// Returns whether the aspect was present.
    fn remove_aspect(&self, node_id: NodeId, aspect: &QName) -> RepoResult<bool>;
    fn remove_all_aspects(&self, node_id: NodeId) -> RepoResult<usize>;
    fn list_aspects(&self, node_id: NodeId) -> RepoResult<Vec<QName>>;
    fn has_aspect(&self, node_id: NodeId, aspect: &QName) -> RepoResult<bool>;

    fn insert_property(&self, node_id: NodeId, name: &QName, value: &PropertyValue)
        -> RepoResult<()>;
    fn update_property(&self, node_id: NodeId, name: &QName, value: &PropertyValue)
        -> RepoResult<()>;
    fn get_property(&self, node_id: NodeId, name: &QName) -> RepoResult<Option<PropertyValue>>;
    fn get_properties(&self, node_id: NodeId) -> RepoResult<BTreeMap<QName, PropertyValue>>;
    fn delete_property(&self, node_id: NodeId, name: &QName) -> RepoResult<bool>;
    fn delete_properties(&self, node_id: NodeId) -> RepoResult<usize>;

    /// Nodes created in `store_id`'s open generation.
    fn new_in_store(&self, store_id: StoreId) -> RepoResult<Vec<Node>>;
    /// Layered subset of `new_in_store`.
    fn new_layered_in_store(&self, store_id: StoreId) -> RepoResult<Vec<Node>>;
    /// Clears the new-in-store marker after commit. Returns rows touched.
    fn clear_new_in_store(&self, store_id: StoreId) -> RepoResult<usize>;
    /// At most `limit` orphans, lowest ids first.
    fn orphans(&self, limit: u32) -> RepoResult<Vec<Node>>;
    /// Primary layered directories.
    fn layered_directories(&self) -> RepoResult<Vec<Node>>;
    fn layered_files(&self) -> RepoResult<Vec<Node>>;
    /// One page of `(node id, content url)` for plain files with content,
    /// ordered by id and starting after `after`.
    fn content_url_page(
        &self,
        after: Option<NodeId>,
        limit: u32,
    ) -> RepoResult<Vec<(NodeId, String)>>;

    /// Lazily enumerates every plain-file content locator.
    fn content_urls(&self, batch_size: u32) -> ContentUrlScan<'_, Self>
    where
        Self: Sized,
    {
        ContentUrlScan::new(self, batch_size)
    }
}

/// Pull-based scan over plain-file content locators.
///
/// Pages are fetched on demand; dropping the iterator ends the scan. After
/// an error is yielded the scan is finished.
pub struct ContentUrlScan<'r, R: NodeRepository> {
    repo: &'r R,
    batch_size: u32,
    last_id: Option<NodeId>,
    buffer: VecDeque<(NodeId, String)>,
    exhausted: bool,
}

impl<'r, R: NodeRepository> ContentUrlScan<'r, R> {
    pub fn new(repo: &'r R, batch_size: u32) -> Self {
        Self {
            repo,
            batch_size: batch_size.max(1),
            last_id: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<R: NodeRepository> Iterator for ContentUrlScan<'_, R> {
    type Item = RepoResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.repo.content_url_page(self.last_id, self.batch_size) {
                Ok(page) => {
                    if (page.len() as u32) < self.batch_size {
                        self.exhausted = true;
                    }
                    self.buffer.extend(page);
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }

        let (id, url) = self.buffer.pop_front()?;
        self.last_id = Some(id);
        Some(Ok(url))
    }
}

/// SQLite-backed node repository.
pub struct SqliteNodeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    fn query_nodes(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }
}

impl NodeRepository for SqliteNodeRepository<'_> {
    fn create_node(&self, node: &Node) -> RepoResult<Node> {
        self.conn.execute(
            "INSERT INTO avm_nodes (
                id,
                kind,
                version,
                guid,
                store_new_id,
                is_root,
                is_primary,
                created_at,
                modified_at,
                content_url,
                content_size,
                indirection,
                indirection_version,
                layer_id,
                opacity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            params![
                node.id,
                node.kind.as_str(),
                node.version,
                node.guid.to_string(),
                node.store_new_id,
                bool_to_int(node.is_root),
                bool_to_int(node.is_primary),
                node.created_at,
                node.modified_at,
                node.content_url.as_deref(),
                node.content_size,
                node.indirection.as_deref(),
                node.indirection_version,
                node.layer_id,
                bool_to_int(node.opacity),
            ],
        )?;

        let mut stored = node.clone();
        stored.id = Some(node.id.unwrap_or_else(|| self.conn.last_insert_rowid()));
        Ok(stored)
    }

    fn get_node(&self, id: NodeId) -> RepoResult<Option<Node>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NODE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn update_node(&self, node: &Node, mask: NodeFieldMask) -> RepoResult<UpdateOutcome> {
        let id = node
            .id
            .ok_or_else(|| RepoError::InvalidData("cannot update an unsaved node".to_string()))?;

        let mut sql = String::from("UPDATE avm_nodes SET version = version + 1");
        let mut bind_values: Vec<Value> = Vec::new();
        let mut set = |column: &str, value: Value| {
            sql.push_str(&format!(", {column} = ?"));
            bind_values.push(value);
        };

        if mask.contains(NodeFieldMask::KIND) {
            set("kind", Value::Text(node.kind.as_str().to_string()));
        }
        if mask.contains(NodeFieldMask::MODIFIED_AT) {
            set("modified_at", Value::Integer(node.modified_at));
        }
        if mask.contains(NodeFieldMask::GUID) {
            set("guid", Value::Text(node.guid.to_string()));
        }
        if mask.contains(NodeFieldMask::CONTENT) {
            set("content_url", opt_text(node.content_url.as_deref()));
            set("content_size", opt_int(node.content_size));
        }
        if mask.contains(NodeFieldMask::FLAGS) {
            set("is_root", Value::Integer(bool_to_int(node.is_root)));
            set("is_primary", Value::Integer(bool_to_int(node.is_primary)));
            set("store_new_id", opt_int(node.store_new_id));
        }
        if mask.contains(NodeFieldMask::LAYERING) {
            set("indirection", opt_text(node.indirection.as_deref()));
            set("indirection_version", opt_int(node.indirection_version));
            set("layer_id", opt_int(node.layer_id));
            set("opacity", Value::Integer(bool_to_int(node.opacity)));
        }

        sql.push_str(" WHERE id = ? AND version = ?;");
        bind_values.push(Value::Integer(id));
        bind_values.push(Value::Integer(node.version));

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 1 {
            return Ok(UpdateOutcome::Applied {
                version: node.version + 1,
            });
        }

        let actual: Option<i64> = self
            .conn
            .query_row("SELECT version FROM avm_nodes WHERE id = ?1;", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(match actual {
            None => UpdateOutcome::NotFound,
            Some(actual) => UpdateOutcome::Conflict {
                expected: node.version,
                actual,
            },
        })
    }

    fn delete_node(&self, id: NodeId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM avm_nodes WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("node", id));
        }
        Ok(())
    }

    fn add_aspect(&self, node_id: NodeId, aspect: &QName) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO avm_aspects (node_id, namespace, local_name)
             VALUES (?1, ?2, ?3);",
            params![node_id, aspect.namespace, aspect.local_name],
        )?;
        Ok(())
    }

    fn remove_aspect(&self, node_id: NodeId, aspect: &QName) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM avm_aspects
             WHERE node_id = ?1 AND namespace = ?2 AND local_name = ?3;",
            params![node_id, aspect.namespace, aspect.local_name],
        )?;
        Ok(changed > 0)
    }

    fn remove_all_aspects(&self, node_id: NodeId) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM avm_aspects WHERE node_id = ?1;", [node_id])?;
        Ok(changed)
    }

    fn list_aspects(&self, node_id: NodeId) -> RepoResult<Vec<QName>> {
        let mut stmt = self.conn.prepare(
            "SELECT namespace, local_name
             FROM avm_aspects
             WHERE node_id = ?1
             ORDER BY namespace ASC, local_name ASC;",
        )?;
        let mut rows = stmt.query([node_id])?;
        let mut aspects = Vec::new();
        while let Some(row) = rows.next()? {
            aspects.push(QName::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?));
        }
        Ok(aspects)
    }

    fn has_aspect(&self, node_id: NodeId, aspect: &QName) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM avm_aspects
                WHERE node_id = ?1 AND namespace = ?2 AND local_name = ?3
            );",
            params![node_id, aspect.namespace, aspect.local_name],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert_property(
        &self,
        node_id: NodeId,
        name: &QName,
        value: &PropertyValue,
    ) -> RepoResult<()> {
        let columns = property_to_columns(value)?;
        self.conn.execute(
            "INSERT INTO avm_node_properties (
                node_id,
                namespace,
                local_name,
                value_kind,
                long_value,
                double_value,
                text_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                node_id,
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
        node_id: NodeId,
        name: &QName,
        value: &PropertyValue,
    ) -> RepoResult<()> {
        let columns = property_to_columns(value)?;
        let changed = self.conn.execute(
            "UPDATE avm_node_properties
             SET value_kind = ?4,
                 long_value = ?5,
                 double_value = ?6,
                 text_value = ?7
             WHERE node_id = ?1 AND namespace = ?2 AND local_name = ?3;",
            params![
                node_id,
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
                "node property",
                format!("{node_id}/{name}"),
            ));
        }
        Ok(())
    }

    fn get_property(&self, node_id: NodeId, name: &QName) -> RepoResult<Option<PropertyValue>> {
        let mut stmt = self.conn.prepare(
            "SELECT value_kind, long_value, double_value, text_value
             FROM avm_node_properties
             WHERE node_id = ?1 AND namespace = ?2 AND local_name = ?3;",
        )?;
        let mut rows = stmt.query(params![node_id, name.namespace, name.local_name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(property_from_row(row)?));
        }
        Ok(None)
    }

    fn get_properties(&self, node_id: NodeId) -> RepoResult<BTreeMap<QName, PropertyValue>> {
        let mut stmt = self.conn.prepare(
            "SELECT namespace, local_name, value_kind, long_value, double_value, text_value
             FROM avm_node_properties
             WHERE node_id = ?1;",
        )?;
        let mut rows = stmt.query([node_id])?;
        let mut properties = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let name = QName::new(
                row.get::<_, String>("namespace")?,
                row.get::<_, String>("local_name")?,
            );
            properties.insert(name, property_from_row(row)?);
        }
        Ok(properties)
    }

    fn delete_property(&self, node_id: NodeId, name: &QName) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM avm_node_properties
             WHERE node_id = ?1 AND namespace = ?2 AND local_name = ?3;",
            params![node_id, name.namespace, name.local_name],
        )?;
        Ok(changed > 0)
    }

    fn delete_properties(&self, node_id: NodeId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM avm_node_properties WHERE node_id = ?1;",
            [node_id],
        )?;
        Ok(changed)
    }

    fn new_in_store(&self, store_id: StoreId) -> RepoResult<Vec<Node>> {
        self.query_nodes(
            &format!("{NODE_SELECT_SQL} WHERE store_new_id = ? ORDER BY id ASC;"),
            vec![Value::Integer(store_id)],
        )
    }

    fn new_layered_in_store(&self, store_id: StoreId) -> RepoResult<Vec<Node>> {
        self.query_nodes(
            &format!(
                "{NODE_SELECT_SQL}
                 WHERE store_new_id = ?
                   AND kind IN ('layered_file', 'layered_directory')
                 ORDER BY id ASC;"
            ),
            vec![Value::Integer(store_id)],
        )
    }

    fn clear_new_in_store(&self, store_id: StoreId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE avm_nodes SET store_new_id = NULL WHERE store_new_id = ?1;",
            [store_id],
        )?;
        Ok(changed)
    }

    fn orphans(&self, limit: u32) -> RepoResult<Vec<Node>> {
        self.query_nodes(
            &format!(
                "{NODE_SELECT_SQL}
                 WHERE is_root = 0
                   AND NOT EXISTS (
                     SELECT 1 FROM avm_child_entries ce WHERE ce.child_id = avm_nodes.id
                   )
                 ORDER BY id ASC
                 LIMIT ?;"
            ),
            vec![Value::Integer(i64::from(limit))],
        )
    }

    fn layered_directories(&self) -> RepoResult<Vec<Node>> {
        self.query_nodes(
            &format!(
                "{NODE_SELECT_SQL}
                 WHERE kind = 'layered_directory' AND is_primary = 1
                 ORDER BY id ASC;"
            ),
            Vec::new(),
        )
    }

    fn layered_files(&self) -> RepoResult<Vec<Node>> {
        self.query_nodes(
            &format!("{NODE_SELECT_SQL} WHERE kind = 'layered_file' ORDER BY id ASC;"),
            Vec::new(),
        )
    }

    fn content_url_page(
        &self,
        after: Option<NodeId>,
        limit: u32,
    ) -> RepoResult<Vec<(NodeId, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content_url
             FROM avm_nodes
             WHERE kind = 'plain_file'
               AND content_url IS NOT NULL
               AND id > ?1
             ORDER BY id ASC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![after.unwrap_or(i64::MIN), i64::from(limit)])?;
        let mut page = Vec::new();
        while let Some(row) = rows.next()? {
            page.push((row.get(0)?, row.get(1)?));
        }
        Ok(page)
    }
}

fn opt_int(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn parse_node_row(row: &Row<'_>) -> RepoResult<Node> {
    let kind_text: String = row.get("kind")?;
    let kind = NodeKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid node kind `{kind_text}` in avm_nodes.kind"))
    })?;
    let guid_text: String = row.get("guid")?;

    Ok(Node {
        id: Some(row.get("id")?),
        kind,
        version: row.get("version")?,
        guid: parse_uuid(&guid_text, "avm_nodes.guid")?,
        store_new_id: row.get("store_new_id")?,
        is_root: int_to_bool(row.get("is_root")?, "avm_nodes.is_root")?,
        is_primary: int_to_bool(row.get("is_primary")?, "avm_nodes.is_primary")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
        content_url: row.get("content_url")?,
        content_size: row.get("content_size")?,
        indirection: row.get("indirection")?,
        indirection_version: row.get("indirection_version")?,
        layer_id: row.get("layer_id")?,
        opacity: int_to_bool(row.get("opacity")?, "avm_nodes.opacity")?,
    })
}
