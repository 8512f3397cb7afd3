//! Versioned filesystem node model.
//!
//! # Responsibility
//! - Describe plain and layered files/directories as persisted rows.
//! - Describe which columns an update writes via `NodeFieldMask`.
//!
//! # Invariants
//! - `version` is the optimistic concurrency counter; only the repository
//!   advances it.
//! - `id` is `None` until the node is persisted or a caller assigns one.

use crate::model::store::StoreId;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};
use uuid::Uuid;

/// Internal node identifier.
pub type NodeId = i64;

/// Concrete node variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    PlainFile,
    PlainDirectory,
    /// File that points at another store's file until first written.
    LayeredFile,
    /// Directory that overlays another store's directory.
    LayeredDirectory,
    /// Whiteout marker hiding a name visible through a layer.
    Deleted,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainFile => "plain_file",
            Self::PlainDirectory => "plain_directory",
            Self::LayeredFile => "layered_file",
            Self::LayeredDirectory => "layered_directory",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain_file" => Some(Self::PlainFile),
            "plain_directory" => Some(Self::PlainDirectory),
            "layered_file" => Some(Self::LayeredFile),
            "layered_directory" => Some(Self::LayeredDirectory),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, Self::PlainDirectory | Self::LayeredDirectory)
    }
}

/// Persisted node row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: Option<NodeId>,
    pub kind: NodeKind,
    /// Optimistic concurrency counter.
    pub version: i64,
    /// Changes on every content or metadata modification.
    pub guid: Uuid,
    /// Store whose open generation created this node; cleared on commit.
    pub store_new_id: Option<StoreId>,
    pub is_root: bool,
    /// Primary layered directories own their indirection.
    pub is_primary: bool,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub modified_at: i64,
    /// Content locator, plain files only.
    pub content_url: Option<String>,
    pub content_size: Option<i64>,
    /// Target path of a layered node.
    pub indirection: Option<String>,
    pub indirection_version: Option<i64>,
    pub layer_id: Option<i64>,
    /// Opaque layered directories hide their indirection's entries.
    pub opacity: bool,
}

impl Node {
    /// Creates an unsaved node of `kind` stamped at `now_ms`.
    pub fn new(kind: NodeKind, now_ms: i64) -> Self {
        Self {
            id: None,
            kind,
            version: 0,
            guid: Uuid::new_v4(),
            store_new_id: None,
            is_root: false,
            is_primary: true,
            created_at: now_ms,
            modified_at: now_ms,
            content_url: None,
            content_size: None,
            indirection: None,
            indirection_version: None,
            layer_id: None,
            opacity: false,
        }
    }

    pub fn plain_directory(now_ms: i64) -> Self {
        Self::new(NodeKind::PlainDirectory, now_ms)
    }

    pub fn plain_file(content_url: impl Into<String>, content_size: i64, now_ms: i64) -> Self {
        let mut node = Self::new(NodeKind::PlainFile, now_ms);
        node.content_url = Some(content_url.into());
        node.content_size = Some(content_size);
        node
    }

    pub fn layered_directory(indirection: impl Into<String>, layer_id: i64, now_ms: i64) -> Self {
        let mut node = Self::new(NodeKind::LayeredDirectory, now_ms);
        node.indirection = Some(indirection.into());
        node.indirection_version = Some(-1);
        node.layer_id = Some(layer_id);
        node
    }

    pub fn layered_file(indirection: impl Into<String>, now_ms: i64) -> Self {
        let mut node = Self::new(NodeKind::LayeredFile, now_ms);
        node.indirection = Some(indirection.into());
        node.indirection_version = Some(-1);
        node
    }

    /// Uses a caller-issued id instead of a database-assigned one.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Marks the node as created in `store_id`'s open generation.
    pub fn new_in_store(mut self, store_id: StoreId) -> Self {
        self.store_new_id = Some(store_id);
        self
    }

    /// Records a modification: new timestamp and a fresh guid.
    pub fn touch(&mut self, now_ms: i64) {
        self.modified_at = now_ms;
        self.guid = Uuid::new_v4();
    }
}

/// Set of node column groups written by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFieldMask(u8);

impl NodeFieldMask {
    pub const NONE: Self = Self(0);
    pub const MODIFIED_AT: Self = Self(1);
    pub const GUID: Self = Self(1 << 1);
    /// `content_url` and `content_size`.
    pub const CONTENT: Self = Self(1 << 2);
    /// `is_root`, `is_primary`, `store_new_id`.
    pub const FLAGS: Self = Self(1 << 3);
    /// `indirection`, `indirection_version`, `layer_id`, `opacity`.
    pub const LAYERING: Self = Self(1 << 4);
    pub const KIND: Self = Self(1 << 5);
    pub const ALL: Self = Self(0b11_1111);

    pub const MODIFIED_AND_GUID: Self = Self(Self::MODIFIED_AT.0 | Self::GUID.0);
    pub const MODIFIED_AND_CONTENT: Self = Self(Self::MODIFIED_AT.0 | Self::CONTENT.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for NodeFieldMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFieldMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
