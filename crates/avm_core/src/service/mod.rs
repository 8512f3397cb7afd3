//! AVM use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into transactional maintenance APIs.
//! - Own every rule the repositories leave to callers: version numbering,
//!   cleanup order, store name validation.
//!
//! # Invariants
//! - Multi-step writes run inside one immediate transaction.
//! - Repository failures surface unchanged as `ServiceError::Repo`.

use crate::model::node::{NodeFieldMask, NodeId};
use crate::repo::node_repo::NodeRepository;
use crate::repo::{RepoError, UpdateOutcome};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod lineage_service;
pub mod reaper_service;
pub mod store_service;
pub mod version_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors from AVM service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// A store with the same normalized name already exists.
    StoreExists(String),
    /// Store name is empty or contains reserved characters.
    InvalidStoreName(String),
    StoreNotFound(String),
    NodeNotFound(NodeId),
    VersionNotFound { store: String, version_id: i64 },
    /// An optimistic update lost against a concurrent writer.
    Conflict {
        entity: &'static str,
        expected: i64,
        actual: i64,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreExists(name) => write!(f, "store already exists: {name}"),
            Self::InvalidStoreName(name) => write!(f, "invalid store name: `{name}`"),
            Self::StoreNotFound(name) => write!(f, "store not found: {name}"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::VersionNotFound { store, version_id } => {
                write!(f, "version {version_id} not found in store {store}")
            }
            Self::Conflict {
                entity,
                expected,
                actual,
            } => write!(
                f,
                "concurrent update of {entity}: expected version {expected}, found {actual}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Sets a node's `is_root` flag, skipping the write when it already holds.
///
/// Returns `false` when the node no longer exists.
pub(crate) fn set_root_flag<N: NodeRepository>(
    nodes: &N,
    node_id: NodeId,
    is_root: bool,
) -> ServiceResult<bool> {
    let Some(mut node) = nodes.get_node(node_id)? else {
        return Ok(false);
    };
    if node.is_root == is_root {
        return Ok(true);
    }
    node.is_root = is_root;
    match nodes.update_node(&node, NodeFieldMask::FLAGS)? {
        UpdateOutcome::Applied { .. } => Ok(true),
        UpdateOutcome::NotFound => Ok(false),
        UpdateOutcome::Conflict { expected, actual } => Err(ServiceError::Conflict {
            entity: "node",
            expected,
            actual,
        }),
    }
}
