//! Containment, history and merge edges between nodes.

use crate::model::node::NodeId;

/// Name-indexed containment edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub parent_id: NodeId,
    /// Name as written; comparisons use the policy key.
    pub name: String,
    pub child_id: NodeId,
}

impl ChildEntry {
    pub fn new(parent_id: NodeId, name: impl Into<String>, child_id: NodeId) -> Self {
        Self {
            parent_id,
            name: name.into(),
            child_id,
        }
    }
}

/// Version lineage edge: `ancestor_id` is the direct predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLink {
    pub ancestor_id: NodeId,
    pub descendant_id: NodeId,
}

/// Cross-branch provenance edge recorded by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeLink {
    pub merge_from_id: NodeId,
    pub merge_to_id: NodeId,
}
