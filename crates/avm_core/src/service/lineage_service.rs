//! History lineage queries over history links.

use crate::model::node::NodeId;
use crate::repo::link_repo::LinkRepository;
use crate::repo::RepoResult;
use std::collections::HashSet;

/// Relationship between two nodes' histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonAncestor {
    /// The histories never meet.
    None,
    /// The left node is an ancestor of (or equal to) the right node.
    Left,
    /// The right node is an ancestor of the left node.
    Right,
    /// Both descend from this node; the branches are in conflict.
    Other(NodeId),
}

/// Read-only lineage service.
pub struct LineageService<R: LinkRepository> {
    repo: R,
}

impl<R: LinkRepository> LineageService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Up to `count` ancestors of `node_id`, nearest first. `None` walks
    /// the full chain.
    pub fn history(&self, node_id: NodeId, count: Option<usize>) -> RepoResult<Vec<NodeId>> {
        let limit = count.unwrap_or(usize::MAX);
        let mut seen = HashSet::from([node_id]);
        let mut ancestors = Vec::new();
        let mut current = node_id;

        while ancestors.len() < limit {
            let Some(link) = self.repo.get_history_link_by_descendant(current)? else {
                break;
            };
            if !seen.insert(link.ancestor_id) {
                break;
            }
            ancestors.push(link.ancestor_id);
            current = link.ancestor_id;
        }
        Ok(ancestors)
    }

    /// Nearest node shared by both histories.
    ///
    /// Walks both chains one step at a time, so the first meeting point
    /// found is the closest to whichever side reaches it first.
    pub fn common_ancestor(&self, left: NodeId, right: NodeId) -> RepoResult<CommonAncestor> {
        let mut left_seen: Vec<NodeId> = Vec::new();
        let mut right_seen: Vec<NodeId> = Vec::new();
        let mut left_cursor = Some(left);
        let mut right_cursor = Some(right);

        while left_cursor.is_some() || right_cursor.is_some() {
            if let Some(node) = left_cursor {
                left_seen.push(node);
                if right_seen.contains(&node) {
                    return Ok(classify(node, left, right));
                }
                left_cursor = self.next_ancestor(node, &left_seen)?;
            }
            if let Some(node) = right_cursor {
                right_seen.push(node);
                if left_seen.contains(&node) {
                    return Ok(classify(node, left, right));
                }
                right_cursor = self.next_ancestor(node, &right_seen)?;
            }
        }
        Ok(CommonAncestor::None)
    }

    fn next_ancestor(&self, node: NodeId, seen: &[NodeId]) -> RepoResult<Option<NodeId>> {
        Ok(self
            .repo
            .get_history_link_by_descendant(node)?
            .map(|link| link.ancestor_id)
            .filter(|ancestor| !seen.contains(ancestor)))
    }
}

fn classify(shared: NodeId, left: NodeId, right: NodeId) -> CommonAncestor {
    if shared == left {
        CommonAncestor::Left
    } else if shared == right {
        CommonAncestor::Right
    } else {
        CommonAncestor::Other(shared)
    }
}
