//! Orphan reaper: garbage collection of unreachable nodes.
//!
//! # Responsibility
//! - Delete orphan nodes in bounded batches, one transaction per batch.
//! - Keep lineage connected by splicing links around each deleted node.
//! - Report the content locators released so a content store can clean up.
//!
//! # Invariants
//! - A reaped directory's child entries go with it; its children become
//!   orphans and are picked up by a later pass of the same run.
//! - Descendants of a reaped node inherit its history ancestor, and merge
//!   targets inherit its ancestor as their merge source.

use crate::model::link::{HistoryLink, MergeLink};
use crate::model::node::{Node, NodeId, NodeKind};
use crate::names::NamePolicy;
use crate::repo::link_repo::{LinkRepository, SqliteLinkRepository};
use crate::repo::node_repo::{NodeRepository, SqliteNodeRepository};
use crate::service::ServiceResult;
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

/// Outcome of one `ReaperService::reap_orphans` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapSummary {
    /// Passes that found at least one orphan.
    pub passes: usize,
    pub nodes_reaped: usize,
    /// Locators of plain files deleted during the run.
    pub released_content_urls: Vec<String>,
}

/// Row counts reported by `ReaperService::scan`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub orphans: usize,
    pub layered_directories: usize,
    pub layered_files: usize,
    pub content_urls: usize,
}

pub struct ReaperService<'conn> {
    conn: &'conn Connection,
    policy: NamePolicy,
}

impl<'conn> ReaperService<'conn> {
    pub fn new(conn: &'conn Connection, policy: NamePolicy) -> Self {
        Self { conn, policy }
    }

    /// Deletes orphans `batch_size` at a time until a pass finds none.
    pub fn reap_orphans(&self, batch_size: u32) -> ServiceResult<ReapSummary> {
        let started_at = Instant::now();
        let batch_size = batch_size.max(1);
        info!("event=orphan_reap module=service status=start batch_size={batch_size}");

        let mut summary = ReapSummary::default();
        loop {
            let reaped = self.reap_batch(batch_size, &mut summary.released_content_urls)?;
            if reaped == 0 {
                break;
            }
            summary.passes += 1;
            summary.nodes_reaped += reaped;
        }

        info!(
            "event=orphan_reap module=service status=ok passes={} nodes_reaped={} released_content_urls={} duration_ms={}",
            summary.passes,
            summary.nodes_reaped,
            summary.released_content_urls.len(),
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Counts orphans, layered nodes and plain-file content locators
    /// without modifying anything.
    pub fn scan(&self, content_batch_size: u32) -> ServiceResult<IntegrityReport> {
        let started_at = Instant::now();
        let nodes = SqliteNodeRepository::try_new(self.conn)?;

        let mut report = IntegrityReport {
            orphans: nodes.orphans(u32::MAX)?.len(),
            layered_directories: nodes.layered_directories()?.len(),
            layered_files: nodes.layered_files()?.len(),
            content_urls: 0,
        };
        for url in nodes.content_urls(content_batch_size) {
            url?;
            report.content_urls += 1;
        }

        info!(
            "event=content_scan module=service status=ok orphans={} layered_directories={} layered_files={} content_urls={} duration_ms={}",
            report.orphans,
            report.layered_directories,
            report.layered_files,
            report.content_urls,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn reap_batch(&self, batch_size: u32, released: &mut Vec<String>) -> ServiceResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let nodes = SqliteNodeRepository::try_new(&tx)?;
        let links = SqliteLinkRepository::try_new(&tx, self.policy)?;

        let orphans = nodes.orphans(batch_size)?;
        let mut reaped = 0;
        for orphan in &orphans {
            let Some(id) = orphan.id else {
                continue;
            };
            reap_node(&nodes, &links, id)?;
            if let Some(url) = released_url(orphan) {
                released.push(url);
            }
            reaped += 1;
        }

        tx.commit()?;
        Ok(reaped)
    }
}

fn reap_node<N, L>(nodes: &N, links: &L, id: NodeId) -> ServiceResult<()>
where
    N: NodeRepository,
    L: LinkRepository,
{
    links.delete_child_entries(id)?;

    let ancestor = links.get_history_link_by_descendant(id)?;
    if let Some(link) = ancestor {
        links.delete_history_link(link)?;
    }
    let ancestor_id = ancestor.map(|link| link.ancestor_id);

    for link in links.list_history_links_by_ancestor(id)? {
        links.delete_history_link(link)?;
        if let Some(ancestor_id) = ancestor_id {
            links.create_history_link(HistoryLink {
                ancestor_id,
                descendant_id: link.descendant_id,
            })?;
        }
    }

    if let Some(link) = links.get_merge_link_to(id)? {
        links.delete_merge_link(link)?;
    }
    for link in links.list_merge_links_from(id)? {
        links.delete_merge_link(link)?;
        if let Some(ancestor_id) = ancestor_id {
            links.create_merge_link(MergeLink {
                merge_from_id: ancestor_id,
                merge_to_id: link.merge_to_id,
            })?;
        }
    }

    nodes.remove_all_aspects(id)?;
    nodes.delete_properties(id)?;
    nodes.delete_node(id)?;
    Ok(())
}

fn released_url(node: &Node) -> Option<String> {
    match node.kind {
        NodeKind::PlainFile => node.content_url.clone(),
        _ => None,
    }
}
