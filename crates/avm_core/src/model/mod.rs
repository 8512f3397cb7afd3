//! AVM domain model.
//!
//! # Responsibility
//! - Define the records persisted by the AVM repositories.
//! - Keep identifiers, names and typed property values in one place.
//!
//! # Invariants
//! - Nodes form a graph through child entries, not a tree.
//! - Version roots are immutable snapshots; only descriptive fields change.

pub mod link;
pub mod lock;
pub mod node;
pub mod property;
pub mod qname;
pub mod store;
pub mod version;
