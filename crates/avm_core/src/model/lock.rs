//! Application-level subtree locks.

use std::collections::BTreeMap;

/// Internal lock identifier.
pub type LockId = i64;

/// Exclusive-edit lock on one path inside a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub id: LockId,
    pub store_name: String,
    pub path: String,
    pub owner: String,
    pub created_at: i64,
    pub data: BTreeMap<String, String>,
}

/// Insert payload for a lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLock {
    pub store_name: String,
    pub path: String,
    pub owner: String,
    pub data: BTreeMap<String, String>,
}

/// Lock-data predicate for bulk deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDataFilter<'a> {
    /// Any lock carrying this key.
    Key(&'a str),
    /// Locks whose `key` maps to exactly `value`.
    KeyValue(&'a str, &'a str),
}
