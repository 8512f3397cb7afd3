//! Repository layer: data-access contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define one data-access contract per AVM table family.
//! - Isolate SQL details from services and maintenance jobs.
//! - Apply one error wrapping policy: every failure surfaces as `RepoError`.
//!
//! # Invariants
//! - Single-row lookups return `Ok(None)` when nothing matches.
//! - Repositories never cascade deletes; callers order cleanup themselves.
//! - Optimistic updates report `UpdateOutcome` instead of a row count.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::property::PropertyValue;
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod link_repo;
pub mod lock_repo;
pub mod node_repo;
pub mod store_repo;
pub mod version_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error shared by every AVM repository.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error, including constraint violations.
    Db(DbError),
    /// A mutation addressed a row that does not exist.
    NotFound { entity: &'static str, key: String },
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Returns whether the failure was a uniqueness or check constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == ErrorCode::ConstraintViolation
        )
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::InvalidData(message) => write!(f, "invalid avm data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "avm repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "avm repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of an optimistic, version-guarded update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Row written; `version` is the new counter value.
    Applied { version: i64 },
    /// Another writer advanced the counter first.
    Conflict { expected: i64, actual: i64 },
    NotFound,
}

impl UpdateOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

/// Typed column values for one property row.
pub(crate) struct PropertyColumns {
    pub kind: &'static str,
    pub long_value: Option<i64>,
    pub double_value: Option<f64>,
    pub text_value: Option<String>,
}

pub(crate) fn property_to_columns(value: &PropertyValue) -> RepoResult<PropertyColumns> {
    let mut columns = PropertyColumns {
        kind: value.kind_str(),
        long_value: None,
        double_value: None,
        text_value: None,
    };
    match value {
        PropertyValue::Null => {}
        PropertyValue::Boolean(flag) => columns.long_value = Some(bool_to_int(*flag)),
        PropertyValue::Integer(number) | PropertyValue::Date(number) => {
            columns.long_value = Some(*number)
        }
        // SQLite binds NaN as NULL.
        PropertyValue::Double(number) if number.is_nan() => {
            return Err(RepoError::InvalidData(
                "double property value must not be NaN".to_string(),
            ))
        }
        PropertyValue::Double(number) => columns.double_value = Some(*number),
        PropertyValue::Text(text) => columns.text_value = Some(text.clone()),
        PropertyValue::Json(json) => {
            let encoded = serde_json::to_string(json).map_err(|err| {
                RepoError::InvalidData(format!("unencodable json property value: {err}"))
            })?;
            columns.text_value = Some(encoded);
        }
    }
    Ok(columns)
}

pub(crate) fn property_from_row(row: &rusqlite::Row<'_>) -> RepoResult<PropertyValue> {
    let kind: String = row.get("value_kind")?;
    let long_value: Option<i64> = row.get("long_value")?;
    let double_value: Option<f64> = row.get("double_value")?;
    let text_value: Option<String> = row.get("text_value")?;

    let missing = |column: &str| {
        RepoError::InvalidData(format!("property of kind `{kind}` has no {column}"))
    };

    let value = match kind.as_str() {
        "null" => PropertyValue::Null,
        "boolean" => PropertyValue::Boolean(int_to_bool(
            long_value.ok_or_else(|| missing("long_value"))?,
            "long_value",
        )?),
        "integer" => PropertyValue::Integer(long_value.ok_or_else(|| missing("long_value"))?),
        "date" => PropertyValue::Date(long_value.ok_or_else(|| missing("long_value"))?),
        "double" => PropertyValue::Double(double_value.ok_or_else(|| missing("double_value"))?),
        "text" => PropertyValue::Text(text_value.ok_or_else(|| missing("text_value"))?),
        "json" => {
            let raw = text_value.ok_or_else(|| missing("text_value"))?;
            PropertyValue::Json(serde_json::from_str(&raw).map_err(|err| {
                RepoError::InvalidData(format!("invalid json property value: {err}"))
            })?)
        }
        other => {
            return Err(RepoError::InvalidData(format!(
                "unknown property kind `{other}`"
            )))
        }
    };
    Ok(value)
}

/// Checks schema version and required tables before a repository binds.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
