//! Typed property values attached to nodes and stores.

use crate::model::qname::QName;
use crate::model::store::StoreId;
use serde::{Deserialize, Serialize};

/// Property value persisted in typed columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    /// Unix epoch milliseconds.
    Date(i64),
    /// Structured values (lists, maps) kept as JSON.
    Json(serde_json::Value),
}

impl PropertyValue {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Json(_) => "json",
        }
    }
}

/// A store property row returned by pattern searches.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreProperty {
    pub store_id: StoreId,
    pub name: QName,
    pub value: PropertyValue,
}
