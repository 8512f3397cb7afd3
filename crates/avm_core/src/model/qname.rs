//! Namespace-qualified names used for aspects and properties.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Qualified name rendered as `{namespace}local_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }
}

impl Display for QName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

/// Error for strings that are not in `{namespace}local_name` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QNameParseError(pub String);

impl Display for QNameParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid qualified name `{}`", self.0)
    }
}

impl std::error::Error for QNameParseError {}

impl FromStr for QName {
    type Err = QNameParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix('{')
            .ok_or_else(|| QNameParseError(value.to_string()))?;
        let (namespace, local_name) = rest
            .split_once('}')
            .ok_or_else(|| QNameParseError(value.to_string()))?;
        if local_name.is_empty() {
            return Err(QNameParseError(value.to_string()));
        }
        Ok(Self::new(namespace, local_name))
    }
}
