//! Name normalization shared by every name-keyed query.
//!
//! # Responsibility
//! - Fold child-entry and store names into a comparison key.
//! - Translate SQL-style `%`/`_` patterns into case-sensitive `GLOB` patterns
//!   over the folded key.
//!
//! # Invariants
//! - Insert, lookup, pattern and delete paths all go through the same
//!   `NamePolicy::key`, so the `(parent, name)` uniqueness holds under the
//!   active policy.

use std::borrow::Cow;

/// Case policy for names stored in the AVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePolicy {
    /// Names compare byte-for-byte.
    CaseSensitive,
    /// Names compare after Unicode lowercase folding.
    #[default]
    CaseInsensitive,
}

impl NamePolicy {
    /// Returns the comparison key for `name`.
    pub fn key<'a>(self, name: &'a str) -> Cow<'a, str> {
        match self {
            Self::CaseSensitive => Cow::Borrowed(name),
            Self::CaseInsensitive => {
                if name.chars().any(char::is_uppercase) {
                    Cow::Owned(name.to_lowercase())
                } else {
                    Cow::Borrowed(name)
                }
            }
        }
    }

    /// Converts a SQL `LIKE` pattern into a `GLOB` pattern over name keys.
    pub fn glob_pattern(self, like_pattern: &str) -> String {
        like_to_glob(&self.key(like_pattern))
    }
}

/// Translates `%` and `_` wildcards to `GLOB` syntax, escaping literal glob
/// metacharacters.
pub fn like_to_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len() + 4);
    for ch in pattern.chars() {
        match ch {
            '%' => glob.push('*'),
            '_' => glob.push('?'),
            '*' | '?' | '[' => {
                glob.push('[');
                glob.push(ch);
                glob.push(']');
            }
            other => glob.push(other),
        }
    }
    glob
}

/// Escapes a literal string so it matches only itself under `GLOB`.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len() + 4);
    for ch in literal.chars() {
        match ch {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(ch);
                escaped.push(']');
            }
            other => escaped.push(other),
        }
    }
    escaped
}
