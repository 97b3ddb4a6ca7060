//! Scalar attribute values shared by desired rows and current server state

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single CSV/resource attribute value.
///
/// Rows and server resources alike are represented as maps to this enum so
/// the diff engine can compare them with one normalization routine
/// (see [`crate::diff::normalize`]) regardless of which side produced the
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Absent / explicit null
    Null,
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Int(i64),
    /// Floating point scalar
    Float(f64),
    /// String scalar (also the landing type for raw CSV cells before normalization)
    Str(String),
}

impl AttrValue {
    /// `true` for [`AttrValue::Null`] and for an empty string (pre-normalization
    /// callers may not have trimmed yet).
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Borrow the string contents, if this is a string variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "null"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(n) => write!(f, "{n}"),
            AttrValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}
