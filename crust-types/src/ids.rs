//! Record identifiers.
//!
//! Integer identities must be strictly positive; zero and negatives are how
//! the remote API spells "no record", so they never key a table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Primary key of a cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Positive integer surrogate key.
    Number(i64),
    /// Opaque GUID key.
    Guid(Uuid),
}

impl RecordId {
    /// Creates a fresh random GUID identity.
    #[must_use]
    pub fn new_guid() -> Self {
        Self::Guid(Uuid::new_v4())
    }

    /// Returns the key type this identity belongs to.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        match self {
            Self::Number(_) => KeyType::Integer,
            Self::Guid(_) => KeyType::Guid,
        }
    }

    /// Returns the integer key, if this is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Guid(_) => None,
        }
    }

    /// Returns the GUID key, if this is one.
    #[must_use]
    pub const fn as_guid(&self) -> Option<Uuid> {
        match self {
            Self::Number(_) => None,
            Self::Guid(g) => Some(*g),
        }
    }

    /// Wire representation: a JSON number or a GUID string.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Guid(g) => Value::String(g.to_string()),
        }
    }

    /// Parses a string, trying an integer first and falling back to a GUID.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if let Ok(n) = s.trim().parse::<i64>() {
            return if n > 0 {
                Ok(Self::Number(n))
            } else {
                Err(Error::InvalidId(s.to_string()))
            };
        }
        Ok(Self::Guid(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Guid(g) => write!(f, "{g}"),
        }
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<i32> for RecordId {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for RecordId {
    fn from(n: u32) -> Self {
        Self::Number(i64::from(n))
    }
}

impl From<Uuid> for RecordId {
    fn from(g: Uuid) -> Self {
        Self::Guid(g)
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        *id
    }
}

/// The kind of primary key a model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Integer,
    Guid,
}

impl KeyType {
    /// Whether `id` is a well-formed key of this type.
    #[must_use]
    pub fn accepts(&self, id: &RecordId) -> bool {
        match (self, id) {
            (Self::Integer, RecordId::Number(n)) => *n > 0,
            (Self::Guid, RecordId::Guid(_)) => true,
            _ => false,
        }
    }

    /// Reads a key of this type out of a wire value.
    ///
    /// Integer keys accept JSON numbers and numeric strings; GUID keys accept
    /// GUID strings. Anything else, including non-positive integers, is `None`.
    #[must_use]
    pub fn read(&self, value: &Value) -> Option<RecordId> {
        match self {
            Self::Integer => {
                let n = match value {
                    Value::Number(n) => n.as_i64().or_else(|| {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0)
                            .map(|f| f as i64)
                    })?,
                    Value::String(s) => s.trim().parse::<i64>().ok()?,
                    _ => return None,
                };
                (n > 0).then_some(RecordId::Number(n))
            }
            Self::Guid => match value {
                Value::String(s) => Uuid::parse_str(s).ok().map(RecordId::Guid),
                _ => None,
            },
        }
    }
}
