//! ObjectId - the 12-byte primary key of every mapped record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrmError;

/// Globally unique 12-byte document identifier.
///
/// Laid out as a 4-byte creation timestamp, a 5-byte per-process random value
/// and a 3-byte counter. Generated client-side; the store never invents one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(bson::oid::ObjectId);

impl ObjectId {
    /// Length of the canonical hex form.
    pub const HEX_LEN: usize = 24;

    /// Generate a fresh identifier.
    pub fn new() -> Self {
        ObjectId(bson::oid::ObjectId::new())
    }

    /// Parse the canonical 24-character hex form.
    pub fn parse(hex: &str) -> Result<Self, OrmError> {
        if hex.len() != Self::HEX_LEN {
            return Err(OrmError::InvalidIdentifier(hex.to_string()));
        }
        bson::oid::ObjectId::parse_str(hex)
            .map(ObjectId)
            .map_err(|_| OrmError::InvalidIdentifier(hex.to_string()))
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bson::oid::ObjectId::from_bytes(bytes))
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0.bytes()
    }

    /// Lowercase hex form, always 24 characters.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Creation time embedded in the first four bytes (second precision).
    pub fn timestamp(&self) -> DateTime<Utc> {
        let [a, b, c, d, ..] = self.bytes();
        let secs = u32::from_be_bytes([a, b, c, d]);
        Utc.timestamp_opt(i64::from(secs), 0)
            .single()
            .unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<bson::oid::ObjectId> for ObjectId {
    fn from(oid: bson::oid::ObjectId) -> Self {
        ObjectId(oid)
    }
}

impl From<ObjectId> for bson::oid::ObjectId {
    fn from(oid: ObjectId) -> Self {
        oid.0
    }
}

impl From<ObjectId> for bson::Bson {
    fn from(oid: ObjectId) -> Self {
        bson::Bson::ObjectId(oid.0)
    }
}
