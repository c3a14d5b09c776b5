//! Schema versioning for persisted and distributed catalog data.
//!
//! Precomputed bundles and on-disk cache records carry a `(major, minor)`
//! schema version. The compatibility decision is intentionally binary:
//! either the data can be used as-is, or the client falls back to live
//! aggregation. The fallback path is cheap enough that no graded or
//! partial-compatibility mode exists.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Version tag on persisted/distributed data describing its field layout.
///
/// Serialized as a `"major.minor"` string (the format the data bundles use).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

/// The schema version this build writes.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0);

/// Schema versions this build can read: `(major, highest known minor)` pairs.
pub const KNOWN_SCHEMAS: &[(u32, u32)] = &[(1, 2)];

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .ok_or_else(|| format!("empty schema version: {:?}", s))?;
        let minor = parts
            .next()
            .ok_or_else(|| format!("schema version must be major.minor: {:?}", s))?;
        if parts.next().is_some() {
            return Err(format!("schema version has too many parts: {:?}", s));
        }
        let major: u32 = major
            .parse()
            .map_err(|_| format!("invalid major version: {:?}", s))?;
        let minor: u32 = minor
            .parse()
            .map_err(|_| format!("invalid minor version: {:?}", s))?;
        Ok(SchemaVersion { major, minor })
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Outcome of the compatibility decision. Closed by design: there is no
/// degraded tier between "use the data" and "fall back to live sources".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    Incompatible,
}

/// Decide whether data at `data` can be consumed by a client that knows the
/// given `(major, max_minor)` pairs.
///
/// Compatible iff the data's major matches a known major and its minor does
/// not exceed the highest minor the client recognizes for that major.
pub fn compatibility(known: &[(u32, u32)], data: SchemaVersion) -> Compatibility {
    for &(major, max_minor) in known {
        if data.major == major && data.minor <= max_minor {
            return Compatibility::Compatible;
        }
    }
    Compatibility::Incompatible
}

/// Compatibility of `data` against this build's [`KNOWN_SCHEMAS`].
pub fn is_compatible(data: SchemaVersion) -> bool {
    compatibility(KNOWN_SCHEMAS, data) == Compatibility::Compatible
}
