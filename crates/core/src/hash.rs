//! Fast non-cryptographic hashing using rapidhash.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 64-bit rapidhash value.
///
/// Serializes as a 16-character hex string for JSON compatibility with
/// clients that would otherwise lose precision on large `u64` values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RapidHash(u64);

impl RapidHash {
    /// Hash the given bytes using the rapidhash v3 algorithm.
    #[inline]
    pub fn new(data: &[u8]) -> Self {
        Self(rapidhash::v3::rapidhash_v3(data))
    }

    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, std::num::ParseIntError> {
        u64::from_str_radix(s, 16).map(Self)
    }
}

impl fmt::Debug for RapidHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RapidHash({:016x})", self.0)
    }
}

impl fmt::Display for RapidHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for RapidHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RapidHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
