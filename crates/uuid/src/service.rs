//! Canonical UUID and SHA-256 digest wrappers.

use crate::{UuidError, UuidResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// The portal's canonical UUID representation (32 lowercase hex characters, no hyphens).
///
/// Once constructed the contained UUID is guaranteed canonical, so path derivation is
/// deterministic. Use [`ShardableUuid::parse`] for identifiers arriving from the REST API
/// or the CLI, and [`ShardableUuid::new`] when registering a new patient, facility, or
/// appointment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardableUuid(Uuid);

impl Default for ShardableUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardableUuid {
    /// Generates a new random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates an identifier that must already be canonical.
    ///
    /// Hyphenated or uppercase forms are rejected rather than normalised, so the same
    /// record can never be addressed by two spellings.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        let invalid = || {
            UuidError::InvalidInput(format!(
                "UUID must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            ))
        };

        if !Self::is_canonical(input) {
            return Err(invalid());
        }
        Uuid::parse_str(input).map(Self).map_err(|_| invalid())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is exactly 32 characters of `0-9a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns `parent_dir/<s1>/<s2>/<uuid>/` where `s1`/`s2` are the first two pairs of hex
    /// characters.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for ShardableUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ShardableUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShardableUuid::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ShardableUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ShardableUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ShardableUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Lowercase hex SHA-256 digest (64 characters).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Builds the hex form from raw digest bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Validates a hex digest supplied from outside (for example a download URL).
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] unless `input` is 64 lowercase hex characters.
    pub fn parse(input: &str) -> UuidResult<Self> {
        let lowercase = !input.bytes().any(|b| b.is_ascii_uppercase());
        match hex::decode(input) {
            Ok(bytes) if bytes.len() == 32 && lowercase => Ok(Self(input.to_owned())),
            _ => Err(UuidError::InvalidInput(format!(
                "SHA-256 hash must be 64 lowercase hex characters, got: '{}'",
                input
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Sha256Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Sha256Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Sha256Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_canonical_uuid() {
        let id = ShardableUuid::new();
        let canonical = id.to_string();

        assert_eq!(canonical.len(), 32);
        assert!(ShardableUuid::is_canonical(&canonical));
    }

    #[test]
    fn test_parse_valid_canonical_uuid() {
        let canonical = "550e8400e29b41d4a716446655440000";
        let parsed = ShardableUuid::parse(canonical).unwrap();

        assert_eq!(parsed.to_string(), canonical);
    }

    #[test]
    fn test_parse_rejects_hyphenated_uuid() {
        let result = ShardableUuid::parse("550e8400-e29b-41d4-a716-446655440000");

        match result {
            Err(UuidError::InvalidInput(msg)) => {
                assert!(msg.contains("32 lowercase hex characters"));
            }
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_is_canonical_invalid() {
        assert!(!ShardableUuid::is_canonical(
            "550E8400E29B41D4A716446655440000"
        ));
        assert!(!ShardableUuid::is_canonical(
            "550e8400e29b41d4a71644665544000"
        ));
        assert!(!ShardableUuid::is_canonical(
            "550e8400e29b41d4a716446655440zzz"
        ));
        assert!(!ShardableUuid::is_canonical(""));
    }

    #[test]
    fn test_sharded_dir_structure() {
        let id = ShardableUuid::parse("550e8400e29b41d4a716446655440000").unwrap();
        let sharded = id.sharded_dir(Path::new("/portal_data/patients"));

        assert_eq!(
            sharded,
            PathBuf::from("/portal_data/patients/55/0e/550e8400e29b41d4a716446655440000")
        );
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let id = ShardableUuid::parse("aabbccddeeff00112233445566778899").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"aabbccddeeff00112233445566778899\"");

        let bad: Result<ShardableUuid, _> = serde_json::from_str("\"AABB\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_sha256_hash_from_bytes_is_lower_hex() {
        let hash = Sha256Hash::from_bytes(&[0xab; 32]);
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().starts_with("abab"));
        assert!(Sha256Hash::parse(hash.as_str()).is_ok());
    }

    #[test]
    fn test_sha256_hash_parse_rejects_path_segments() {
        assert!(Sha256Hash::parse("../../etc/passwd").is_err());
        assert!(Sha256Hash::parse(&"A".repeat(64)).is_err());
        assert!(Sha256Hash::parse(&"ab".repeat(31)).is_err());
    }

    #[test]
    fn test_sha256_hash_matches_known_digest_hex() {
        let mut digest = [0u8; 32];
        digest[0] = 0x0f;
        digest[31] = 0xa0;
        let hash = Sha256Hash::from_bytes(&digest);

        assert!(hash.as_str().starts_with("0f00"));
        assert!(hash.as_str().ends_with("00a0"));
    }
}
