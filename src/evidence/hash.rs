use crate::error::{HemlockError, HemlockResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Name recorded alongside every digest list
pub const HASH_ALGORITHM: &str = "SHA-256";

/// A SHA-256 content digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub const ZERO: ContentDigest = ContentDigest([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// SHA-256 of data in memory
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// SHA-256 of a file, streamed in 8 KiB reads
    pub fn of_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> HemlockResult<Self> {
        let bytes = hex::decode(value)
            .map_err(|e| HemlockError::SerializationError(format!("invalid digest hex: {}", e)))?;
        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            HemlockError::SerializationError(format!(
                "digest must be 32 bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(array))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        ContentDigest::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Hex-encode a digest list in order
pub fn to_hex_list(digests: &[ContentDigest]) -> Vec<String> {
    digests.iter().map(ContentDigest::to_hex).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_digest_of_empty_input() {
        assert_eq!(
            ContentDigest::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_consistency() {
        assert_eq!(ContentDigest::of(b"block"), ContentDigest::of(b"block"));
        assert_ne!(ContentDigest::of(b"data1"), ContentDigest::of(b"data2"));
    }

    #[test]
    fn test_digest_from_file_matches_memory() {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(b"test file content").unwrap();
        temp_file.flush().unwrap();

        let from_file = ContentDigest::of_file(temp_file.path()).unwrap();
        assert_eq!(from_file, ContentDigest::of(b"test file content"));
    }

    #[test]
    fn test_digest_from_file_nonexistent() {
        assert!(ContentDigest::of_file("/nonexistent/file.png").is_err());
    }

    #[test]
    fn test_hex_format() {
        let hex = ContentDigest::of(b"test").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(ContentDigest::from_hex(&hex).unwrap(), ContentDigest::of(b"test"));
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ContentDigest::from_hex("zz").is_err());
        assert!(ContentDigest::from_hex("abcd").is_err());
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let digest = ContentDigest::of(b"frame");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));

        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
