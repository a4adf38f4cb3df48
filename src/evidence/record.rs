use super::block_hash::GridSize;
use super::hash::{ContentDigest, HASH_ALGORITHM};
use super::media::MediaKind;
use crate::error::{HemlockError, HemlockResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current record layout version
pub const RECORD_VERSION: u32 = 1;

/// Identifier of one stored record + signature pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceId(Uuid);

impl ProvenanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProvenanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ProvenanceId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProvenanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProvenanceId {
    type Err = HemlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| HemlockError::SerializationError(format!("invalid provenance id '{}': {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Signed statement of what a media file looked like at protect time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub version: u32,
    pub media_kind: MediaKind,
    pub algorithm: String,
    pub dimensions: Dimensions,
    /// Number of chained frame digests (video only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
    /// Block grid the hashes were computed over (image only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSize>,
    pub hashes: Vec<ContentDigest>,
    pub key_id: String,
    pub signed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ProvenanceRecord {
    pub fn builder() -> ProvenanceRecordBuilder {
        ProvenanceRecordBuilder::new()
    }

    /// Bytes that get signed and stored
    pub fn canonical_bytes(&self) -> HemlockResult<Vec<u8>> {
        canonical_bytes(self)
    }

    /// Parse a stored record
    pub fn from_canonical(bytes: &[u8]) -> HemlockResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            HemlockError::SerializationError(format!("malformed provenance record: {}", e))
        })
    }
}

/// Canonical JSON encoding: object keys sorted at every depth, no whitespace
pub fn canonical_bytes<T: Serialize>(value: &T) -> HemlockResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&sort_keys(value))?)
}

/// Re-encode arbitrary JSON bytes in canonical form
pub fn canonicalize_json(bytes: &[u8]) -> HemlockResult<Vec<u8>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| HemlockError::SerializationError(format!("not valid JSON: {}", e)))?;
    Ok(serde_json::to_vec(&sort_keys(value))?)
}

// Rebuilt explicitly so the result does not depend on the map backing
// serde_json was compiled with.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Builder for [`ProvenanceRecord`]
///
/// # Example
/// ```
/// use hemlock_lib::evidence::{ContentDigest, Dimensions, GridSize, MediaKind, ProvenanceRecord};
///
/// let record = ProvenanceRecord::builder()
///     .media_kind(MediaKind::Image)
///     .dimensions(Dimensions::new(2, 2))
///     .grid(GridSize::new(1, 1))
///     .hashes(vec![ContentDigest::of(b"block")])
///     .key_id("abc123")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ProvenanceRecordBuilder {
    media_kind: Option<MediaKind>,
    dimensions: Option<Dimensions>,
    frame_count: Option<u64>,
    grid: Option<GridSize>,
    hashes: Vec<ContentDigest>,
    key_id: Option<String>,
    signed_at: Option<DateTime<Utc>>,
    metadata: BTreeMap<String, String>,
}

impl ProvenanceRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = Some(kind);
        self
    }

    pub fn dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn frame_count(mut self, count: u64) -> Self {
        self.frame_count = Some(count);
        self
    }

    pub fn grid(mut self, grid: GridSize) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn hashes(mut self, hashes: Vec<ContentDigest>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn signed_at(mut self, at: DateTime<Utc>) -> Self {
        self.signed_at = Some(at);
        self
    }

    pub fn metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> HemlockResult<ProvenanceRecord> {
        let media_kind = self
            .media_kind
            .ok_or_else(|| HemlockError::BuilderError("media_kind is required".to_string()))?;
        let dimensions = self
            .dimensions
            .ok_or_else(|| HemlockError::BuilderError("dimensions are required".to_string()))?;
        let key_id = self
            .key_id
            .ok_or_else(|| HemlockError::BuilderError("key_id is required".to_string()))?;

        if self.hashes.is_empty() {
            return Err(HemlockError::BuilderError("hash list is empty".to_string()));
        }

        let (grid, frame_count) = match media_kind {
            MediaKind::Image => {
                let grid = self.grid.ok_or_else(|| {
                    HemlockError::BuilderError("image records need a grid".to_string())
                })?;
                if grid.block_count() != self.hashes.len() {
                    return Err(HemlockError::BuilderError(format!(
                        "grid {} expects {} hashes, got {}",
                        grid,
                        grid.block_count(),
                        self.hashes.len()
                    )));
                }
                (Some(grid), None)
            }
            MediaKind::Video => {
                let count = self.frame_count.unwrap_or(self.hashes.len() as u64);
                if count != self.hashes.len() as u64 {
                    return Err(HemlockError::BuilderError(format!(
                        "frame_count {} does not match {} hashes",
                        count,
                        self.hashes.len()
                    )));
                }
                (None, Some(count))
            }
        };

        Ok(ProvenanceRecord {
            version: RECORD_VERSION,
            media_kind,
            algorithm: HASH_ALGORITHM.to_string(),
            dimensions,
            frame_count,
            grid,
            hashes: self.hashes,
            key_id,
            signed_at: self.signed_at.unwrap_or_else(Utc::now),
            metadata: self.metadata,
        })
    }
}
