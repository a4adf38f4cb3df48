use super::block_hash::{hash_image, partition, BlockRect};
use super::frame_chain::{first_divergence, FrameChain};
use super::hash::ContentDigest;
use super::keystore::parse_public_key_pem;
use super::media::{load_image, open_frames, MediaKind};
use super::record::{canonicalize_json, Dimensions, ProvenanceId, ProvenanceRecord};
use super::signature;
use super::tamper_map::{render_tamper_map, save_tamper_map};
use crate::error::{HemlockError, HemlockResult};
use crate::logger::{LogLevel, LOGGER};
use crate::repository::{ProvenanceRepository, StoredProvenance};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which public key a verification trusts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VerifyKey {
    /// The engine's own device key
    #[default]
    Device,
    /// Caller-supplied SubjectPublicKeyInfo PEM
    Pem(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyRequest {
    pub key: VerifyKey,
    /// Record to check against; `None` means the latest one
    pub provenance_id: Option<ProvenanceId>,
}

impl VerifyRequest {
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn for_id(id: ProvenanceId) -> Self {
        Self {
            key: VerifyKey::Device,
            provenance_id: Some(id),
        }
    }

    pub fn with_public_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.key = VerifyKey::Pem(pem.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    SignatureMismatch,
    NoProvenanceFound,
    BlockHashMismatch,
    DimensionMismatch,
    FrameHashMismatch,
    FrameCountMismatch,
    MediaKindMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyErrorKind {
    KeyLoad,
    StorageLoad,
    MalformedRecord,
    MediaDecode,
    UnsupportedMedia,
    Internal,
}

impl From<&HemlockError> for VerifyErrorKind {
    fn from(err: &HemlockError) -> Self {
        match err {
            HemlockError::KeyLoad(_) => VerifyErrorKind::KeyLoad,
            HemlockError::StorageLoadFailed(_) => VerifyErrorKind::StorageLoad,
            HemlockError::SerializationError(_) | HemlockError::Json(_) => {
                VerifyErrorKind::MalformedRecord
            }
            HemlockError::MediaDecode(_) | HemlockError::InvalidGrid { .. } => {
                VerifyErrorKind::MediaDecode
            }
            HemlockError::UnsupportedMedia(_) => VerifyErrorKind::UnsupportedMedia,
            _ => VerifyErrorKind::Internal,
        }
    }
}

/// Result of checking a media file against a signed record.
///
/// Tampering is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Verified {
        provenance_id: ProvenanceId,
        media_kind: MediaKind,
    },
    Tampered {
        provenance_id: ProvenanceId,
        media_kind: MediaKind,
        failure: FailureType,
        /// Block indices (images) or frame indices (video) that differ
        mismatched: Vec<usize>,
        /// First frame index where the chain breaks (video only)
        first_divergence: Option<usize>,
        tamper_map: Option<PathBuf>,
    },
    /// The record could not be trusted, content was never compared
    Rejected {
        provenance_id: Option<ProvenanceId>,
        failure: FailureType,
    },
    Error {
        kind: VerifyErrorKind,
        message: String,
    },
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified { .. })
    }

    pub fn status(&self) -> ReportStatus {
        match self {
            VerifyOutcome::Verified { .. } => ReportStatus::Verified,
            VerifyOutcome::Tampered { .. } => ReportStatus::Tampered,
            VerifyOutcome::Rejected { .. } => ReportStatus::Failed,
            VerifyOutcome::Error { .. } => ReportStatus::Error,
        }
    }

    pub fn from_error(err: &HemlockError) -> Self {
        VerifyOutcome::Error {
            kind: VerifyErrorKind::from(err),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Verified,
    Tampered,
    Failed,
    Error,
}

/// Flat, serializable view of a [`VerifyOutcome`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperReport {
    pub file: String,
    pub status: ReportStatus,
    pub failure_type: Option<FailureType>,
    pub mismatched_blocks: Vec<usize>,
    pub first_divergence: Option<usize>,
    pub tamper_map: Option<PathBuf>,
    pub provenance_id: Option<ProvenanceId>,
    pub media_kind: Option<MediaKind>,
    pub detail: Option<String>,
}

impl TamperReport {
    pub fn from_outcome<P: AsRef<Path>>(media_path: P, outcome: &VerifyOutcome) -> Self {
        let file = media_path
            .as_ref()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| media_path.as_ref().display().to_string());

        let mut report = TamperReport {
            file,
            status: outcome.status(),
            failure_type: None,
            mismatched_blocks: Vec::new(),
            first_divergence: None,
            tamper_map: None,
            provenance_id: None,
            media_kind: None,
            detail: None,
        };

        match outcome {
            VerifyOutcome::Verified {
                provenance_id,
                media_kind,
            } => {
                report.provenance_id = Some(*provenance_id);
                report.media_kind = Some(*media_kind);
            }
            VerifyOutcome::Tampered {
                provenance_id,
                media_kind,
                failure,
                mismatched,
                first_divergence,
                tamper_map,
            } => {
                report.provenance_id = Some(*provenance_id);
                report.media_kind = Some(*media_kind);
                report.failure_type = Some(*failure);
                report.mismatched_blocks = mismatched.clone();
                report.first_divergence = *first_divergence;
                report.tamper_map = tamper_map.clone();
            }
            VerifyOutcome::Rejected {
                provenance_id,
                failure,
            } => {
                report.provenance_id = *provenance_id;
                report.failure_type = Some(*failure);
            }
            VerifyOutcome::Error { message, .. } => {
                report.detail = Some(message.clone());
            }
        }

        report
    }

    /// Status as reported to API callers; a rejected record counts as tampered
    pub fn api_status(&self) -> ReportStatus {
        match self.status {
            ReportStatus::Failed => ReportStatus::Tampered,
            other => other,
        }
    }
}

/// Checks candidate media against stored, signed provenance records
pub struct Verifier {
    repository: Arc<dyn ProvenanceRepository>,
    tamper_dir: PathBuf,
    device_key: Option<VerifyingKey>,
}

impl Verifier {
    pub fn new(repository: Arc<dyn ProvenanceRepository>, tamper_dir: impl Into<PathBuf>) -> Self {
        Self {
            repository,
            tamper_dir: tamper_dir.into(),
            device_key: None,
        }
    }

    pub fn with_device_key(mut self, key: VerifyingKey) -> Self {
        self.device_key = Some(key);
        self
    }

    /// Verify `media_path`. Every failure is folded into the outcome.
    pub fn verify<P: AsRef<Path>>(&self, media_path: P, request: &VerifyRequest) -> VerifyOutcome {
        let media_path = media_path.as_ref();
        let outcome = self
            .run(media_path, request)
            .unwrap_or_else(|e| VerifyOutcome::from_error(&e));

        let level = match outcome.status() {
            ReportStatus::Verified => LogLevel::Info,
            ReportStatus::Error => LogLevel::Error,
            _ => LogLevel::Warn,
        };
        LOGGER.log(
            level,
            &format!("Verify {}: {:?}", media_path.display(), outcome.status()),
            "verification",
        );
        outcome
    }

    fn run(&self, media_path: &Path, request: &VerifyRequest) -> HemlockResult<VerifyOutcome> {
        let key = self.resolve_key(&request.key)?;

        let stored = match self.load_stored(request.provenance_id)? {
            Some(stored) => stored,
            None => {
                return Ok(VerifyOutcome::Rejected {
                    provenance_id: request.provenance_id,
                    failure: FailureType::NoProvenanceFound,
                })
            }
        };

        // Fail closed: nothing is compared unless the record is authentic
        let canonical = match check_signature(&key, &stored) {
            Ok(canonical) => canonical,
            Err(e) => {
                LOGGER.log(
                    LogLevel::Warn,
                    &format!("Provenance {} rejected: {}", stored.id, e),
                    "verification",
                );
                return Ok(VerifyOutcome::Rejected {
                    provenance_id: Some(stored.id),
                    failure: FailureType::SignatureMismatch,
                });
            }
        };
        let record = ProvenanceRecord::from_canonical(&canonical)?;

        let candidate_kind = MediaKind::from_path(media_path)?;
        if candidate_kind != record.media_kind {
            return Ok(VerifyOutcome::Tampered {
                provenance_id: stored.id,
                media_kind: candidate_kind,
                failure: FailureType::MediaKindMismatch,
                mismatched: (0..record.hashes.len()).collect(),
                first_divergence: None,
                tamper_map: None,
            });
        }

        match record.media_kind {
            MediaKind::Image => self.compare_image(media_path, stored.id, &record),
            MediaKind::Video => compare_video(media_path, stored.id, &record),
        }
    }

    fn resolve_key(&self, key: &VerifyKey) -> HemlockResult<VerifyingKey> {
        match key {
            VerifyKey::Device => self.device_key.clone().ok_or_else(|| {
                HemlockError::KeyLoad("no device public key available".to_string())
            }),
            VerifyKey::Pem(pem) => parse_public_key_pem(pem),
        }
    }

    fn load_stored(&self, id: Option<ProvenanceId>) -> HemlockResult<Option<StoredProvenance>> {
        let stored = match id {
            Some(id) => self.repository.load(&id),
            None => self.repository.load_latest(),
        };
        stored.map_err(|e| match e {
            HemlockError::StorageLoadFailed(_) => e,
            other => HemlockError::StorageLoadFailed(other.to_string()),
        })
    }

    fn compare_image(
        &self,
        media_path: &Path,
        provenance_id: ProvenanceId,
        record: &ProvenanceRecord,
    ) -> HemlockResult<VerifyOutcome> {
        let grid = record.grid.ok_or_else(|| {
            HemlockError::SerializationError("image record has no grid".to_string())
        })?;
        if record.hashes.len() != grid.block_count() {
            return Err(HemlockError::SerializationError(format!(
                "record lists {} hashes for a {} grid",
                record.hashes.len(),
                grid
            )));
        }

        let pixels = load_image(media_path)?;
        let (width, height) = pixels.dimensions();
        let blocks = partition(width, height, grid.rows, grid.cols)?;

        let (failure, mismatched): (FailureType, Vec<usize>) = if Dimensions::new(width, height) != record.dimensions {
            (FailureType::DimensionMismatch, (0..blocks.len()).collect())
        } else {
            let recomputed = hash_image(&pixels, grid)?;
            (
                FailureType::BlockHashMismatch,
                mismatched_indices(&record.hashes, &recomputed),
            )
        };

        if mismatched.is_empty() {
            return Ok(VerifyOutcome::Verified {
                provenance_id,
                media_kind: MediaKind::Image,
            });
        }

        let flagged: Vec<BlockRect> = mismatched.iter().map(|&i| blocks[i]).collect();
        let map = render_tamper_map(&pixels, &flagged);
        let map_path = save_tamper_map(&map, &self.tamper_dir)?;

        LOGGER.log(
            LogLevel::Warn,
            &format!(
                "{} of {} blocks differ, tamper map at {}",
                mismatched.len(),
                blocks.len(),
                map_path.display()
            ),
            "verification",
        );

        Ok(VerifyOutcome::Tampered {
            provenance_id,
            media_kind: MediaKind::Image,
            failure,
            mismatched,
            first_divergence: None,
            tamper_map: Some(map_path),
        })
    }
}

fn compare_video(
    media_path: &Path,
    provenance_id: ProvenanceId,
    record: &ProvenanceRecord,
) -> HemlockResult<VerifyOutcome> {
    let mut frames = open_frames(media_path)?;
    let mut chain = FrameChain::new();
    while let Some(frame) = frames.next_frame()? {
        chain.push(&frame.bytes);
    }
    let recomputed = chain.finish();

    let divergence = match first_divergence(&record.hashes, &recomputed) {
        None => {
            return Ok(VerifyOutcome::Verified {
                provenance_id,
                media_kind: MediaKind::Video,
            })
        }
        Some(index) => index,
    };

    let shorter = record.hashes.len().min(recomputed.len());
    let failure = if divergence == shorter {
        FailureType::FrameCountMismatch
    } else {
        FailureType::FrameHashMismatch
    };

    Ok(VerifyOutcome::Tampered {
        provenance_id,
        media_kind: MediaKind::Video,
        failure,
        mismatched: mismatched_indices(&record.hashes, &recomputed),
        first_divergence: Some(divergence),
        tamper_map: None,
    })
}

/// Verify the stored signature and return the canonical record bytes
fn check_signature(key: &VerifyingKey, stored: &StoredProvenance) -> HemlockResult<Vec<u8>> {
    let canonical = canonicalize_json(&stored.record_bytes)
        .map_err(|e| HemlockError::SignatureInvalid(e.to_string()))?;
    signature::verify(key, &canonical, &stored.signature)?;
    Ok(canonical)
}

/// Indices that differ or exist on one side only
fn mismatched_indices(stored: &[ContentDigest], recomputed: &[ContentDigest]) -> Vec<usize> {
    let longest = stored.len().max(recomputed.len());
    (0..longest)
        .filter(|&i| stored.get(i) != recomputed.get(i))
        .collect()
}
