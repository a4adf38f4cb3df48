//! Provenance primitives: hashing, signing, records and verification

pub mod block_hash;
pub mod frame_chain;
pub mod hash;
pub mod keystore;
pub mod media;
pub mod record;
pub mod signature;
pub mod tamper_map;
pub mod verification;
#[cfg(feature = "gstreamer")]
pub mod video;

pub use block_hash::{hash_block, hash_image, partition, BlockRect, GridSize};
pub use frame_chain::{chain_digests, first_divergence, hash_frame, FrameChain, GENESIS};
pub use hash::{ContentDigest, HASH_ALGORITHM};
pub use keystore::{load_public_key, parse_public_key_pem, KeyStore};
pub use media::{open_frames, FrameSource, MediaKind, RgbFrame};
#[cfg(feature = "gstreamer")]
pub use video::ContainerFrames;
pub use record::{
    canonical_bytes, canonicalize_json, Dimensions, ProvenanceId, ProvenanceRecord,
    ProvenanceRecordBuilder,
};
pub use signature::{DeviceIdentity, SignatureInfo, SIGNATURE_ALGORITHM};
pub use verification::{
    FailureType, ReportStatus, TamperReport, Verifier, VerifyErrorKind, VerifyKey,
    VerifyOutcome, VerifyRequest,
};
