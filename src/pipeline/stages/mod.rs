//! Stages of the protect pipeline
//!
//! 1. HashStage - decode the media and compute block or frame-chain digests
//! 2. RecordStage - assemble the provenance record
//! 3. SignStage - sign the canonical record bytes with the device key
//! 4. PersistStage - store record + signature and move `LATEST`

pub mod hash;
pub mod persist;
pub mod record;
pub mod sign;

pub use hash::HashStage;
pub use persist::PersistStage;
pub use record::RecordStage;
pub use sign::SignStage;

use super::Pipeline;
use crate::evidence::{DeviceIdentity, GridSize};
use crate::repository::ProvenanceRepository;
use std::sync::Arc;

pub const PROTECT_PIPELINE: &str = "protect";

/// The standard four-stage protect pipeline
pub fn protect_pipeline(
    grid: GridSize,
    identity: Arc<DeviceIdentity>,
    repository: Arc<dyn ProvenanceRepository>,
) -> Pipeline {
    Pipeline::builder(PROTECT_PIPELINE)
        .add_stage(HashStage::new(grid))
        .add_stage(RecordStage::new(identity.key_id()))
        .add_stage(SignStage::new(identity))
        .add_stage(PersistStage::new(repository))
        .build()
}
