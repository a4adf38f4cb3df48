use crate::error::{HemlockError, HemlockResult};
use crate::evidence::signature::verify;
use crate::evidence::{DeviceIdentity, ProvenanceRecord};
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::context::keys;
use crate::pipeline::{PipelineContext, PipelineStage};
use std::sync::Arc;

/// Stage that signs the canonical encoding of the record with the device key
///
/// # Context Requirements
/// - Input: `record` (ProvenanceRecord as JSON)
///
/// # Context Outputs
/// - `record_bytes` - canonical record bytes that were signed
/// - `signature` - DER-encoded ECDSA P-256 signature
/// - `signature_info`
pub struct SignStage {
    identity: Arc<DeviceIdentity>,
}

impl SignStage {
    pub fn new(identity: Arc<DeviceIdentity>) -> Self {
        Self { identity }
    }
}

impl PipelineStage for SignStage {
    fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()> {
        let record: ProvenanceRecord = context.get_json(keys::RECORD)?;
        let bytes = record.canonical_bytes()?;
        let signature = self.identity.sign(&bytes);
        let info = self.identity.signature_info(&bytes, &signature);

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Signed {} byte record with key {}... (run: {})",
                bytes.len(),
                &info.key_id[..16.min(info.key_id.len())],
                context.run_id()
            ),
            "pipeline::sign",
        );

        context.set_bytes(keys::RECORD_BYTES, &bytes);
        context.set_bytes(keys::SIGNATURE, &signature);
        context.set_json(keys::SIGNATURE_INFO, &info)
    }

    fn name(&self) -> &str {
        "Sign Record"
    }

    fn pre_execute(&self, context: &PipelineContext) -> HemlockResult<()> {
        let record: ProvenanceRecord = context.get_json(keys::RECORD)?;
        if record.key_id != self.identity.key_id() {
            return Err(HemlockError::SigningFailed(format!(
                "record names key {} but the device key is {}",
                record.key_id,
                self.identity.key_id()
            )));
        }
        Ok(())
    }

    /// A signature that does not verify must never reach the store
    fn post_execute(&self, context: &PipelineContext) -> HemlockResult<()> {
        let bytes = context.get_bytes(keys::RECORD_BYTES)?;
        let signature = context.get_bytes(keys::SIGNATURE)?;
        verify(&self.identity.verifying_key(), &bytes, &signature)
            .map_err(|e| HemlockError::SigningFailed(format!("self-check failed: {}", e)))
    }
}
