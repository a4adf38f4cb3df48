use crate::error::{HemlockError, HemlockResult};
use crate::evidence::ProvenanceId;
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::context::keys;
use crate::pipeline::{PipelineContext, PipelineStage};
use crate::repository::ProvenanceRepository;
use std::sync::Arc;

/// Stage that stores the signed record under a fresh provenance id
///
/// # Context Requirements
/// - Input: `record_bytes`, `signature`
///
/// # Context Outputs
/// - `provenance_id`
pub struct PersistStage {
    repository: Arc<dyn ProvenanceRepository>,
}

impl PersistStage {
    pub fn new(repository: Arc<dyn ProvenanceRepository>) -> Self {
        Self { repository }
    }
}

impl PipelineStage for PersistStage {
    fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()> {
        let record_bytes = context.get_bytes(keys::RECORD_BYTES)?;
        let signature = context.get_bytes(keys::SIGNATURE)?;

        let id = ProvenanceId::new();
        self.repository.save(&id, &record_bytes, &signature)?;

        LOGGER.log(
            LogLevel::Info,
            &format!("Stored provenance {} (run: {})", id, context.run_id()),
            "pipeline::persist",
        );

        context.set_json(keys::PROVENANCE_ID, &id)
    }

    fn name(&self) -> &str {
        "Persist Provenance"
    }

    /// Read the pair back; anything other than the exact bytes is a failed save
    fn post_execute(&self, context: &PipelineContext) -> HemlockResult<()> {
        let id: ProvenanceId = context.get_json(keys::PROVENANCE_ID)?;
        let stored = self.repository.load(&id)?.ok_or_else(|| {
            HemlockError::StorageSaveFailed(format!("provenance {} missing after save", id))
        })?;

        if stored.record_bytes != context.get_bytes(keys::RECORD_BYTES)?
            || stored.signature != context.get_bytes(keys::SIGNATURE)?
        {
            return Err(HemlockError::StorageSaveFailed(format!(
                "provenance {} read back different bytes",
                id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryProvenanceRepository;

    #[test]
    fn test_persist_stage_saves_and_sets_id() {
        let repository = Arc::new(InMemoryProvenanceRepository::new());
        let stage = PersistStage::new(repository.clone());

        let mut context = PipelineContext::new("run-1");
        context.set_bytes(keys::RECORD_BYTES, b"{\"v\":1}");
        context.set_bytes(keys::SIGNATURE, b"sig");

        stage.execute(&mut context).unwrap();
        stage.post_execute(&context).unwrap();

        let id: ProvenanceId = context.get_json(keys::PROVENANCE_ID).unwrap();
        assert_eq!(repository.latest().unwrap(), Some(id));
        assert_eq!(repository.load(&id).unwrap().unwrap().signature, b"sig".to_vec());
    }

    #[test]
    fn test_post_execute_detects_lost_write() {
        let repository = Arc::new(InMemoryProvenanceRepository::new());
        let stage = PersistStage::new(repository.clone());

        let mut context = PipelineContext::new("run-1");
        context.set_bytes(keys::RECORD_BYTES, b"{}");
        context.set_bytes(keys::SIGNATURE, b"sig");
        stage.execute(&mut context).unwrap();

        let id: ProvenanceId = context.get_json(keys::PROVENANCE_ID).unwrap();
        repository.delete(&id).unwrap();
        assert!(matches!(
            stage.post_execute(&context),
            Err(HemlockError::StorageSaveFailed(_))
        ));
    }

    #[test]
    fn test_persist_requires_signature() {
        let stage = PersistStage::new(Arc::new(InMemoryProvenanceRepository::new()));
        let mut context = PipelineContext::new("run-1");
        context.set_bytes(keys::RECORD_BYTES, b"{}");
        assert!(stage.execute(&mut context).is_err());
    }
}
