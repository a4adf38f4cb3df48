use crate::error::HemlockResult;
use crate::evidence::{ContentDigest, Dimensions, GridSize, MediaKind, ProvenanceRecord};
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::context::keys;
use crate::pipeline::{PipelineContext, PipelineStage};

/// Stage that assembles the unsigned provenance record
///
/// # Context Requirements
/// - Input: `media_kind`, `dimensions`, `digests`, `grid` (images)
/// - Input: context metadata, copied into the record
///
/// # Context Outputs
/// - `record` (ProvenanceRecord as JSON)
pub struct RecordStage {
    key_id: String,
}

impl RecordStage {
    /// `key_id` identifies the device key that will sign the record
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
        }
    }
}

impl PipelineStage for RecordStage {
    fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()> {
        let kind: MediaKind = context.get_json(keys::MEDIA_KIND)?;
        let dimensions: Dimensions = context.get_json(keys::DIMENSIONS)?;
        let digests: Vec<ContentDigest> = context.get_json(keys::DIGESTS)?;

        let mut builder = ProvenanceRecord::builder()
            .media_kind(kind)
            .dimensions(dimensions)
            .key_id(&self.key_id)
            .metadata(context.metadata().clone());

        builder = match kind {
            MediaKind::Image => builder.grid(context.get_json::<GridSize>(keys::GRID)?),
            MediaKind::Video => builder.frame_count(digests.len() as u64),
        };

        let record = builder.hashes(digests).build()?;

        LOGGER.log(
            LogLevel::Debug,
            &format!(
                "Built {} record with {} hashes (run: {})",
                record.media_kind,
                record.hashes.len(),
                context.run_id()
            ),
            "pipeline::record",
        );

        context.set_json(keys::RECORD, &record)
    }

    fn name(&self) -> &str {
        "Build Record"
    }
}
