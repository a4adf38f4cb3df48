use crate::error::{HemlockError, HemlockResult};
use crate::evidence::block_hash::{hash_image, validate_grid};
use crate::evidence::media::{load_image, open_frames};
use crate::evidence::{ContentDigest, Dimensions, FrameChain, GridSize, MediaKind};
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::context::keys;
use crate::pipeline::{PipelineContext, PipelineStage};
use std::path::Path;

/// Stage that decodes the media file and computes its content digests
///
/// Stills are hashed block by block over `grid`; videos are chained frame by
/// frame. The whole-file digest is recorded as well, for logs and callers.
///
/// # Context Requirements
/// - Input: `media_path`
///
/// # Context Outputs
/// - `media_kind`, `dimensions`, `digests`, `artifact_digest`
/// - `grid` (images only)
pub struct HashStage {
    grid: GridSize,
}

impl HashStage {
    pub fn new(grid: GridSize) -> Self {
        Self { grid }
    }

    fn hash_still(&self, path: &Path, context: &mut PipelineContext) -> HemlockResult<()> {
        let pixels = load_image(path)?;
        let (width, height) = pixels.dimensions();
        validate_grid(width, height, self.grid)?;

        let digests = hash_image(&pixels, self.grid)?;
        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Hashed {}x{} image into {} blocks (run: {})",
                width,
                height,
                digests.len(),
                context.run_id()
            ),
            "pipeline::hash",
        );

        context.set_json(keys::DIMENSIONS, &Dimensions::new(width, height))?;
        context.set_json(keys::GRID, &self.grid)?;
        context.set_json(keys::DIGESTS, &digests)
    }

    fn hash_video(&self, path: &Path, context: &mut PipelineContext) -> HemlockResult<()> {
        let mut frames = open_frames(path)?;
        let mut chain = FrameChain::new();
        let mut dimensions = None;

        while let Some(frame) = frames.next_frame()? {
            dimensions.get_or_insert(Dimensions::new(frame.width, frame.height));
            chain.push(&frame.bytes);
        }

        let dimensions = dimensions.ok_or_else(|| {
            HemlockError::MediaDecode(format!("{} contains no frames", path.display()))
        })?;

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Chained {} frames, head {} (run: {})",
                chain.len(),
                chain.head(),
                context.run_id()
            ),
            "pipeline::hash",
        );

        context.set_json(keys::DIMENSIONS, &dimensions)?;
        context.set_json(keys::DIGESTS, &chain.finish())
    }
}

impl Default for HashStage {
    fn default() -> Self {
        Self::new(GridSize::default())
    }
}

impl PipelineStage for HashStage {
    fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()> {
        let media_path = context.get_path(keys::MEDIA_PATH)?;
        let kind = MediaKind::from_path(&media_path)?;
        context.set_json(keys::MEDIA_KIND, &kind)?;

        match kind {
            MediaKind::Image => self.hash_still(&media_path, context)?,
            MediaKind::Video => self.hash_video(&media_path, context)?,
        }

        let artifact = ContentDigest::of_file(&media_path)?;
        context.set_json(keys::ARTIFACT_DIGEST, &artifact)
    }

    fn name(&self) -> &str {
        "Hash Media"
    }

    fn pre_execute(&self, context: &PipelineContext) -> HemlockResult<()> {
        let media_path = context.get_path(keys::MEDIA_PATH)?;
        if !media_path.is_file() {
            return Err(HemlockError::MediaDecode(format!(
                "media file does not exist: {}",
                media_path.display()
            )));
        }
        Ok(())
    }
}
