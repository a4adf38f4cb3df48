use super::context::PipelineContext;
use super::core::{PipelineResult, PipelineStage, StageResult};
use crate::error::{HemlockError, HemlockResult};
use crate::logger::{LogLevel, LOGGER};
use std::time::Instant;

/// Sequential stage runner
///
/// # Example
/// ```
/// use hemlock_lib::pipeline::{Pipeline, PipelineContext};
/// use hemlock_lib::pipeline::stages::HashStage;
/// use hemlock_lib::evidence::GridSize;
///
/// let pipeline = Pipeline::builder("hash-only")
///     .add_stage(HashStage::new(GridSize::default()))
///     .build();
///
/// assert_eq!(pipeline.stage_count(), 1);
/// ```
pub struct Pipeline {
    name: String,
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage in order.
    ///
    /// A stage failure does not surface as `Err`: it ends the run and is
    /// reported through the returned [`PipelineResult`].
    pub fn execute(&self, context: &mut PipelineContext) -> HemlockResult<PipelineResult> {
        let total = self.stages.len();
        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Starting pipeline '{}' with {} stages (run: {})",
                self.name,
                total,
                context.run_id()
            ),
            "pipeline",
        );

        let pipeline_start = Instant::now();
        let mut stage_results = Vec::with_capacity(total);

        for (index, stage) in self.stages.iter().enumerate() {
            let stage_name = stage.name();

            if stage.should_skip(context) {
                LOGGER.log(
                    LogLevel::Info,
                    &format!("Skipping stage {}/{}: {}", index + 1, total, stage_name),
                    "pipeline",
                );
                stage_results.push(StageResult::skipped(stage_name));
                continue;
            }

            LOGGER.log(
                LogLevel::Debug,
                &format!(
                    "Executing stage {}/{}: {} (run: {})",
                    index + 1,
                    total,
                    stage_name,
                    context.run_id()
                ),
                "pipeline",
            );

            let stage_start = Instant::now();
            let outcome = stage
                .pre_execute(context)
                .map_err(|e| ("pre-execute", e))
                .and_then(|_| stage.execute(context).map_err(|e| ("execute", e)))
                .and_then(|_| stage.post_execute(context).map_err(|e| ("post-execute", e)));
            let duration = stage_start.elapsed();

            if let Err((phase, error)) = outcome {
                LOGGER.log(
                    LogLevel::Error,
                    &format!(
                        "Stage '{}' {} failed: {} (run: {})",
                        stage_name,
                        phase,
                        error,
                        context.run_id()
                    ),
                    "pipeline",
                );
                stage_results.push(StageResult::failure(
                    stage_name,
                    format!("{} failed: {}", phase, error),
                    duration,
                ));
                return Ok(PipelineResult::failure(
                    &self.name,
                    stage_results,
                    error,
                    pipeline_start.elapsed(),
                ));
            }

            LOGGER.log(
                LogLevel::Debug,
                &format!(
                    "Stage '{}' completed in {:.3}s",
                    stage_name,
                    duration.as_secs_f64()
                ),
                "pipeline",
            );
            stage_results.push(StageResult::success(stage_name, duration));
        }

        let total_duration = pipeline_start.elapsed();
        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Pipeline '{}' completed in {:.3}s (run: {})",
                self.name,
                total_duration.as_secs_f64(),
                context.run_id()
            ),
            "pipeline",
        );

        Ok(PipelineResult::success(&self.name, stage_results, total_duration))
    }

    /// Execute and collapse the result into the failing stage's error
    pub fn run(&self, context: &mut PipelineContext) -> HemlockResult<()> {
        self.execute(context)?.into_result()
    }
}

pub struct PipelineBuilder {
    name: String,
    stages: Vec<Box<dyn PipelineStage>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn add_stage<S: PipelineStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn add_boxed_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            name: self.name,
            stages: self.stages,
        }
    }

    /// Like [`build`](Self::build), but rejects a pipeline with no stages
    pub fn try_build(self) -> HemlockResult<Pipeline> {
        if self.stages.is_empty() {
            return Err(HemlockError::BuilderError(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }
        Ok(self.build())
    }
}
