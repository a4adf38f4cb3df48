use crate::error::{HemlockError, HemlockResult};
use std::time::Duration;

use super::context::PipelineContext;

/// One step of the protect pipeline
///
/// Stages run strictly in order on a shared [`PipelineContext`]; the first
/// failure stops the run.
///
/// # Example
/// ```
/// use hemlock_lib::error::HemlockResult;
/// use hemlock_lib::pipeline::{PipelineContext, PipelineStage};
///
/// struct TagStage;
///
/// impl PipelineStage for TagStage {
///     fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()> {
///         context.set_metadata("tagged", "yes");
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "Tag"
///     }
/// }
/// ```
pub trait PipelineStage: Send + Sync {
    fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()>;

    /// Name used in logs and stage results
    fn name(&self) -> &str;

    fn should_skip(&self, _context: &PipelineContext) -> bool {
        false
    }

    /// Input validation, run before `execute`
    fn pre_execute(&self, _context: &PipelineContext) -> HemlockResult<()> {
        Ok(())
    }

    /// Output check, run after a successful `execute`
    fn post_execute(&self, _context: &PipelineContext) -> HemlockResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
    pub skipped: bool,
}

impl StageResult {
    pub fn success(stage_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            stage_name: stage_name.into(),
            success: true,
            error: None,
            duration,
            skipped: false,
        }
    }

    pub fn failure(
        stage_name: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            success: false,
            error: Some(error.into()),
            duration,
            skipped: false,
        }
    }

    pub fn skipped(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            success: true,
            error: None,
            duration: Duration::ZERO,
            skipped: true,
        }
    }
}

/// Outcome of a whole pipeline run
///
/// On failure `cause` holds the failing stage's original error, so callers
/// can propagate it unchanged instead of re-parsing `error`.
#[derive(Debug)]
pub struct PipelineResult {
    pub pipeline_name: String,
    pub success: bool,
    pub stage_results: Vec<StageResult>,
    pub total_duration: Duration,
    pub error: Option<String>,
    pub cause: Option<HemlockError>,
}

impl PipelineResult {
    pub fn success(
        pipeline_name: impl Into<String>,
        stage_results: Vec<StageResult>,
        total_duration: Duration,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            success: true,
            stage_results,
            total_duration,
            error: None,
            cause: None,
        }
    }

    pub fn failure(
        pipeline_name: impl Into<String>,
        stage_results: Vec<StageResult>,
        cause: HemlockError,
        total_duration: Duration,
    ) -> Self {
        let pipeline_name = pipeline_name.into();
        let failed = stage_results
            .iter()
            .find(|r| !r.success)
            .map(|r| r.stage_name.clone())
            .unwrap_or_default();
        Self {
            error: Some(format!("Pipeline '{}' failed at '{}': {}", pipeline_name, failed, cause)),
            pipeline_name,
            success: false,
            stage_results,
            total_duration,
            cause: Some(cause),
        }
    }

    pub fn executed_stages(&self) -> usize {
        self.stage_results.iter().filter(|r| !r.skipped).count()
    }

    pub fn skipped_stages(&self) -> usize {
        self.stage_results.iter().filter(|r| r.skipped).count()
    }

    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| !r.success)
    }

    /// `Ok(())` on success, otherwise the failing stage's error
    pub fn into_result(self) -> HemlockResult<()> {
        if self.success {
            return Ok(());
        }
        Err(self.cause.unwrap_or_else(|| {
            HemlockError::PipelineError(self.error.unwrap_or_else(|| "unknown failure".to_string()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_result_constructors() {
        let ok = StageResult::success("Hash", Duration::from_millis(5));
        assert!(ok.success && !ok.skipped && ok.error.is_none());

        let failed = StageResult::failure("Sign", "no key", Duration::from_millis(1));
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("no key"));

        let skipped = StageResult::skipped("Persist");
        assert!(skipped.success && skipped.skipped);
        assert_eq!(skipped.duration, Duration::ZERO);
    }

    #[test]
    fn test_pipeline_result_counts() {
        let stage_results = vec![
            StageResult::success("Hash", Duration::from_millis(1)),
            StageResult::skipped("Record"),
            StageResult::success("Sign", Duration::from_millis(2)),
        ];
        let result = PipelineResult::success("protect", stage_results, Duration::from_millis(3));

        assert_eq!(result.executed_stages(), 2);
        assert_eq!(result.skipped_stages(), 1);
        assert!(result.failed_stage().is_none());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_failure_keeps_original_error() {
        let stage_results = vec![
            StageResult::success("Hash", Duration::from_millis(1)),
            StageResult::failure("Sign", "bad key", Duration::from_millis(1)),
        ];
        let result = PipelineResult::failure(
            "protect",
            stage_results,
            HemlockError::SigningFailed("bad key".to_string()),
            Duration::from_millis(2),
        );

        assert!(!result.success);
        assert_eq!(result.failed_stage().unwrap().stage_name, "Sign");
        assert!(result.error.as_deref().unwrap().contains("'Sign'"));
        assert!(matches!(
            result.into_result(),
            Err(HemlockError::SigningFailed(_))
        ));
    }
}
