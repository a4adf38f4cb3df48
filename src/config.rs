//! Engine configuration
//!
//! Directory layout, default hashing grid, job retention and log level. A
//! config is built either through [`HemlockConfigBuilder`] or from the
//! `HEMLOCK_*` environment variables.

use crate::error::{HemlockError, HemlockResult};
use crate::evidence::GridSize;
use crate::logger::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATA_DIR: &str = "HEMLOCK_DATA_DIR";
pub const ENV_GRID: &str = "HEMLOCK_GRID";
pub const ENV_JOB_TTL_SECS: &str = "HEMLOCK_JOB_TTL_SECS";
pub const ENV_MAX_JOBS: &str = "HEMLOCK_MAX_JOBS";
pub const ENV_LOG: &str = "HEMLOCK_LOG";

const DEFAULT_DATA_DIR: &str = "hemlock-data";
const DEFAULT_JOB_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_JOBS: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HemlockConfig {
    /// Directory holding the device key pair
    pub keys_dir: PathBuf,
    /// Directory holding `<id>/record.json`, `<id>/signature.bin` and `LATEST`
    pub provenance_dir: PathBuf,
    /// Directory receiving rendered tamper maps
    pub tamper_dir: PathBuf,
    /// Block grid used when protecting still images
    pub grid: GridSize,
    /// Terminal jobs older than this are evicted from the registry
    pub job_ttl_secs: u64,
    /// Registry size above which the oldest terminal jobs are evicted
    pub max_jobs: usize,
    pub log_level: LogLevel,
}

impl HemlockConfig {
    /// Layout rooted at `data_dir` with all other values defaulted
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            keys_dir: data_dir.join("keys"),
            provenance_dir: data_dir.join("provenance"),
            tamper_dir: data_dir.join("tamper"),
            grid: GridSize::default(),
            job_ttl_secs: DEFAULT_JOB_TTL_SECS,
            max_jobs: DEFAULT_MAX_JOBS,
            log_level: LogLevel::Info,
        }
    }

    /// Read configuration from `HEMLOCK_*` environment variables
    pub fn from_env() -> HemlockResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> HemlockResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = HemlockConfigBuilder::new();

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            builder = builder.data_dir(dir);
        }
        if let Some(grid) = lookup(ENV_GRID) {
            builder = builder.grid(grid.parse()?);
        }
        if let Some(ttl) = lookup(ENV_JOB_TTL_SECS) {
            let ttl = ttl.trim().parse::<u64>().map_err(|e| {
                HemlockError::ConfigError(format!("{} is not a number: {}", ENV_JOB_TTL_SECS, e))
            })?;
            builder = builder.job_ttl(Duration::from_secs(ttl));
        }
        if let Some(max) = lookup(ENV_MAX_JOBS) {
            let max = max.trim().parse::<usize>().map_err(|e| {
                HemlockError::ConfigError(format!("{} is not a number: {}", ENV_MAX_JOBS, e))
            })?;
            builder = builder.max_jobs(max);
        }
        if let Some(level) = lookup(ENV_LOG) {
            let level = LogLevel::parse(&level).ok_or_else(|| {
                HemlockError::ConfigError(format!("unknown log level '{}'", level))
            })?;
            builder = builder.log_level(level);
        }

        builder.build()
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.keys_dir.join("private_key.pem")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.keys_dir.join("public_key.pem")
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    /// Create every configured directory
    pub fn ensure_dirs(&self) -> HemlockResult<()> {
        for dir in [&self.keys_dir, &self.provenance_dir, &self.tamper_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for HemlockConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

/// Builder for constructing HemlockConfig instances with a fluent API
///
/// # Example
/// ```
/// use hemlock_lib::config::HemlockConfigBuilder;
/// use hemlock_lib::evidence::GridSize;
///
/// let config = HemlockConfigBuilder::new()
///     .data_dir("/var/lib/hemlock")
///     .grid(GridSize::new(8, 8))
///     .max_jobs(256)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct HemlockConfigBuilder {
    data_dir: Option<PathBuf>,
    keys_dir: Option<PathBuf>,
    provenance_dir: Option<PathBuf>,
    tamper_dir: Option<PathBuf>,
    grid: Option<GridSize>,
    job_ttl: Option<Duration>,
    max_jobs: Option<usize>,
    log_level: Option<LogLevel>,
}

impl HemlockConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root directory; unset sub-directories are placed beneath it
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn keys_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keys_dir = Some(dir.into());
        self
    }

    pub fn provenance_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.provenance_dir = Some(dir.into());
        self
    }

    pub fn tamper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tamper_dir = Some(dir.into());
        self
    }

    pub fn grid(mut self, grid: GridSize) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = Some(ttl);
        self
    }

    pub fn max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = Some(max_jobs);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Build the HemlockConfig instance
    ///
    /// # Errors
    /// Returns `HemlockError::BuilderError` for a zero grid dimension or a
    /// zero job capacity
    pub fn build(self) -> HemlockResult<HemlockConfig> {
        let base = HemlockConfig::with_data_dir(
            self.data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        );

        let grid = self.grid.unwrap_or(base.grid);
        if grid.rows == 0 || grid.cols == 0 {
            return Err(HemlockError::BuilderError(format!(
                "grid dimensions must be non-zero, got {}",
                grid
            )));
        }

        let max_jobs = self.max_jobs.unwrap_or(base.max_jobs);
        if max_jobs == 0 {
            return Err(HemlockError::BuilderError(
                "max_jobs must be at least 1".to_string(),
            ));
        }

        Ok(HemlockConfig {
            keys_dir: self.keys_dir.unwrap_or(base.keys_dir),
            provenance_dir: self.provenance_dir.unwrap_or(base.provenance_dir),
            tamper_dir: self.tamper_dir.unwrap_or(base.tamper_dir),
            grid,
            job_ttl_secs: self
                .job_ttl
                .map(|ttl| ttl.as_secs())
                .unwrap_or(base.job_ttl_secs),
            max_jobs,
            log_level: self.log_level.unwrap_or(base.log_level),
        })
    }
}
