//! Background job execution
//!
//! Long-running protect and verify work is handed to [`JobManager::submit`],
//! which returns a [`JobId`] immediately and runs the work on the tokio
//! blocking pool. Callers poll [`JobManager::get`] for the outcome and read
//! the job's log entries with [`JobManager::logs`]. Entries are written before
//! the state they describe becomes visible, so a terminal job's logs are
//! complete.
//!
//! The registry only keeps terminal jobs for a bounded time and count: jobs
//! older than the TTL are evicted, and above `max_jobs` the oldest terminal
//! jobs go first. Pending and running jobs are never evicted.

pub mod state;

pub use state::{Job, JobId, JobKind, JobOutput, JobState};

use crate::error::{HemlockError, HemlockResult};
use crate::logger::{LogEntry, LogFilter, LogLevel, LOGGER};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

struct Entry {
    job: Job,
    finished: Option<Instant>,
}

type Registry = Arc<Mutex<HashMap<JobId, Entry>>>;

/// Context key carrying the job id on every job log entry
pub const JOB_ID_KEY: &str = "job_id";

/// Selects the log entries of one job
pub fn job_log_filter(id: &JobId) -> LogFilter {
    LogFilter::default().context(JOB_ID_KEY, Value::String(id.to_string()))
}

pub struct JobManager {
    runtime: Handle,
    registry: Registry,
    ttl: Duration,
    max_jobs: usize,
}

impl JobManager {
    pub fn new(runtime: Handle, ttl: Duration, max_jobs: usize) -> Self {
        Self {
            runtime,
            registry: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            max_jobs,
        }
    }

    /// Bind to the tokio runtime the caller is running on
    pub fn from_current_runtime(ttl: Duration, max_jobs: usize) -> HemlockResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| HemlockError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self::new(runtime, ttl, max_jobs))
    }

    /// Register a PENDING job and schedule `work` without blocking the caller.
    ///
    /// The job ends DONE with the returned output, or FAILED with the error
    /// message. A panic inside `work` also ends the job FAILED.
    pub fn submit<F>(&self, kind: JobKind, work: F) -> JobId
    where
        F: FnOnce() -> HemlockResult<JobOutput> + Send + 'static,
    {
        let id = JobId::new();
        {
            let mut registry = lock(&self.registry);
            registry.insert(
                id,
                Entry {
                    job: Job::pending(id, kind),
                    finished: None,
                },
            );
            evict(&mut registry, self.ttl, self.max_jobs);
        }

        log_job(LogLevel::Info, id, kind, JobState::Pending, None);

        let registry = Arc::clone(&self.registry);
        self.runtime.spawn(async move {
            let worker_registry = Arc::clone(&registry);
            let handle = tokio::task::spawn_blocking(move || {
                log_job(LogLevel::Debug, id, kind, JobState::Running, None);
                update(&worker_registry, id, |job| job.start());
                work()
            });

            match handle.await {
                Ok(Ok(output)) => {
                    log_job(LogLevel::Info, id, kind, JobState::Done, None);
                    update(&registry, id, |job| job.complete(output));
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    log_job(LogLevel::Error, id, kind, JobState::Failed, Some(&message));
                    update(&registry, id, |job| job.fail(message));
                }
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        format!("worker panicked: {}", panic_message(join_error.into_panic()))
                    } else {
                        "worker was cancelled".to_string()
                    };
                    log_job(LogLevel::Error, id, kind, JobState::Failed, Some(&message));
                    update(&registry, id, |job| job.fail(message));
                }
            }
        });

        id
    }

    /// Snapshot of a job, or `None` for unknown or evicted ids
    pub fn get(&self, id: &JobId) -> Option<Job> {
        lock(&self.registry).get(id).map(|entry| entry.job.clone())
    }

    /// Buffered log entries of a job, oldest first
    pub fn logs(&self, id: &JobId) -> Vec<LogEntry> {
        LOGGER.query(&job_log_filter(id))
    }

    #[cfg(test)]
    pub(crate) async fn wait(&self, id: &JobId, timeout: Duration) -> Option<Job> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.get(id)?;
            if job.state.is_terminal() || Instant::now() >= deadline {
                return Some(job);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Apply the retention policy now; returns the number of evicted jobs
    pub fn prune(&self) -> usize {
        evict(&mut lock(&self.registry), self.ttl, self.max_jobs)
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Every critical section leaves the map consistent, so a poisoned lock is
// still safe to use.
fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<JobId, Entry>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn log_job(level: LogLevel, id: JobId, kind: JobKind, state: JobState, error: Option<&str>) {
    let mut context = HashMap::new();
    context.insert(JOB_ID_KEY.to_string(), Value::String(id.to_string()));
    context.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
    context.insert("state".to_string(), Value::String(state.as_str().to_string()));

    let message = match error {
        Some(error) => {
            context.insert("error".to_string(), Value::String(error.to_string()));
            format!("Job {} {}: {}", id, state.as_str(), error)
        }
        None => format!("Job {} ({}) {}", id, kind.as_str(), state.as_str()),
    };
    LOGGER.log_with_context(level, &message, "jobs", context);
}

fn update<F>(registry: &Registry, id: JobId, transition: F)
where
    F: FnOnce(&mut Job) -> bool,
{
    let mut registry = lock(registry);
    let Some(entry) = registry.get_mut(&id) else {
        return;
    };
    let from = entry.job.state;
    if !transition(&mut entry.job) {
        LOGGER.log(
            LogLevel::Warn,
            &format!("Job {}: transition from {:?} rejected", id, from),
            "jobs",
        );
        return;
    }
    if entry.job.state.is_terminal() {
        entry.finished = Some(Instant::now());
    }
}

fn evict(registry: &mut HashMap<JobId, Entry>, ttl: Duration, max_jobs: usize) -> usize {
    let before = registry.len();
    let now = Instant::now();
    registry.retain(|_, entry| match entry.finished {
        Some(finished) => now.duration_since(finished) < ttl,
        None => true,
    });

    if registry.len() > max_jobs {
        let mut terminal: Vec<(Instant, JobId)> = registry
            .iter()
            .filter_map(|(id, entry)| entry.finished.map(|at| (at, *id)))
            .collect();
        terminal.sort();
        let excess = registry.len() - max_jobs;
        for (_, id) in terminal.into_iter().take(excess) {
            registry.remove(&id);
        }
    }

    let evicted = before - registry.len();
    if evicted > 0 {
        LOGGER.log(
            LogLevel::Debug,
            &format!("Evicted {} finished jobs", evicted),
            "jobs",
        );
    }
    evicted
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{FailureType, TamperReport, VerifyOutcome};

    const WAIT: Duration = Duration::from_secs(10);

    fn report() -> JobOutput {
        JobOutput::Verified(TamperReport::from_outcome(
            "a.png",
            &VerifyOutcome::Rejected {
                provenance_id: None,
                failure: FailureType::NoProvenanceFound,
            },
        ))
    }

    fn manager(ttl: Duration, max_jobs: usize) -> JobManager {
        JobManager::from_current_runtime(ttl, max_jobs).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_completes() {
        let jobs = manager(Duration::from_secs(60), 16);
        let id = jobs.submit(JobKind::Custom, || Ok(report()));

        let job = jobs.wait(&id, WAIT).await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
        assert!(job.started_at.is_some() && job.finished_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_error_becomes_failed() {
        let jobs = manager(Duration::from_secs(60), 16);
        let id = jobs.submit(JobKind::Custom, || {
            Err(HemlockError::MediaDecode("truncated gif".to_string()))
        });

        let job = jobs.wait(&id, WAIT).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.unwrap().contains("truncated gif"));
        assert!(job.result.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_terminal_job_logs_are_complete() {
        let jobs = manager(Duration::from_secs(60), 16);
        let failed = jobs.submit(JobKind::Verify, || {
            Err(HemlockError::MediaDecode("bad frame".to_string()))
        });
        let other = jobs.submit(JobKind::Custom, || Ok(report()));
        jobs.wait(&failed, WAIT).await.unwrap();
        jobs.wait(&other, WAIT).await.unwrap();

        // Other tests share the global logger; only this job's entries match
        let logs = jobs.logs(&failed);
        let states: Vec<&str> = logs
            .iter()
            .filter_map(|entry| entry.context.as_ref()?.get("state")?.as_str())
            .collect();
        // RUNNING is a debug entry and may be filtered
        assert_eq!(states.first(), Some(&"PENDING"));
        assert_eq!(states.last(), Some(&"FAILED"));
        let last = logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        let context = last.context.as_ref().unwrap();
        assert_eq!(context.get("kind"), Some(&Value::String("verify".to_string())));
        assert!(context.get("error").unwrap().as_str().unwrap().contains("bad frame"));
        assert!(logs.iter().all(|entry| entry.source == "jobs"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_becomes_failed() {
        let jobs = manager(Duration::from_secs(60), 16);
        let id = jobs.submit(JobKind::Custom, || panic!("decoder exploded"));

        let job = jobs.wait(&id, WAIT).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.unwrap().contains("decoder exploded"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_does_not_block_and_ids_are_fresh() {
        let jobs = manager(Duration::from_secs(60), 16);
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        let blocked = jobs.submit(JobKind::Custom, move || {
            rx.recv().ok();
            Ok(report())
        });
        let other = jobs.submit(JobKind::Custom, || Ok(report()));
        assert_ne!(blocked, other);

        let state = jobs.get(&blocked).unwrap().state;
        assert!(matches!(state, JobState::Pending | JobState::Running));

        tx.send(()).unwrap();
        assert_eq!(jobs.wait(&blocked, WAIT).await.unwrap().state, JobState::Done);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_id() {
        let jobs = manager(Duration::from_secs(60), 16);
        assert!(jobs.get(&JobId::new()).is_none());
        assert!(jobs.wait(&JobId::new(), WAIT).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ttl_evicts_only_finished_jobs() {
        let jobs = manager(Duration::ZERO, 16);
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        let finished = jobs.submit(JobKind::Custom, || Ok(report()));
        let running = jobs.submit(JobKind::Custom, move || {
            rx.recv().ok();
            Ok(report())
        });

        // Wait for the first job without going through `wait`, which needs the
        // entry to still exist
        let deadline = Instant::now() + WAIT;
        while jobs
            .get(&finished)
            .map(|job| !job.state.is_terminal())
            .unwrap_or(false)
            && Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        jobs.prune();
        assert!(jobs.get(&finished).is_none());
        assert!(jobs.get(&running).is_some());

        tx.send(()).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_capacity_evicts_oldest_finished_first() {
        let jobs = manager(Duration::from_secs(3600), 2);

        let first = jobs.submit(JobKind::Custom, || Ok(report()));
        jobs.wait(&first, WAIT).await.unwrap();
        let second = jobs.submit(JobKind::Custom, || Ok(report()));
        jobs.wait(&second, WAIT).await.unwrap();
        let third = jobs.submit(JobKind::Custom, || Ok(report()));
        jobs.wait(&third, WAIT).await.unwrap();

        jobs.prune();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.get(&first).is_none());
        assert!(jobs.get(&second).is_some());
        assert!(jobs.get(&third).is_some());
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            JobManager::from_current_runtime(Duration::from_secs(1), 1),
            Err(HemlockError::RuntimeUnavailable(_))
        ));
    }
}
