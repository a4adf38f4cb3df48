//! Engine seams
//!
//! [`ProvenanceEngine`] wires the key store, the protect pipeline, the
//! verifier and the job manager together. Transport layers (HTTP handlers,
//! CLIs) call these methods and nothing below them.

use crate::app_log;
use crate::config::HemlockConfig;
use crate::error::{HemlockError, HemlockResult};
use crate::evidence::{
    ContentDigest, DeviceIdentity, KeyStore, ProvenanceId, ProvenanceRecord, SignatureInfo,
    TamperReport, Verifier, VerifyKey, VerifyOutcome, VerifyRequest,
};
use crate::jobs::{Job, JobId, JobKind, JobManager, JobOutput};
use crate::logger::{LogEntry, LogFilter, LogLevel, LOGGER};
use crate::pipeline::context::keys;
use crate::pipeline::stages::protect_pipeline;
use crate::pipeline::PipelineContext;
use crate::repository::{FileProvenanceRepository, ProvenanceRepository};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use uuid::Uuid;

/// Result of protecting one media file
#[derive(Debug, Clone, Serialize)]
pub struct ProtectOutcome {
    pub provenance_id: ProvenanceId,
    pub record: ProvenanceRecord,
    /// Digest of the whole file as it was read
    pub artifact_digest: ContentDigest,
    pub signature: SignatureInfo,
}

#[derive(Clone)]
pub struct ProvenanceEngine {
    config: HemlockConfig,
    keystore: KeyStore,
    identity: Arc<Mutex<Option<Arc<DeviceIdentity>>>>,
    repository: Arc<dyn ProvenanceRepository>,
    jobs: Arc<JobManager>,
}

impl ProvenanceEngine {
    /// File-backed engine on the tokio runtime the caller is running on
    pub fn new(config: HemlockConfig) -> HemlockResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| HemlockError::RuntimeUnavailable(e.to_string()))?;
        let repository = Arc::new(FileProvenanceRepository::new(&config.provenance_dir));
        Self::with_parts(config, repository, runtime)
    }

    /// Engine with an explicit store and runtime handle.
    ///
    /// Applies `config.log_level` to the process-wide [`LOGGER`].
    pub fn with_parts(
        config: HemlockConfig,
        repository: Arc<dyn ProvenanceRepository>,
        runtime: Handle,
    ) -> HemlockResult<Self> {
        LOGGER.set_min_level(config.log_level);
        config.ensure_dirs()?;

        let keystore = KeyStore::new(config.private_key_path(), config.public_key_path());
        let jobs = JobManager::new(runtime, config.job_ttl(), config.max_jobs);

        app_log!(
            LogLevel::Info,
            "Engine ready (provenance: {}, grid: {})",
            config.provenance_dir.display(),
            config.grid
        );

        Ok(Self {
            config,
            keystore,
            identity: Arc::new(Mutex::new(None)),
            repository,
            jobs: Arc::new(jobs),
        })
    }

    pub fn config(&self) -> &HemlockConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn ProvenanceRepository> {
        Arc::clone(&self.repository)
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Device identity, loaded or generated on first use and cached after
    pub fn ensure_identity(&self) -> HemlockResult<Arc<DeviceIdentity>> {
        let mut cached = self.identity.lock()?;
        if let Some(identity) = cached.as_ref() {
            return Ok(Arc::clone(identity));
        }

        let identity = Arc::new(self.keystore.ensure_identity()?);
        *cached = Some(Arc::clone(&identity));
        Ok(identity)
    }

    /// Device public key as SubjectPublicKeyInfo PEM
    pub fn get_public_key(&self) -> HemlockResult<String> {
        self.ensure_identity()?.public_key_pem()
    }

    pub fn protect<P: AsRef<Path>>(&self, media_path: P) -> HemlockResult<ProtectOutcome> {
        self.protect_with_metadata(media_path, BTreeMap::new())
    }

    /// Hash, sign and store provenance for `media_path`; `LATEST` moves to it
    pub fn protect_with_metadata<P: AsRef<Path>>(
        &self,
        media_path: P,
        metadata: BTreeMap<String, String>,
    ) -> HemlockResult<ProtectOutcome> {
        let media_path = media_path.as_ref();
        let identity = self.ensure_identity()?;
        let pipeline = protect_pipeline(self.config.grid, identity, Arc::clone(&self.repository));

        let mut context = PipelineContext::new(Uuid::new_v4().to_string());
        context.set_path(keys::MEDIA_PATH, media_path.to_path_buf());
        for (key, value) in metadata {
            context.set_metadata(key, value);
        }

        pipeline.run(&mut context)?;

        let outcome = ProtectOutcome {
            provenance_id: context.get_json(keys::PROVENANCE_ID)?,
            record: context.get_json(keys::RECORD)?,
            artifact_digest: context.get_json(keys::ARTIFACT_DIGEST)?,
            signature: context.get_json(keys::SIGNATURE_INFO)?,
        };

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Protected {} as {} ({} digests)",
                media_path.display(),
                outcome.provenance_id,
                outcome.record.hashes.len()
            ),
            "engine",
        );
        Ok(outcome)
    }

    /// Verify against the latest record, optionally trusting a caller key
    pub fn verify<P: AsRef<Path>>(&self, media_path: P, public_key_pem: Option<&str>) -> TamperReport {
        let media_path = media_path.as_ref();
        let mut request = VerifyRequest::latest();
        if let Some(pem) = public_key_pem {
            request = request.with_public_key_pem(pem);
        }
        let outcome = self.verify_outcome(media_path, &request);
        TamperReport::from_outcome(media_path, &outcome)
    }

    pub fn verify_outcome<P: AsRef<Path>>(&self, media_path: P, request: &VerifyRequest) -> VerifyOutcome {
        let mut verifier = Verifier::new(Arc::clone(&self.repository), &self.config.tamper_dir);

        if request.key == VerifyKey::Device {
            match self.ensure_identity() {
                Ok(identity) => verifier = verifier.with_device_key(identity.verifying_key()),
                Err(e) => return VerifyOutcome::from_error(&e),
            }
        }

        verifier.verify(media_path, request)
    }

    /// Queue a protect run; poll the id with [`JobManager::get`]
    pub fn submit_protect(&self, media_path: impl Into<PathBuf>, metadata: BTreeMap<String, String>) -> JobId {
        let engine = self.clone();
        let media_path = media_path.into();
        self.jobs.submit(JobKind::Protect, move || {
            engine
                .protect_with_metadata(&media_path, metadata)
                .map(JobOutput::Protected)
        })
    }

    /// Queue a verify run against the latest record
    pub fn submit_verify(&self, media_path: impl Into<PathBuf>, public_key_pem: Option<String>) -> JobId {
        let engine = self.clone();
        let media_path = media_path.into();
        self.jobs.submit(JobKind::Verify, move || {
            let report = engine.verify(&media_path, public_key_pem.as_deref());
            Ok(JobOutput::Verified(report))
        })
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id)
    }

    /// Log entries recorded for a job, oldest first
    pub fn job_logs(&self, id: &JobId) -> Vec<LogEntry> {
        self.jobs.logs(id)
    }

    pub fn logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        LOGGER.query(filter)
    }

    pub fn clear_logs(&self) {
        LOGGER.clear_logs();
    }
}
