use crate::error::{HemlockError, HemlockResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Well-known context keys shared by the protect stages
pub mod keys {
    pub const MEDIA_PATH: &str = "media_path";
    pub const MEDIA_KIND: &str = "media_kind";
    pub const DIMENSIONS: &str = "dimensions";
    pub const GRID: &str = "grid";
    pub const DIGESTS: &str = "digests";
    pub const ARTIFACT_DIGEST: &str = "artifact_digest";
    pub const RECORD: &str = "record";
    pub const RECORD_BYTES: &str = "record_bytes";
    pub const SIGNATURE: &str = "signature";
    pub const SIGNATURE_INFO: &str = "signature_info";
    pub const PROVENANCE_ID: &str = "provenance_id";
}

/// Shared state handed from stage to stage.
///
/// Values are held as JSON so stages stay decoupled from each other's types;
/// [`set_json`](Self::set_json) / [`get_json`](Self::get_json) convert at the
/// edges. Caller-supplied record metadata travels separately.
///
/// # Example
/// ```
/// use hemlock_lib::pipeline::PipelineContext;
/// use std::path::PathBuf;
///
/// let mut context = PipelineContext::new("run-123");
/// context.set_path("media_path", PathBuf::from("/tmp/photo.png"));
/// context.set_metadata("camera", "front");
///
/// assert_eq!(context.get_path("media_path").unwrap(), PathBuf::from("/tmp/photo.png"));
/// assert_eq!(context.get_metadata("camera"), Some("front"));
/// ```
#[derive(Debug, Clone)]
pub struct PipelineContext {
    run_id: String,
    data: HashMap<String, Value>,
    metadata: BTreeMap<String, String>,
}

impl PipelineContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            data: HashMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Identifier used to correlate log lines of one run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value or fail with a pipeline error naming the missing key
    pub fn get_required(&self, key: &str) -> HemlockResult<&Value> {
        self.data.get(key).ok_or_else(|| {
            HemlockError::PipelineError(format!("Required context key not found: {}", key))
        })
    }

    /// Store any serializable value
    pub fn set_json<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> HemlockResult<()> {
        let value = serde_json::to_value(value)?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    /// Read a value back into its concrete type
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> HemlockResult<T> {
        let value = self.get_required(key)?.clone();
        serde_json::from_value(value).map_err(|e| {
            HemlockError::PipelineError(format!("Context key '{}' has the wrong shape: {}", key, e))
        })
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    pub fn get_string(&self, key: &str) -> HemlockResult<String> {
        match self.get_required(key)? {
            Value::String(s) => Ok(s.clone()),
            _ => Err(HemlockError::PipelineError(format!(
                "Context key '{}' is not a string",
                key
            ))),
        }
    }

    pub fn set_path(&mut self, key: impl Into<String>, path: PathBuf) {
        self.data.insert(
            key.into(),
            Value::String(path.to_string_lossy().to_string()),
        );
    }

    pub fn get_path(&self, key: &str) -> HemlockResult<PathBuf> {
        Ok(PathBuf::from(self.get_string(key)?))
    }

    /// Binary payloads are stored hex-encoded
    pub fn set_bytes(&mut self, key: impl Into<String>, bytes: &[u8]) {
        self.data.insert(key.into(), Value::String(hex::encode(bytes)));
    }

    pub fn get_bytes(&self, key: &str) -> HemlockResult<Vec<u8>> {
        let encoded = self.get_string(key)?;
        hex::decode(&encoded).map_err(|e| {
            HemlockError::PipelineError(format!("Context key '{}' is not hex: {}", key, e))
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    /// Caller metadata, embedded verbatim into the signed record
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn keys(&self) -> Vec<&String> {
        self.data.keys().collect()
    }
}
