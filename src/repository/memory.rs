//! In-memory repository, for tests and embedding callers that persist
//! records themselves

use super::traits::{ProvenanceRepository, StoredProvenance};
use crate::error::HemlockResult;
use crate::evidence::ProvenanceId;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ProvenanceId, StoredProvenance>,
    latest: Option<ProvenanceId>,
}

#[derive(Debug, Default)]
pub struct InMemoryProvenanceRepository {
    inner: RwLock<Inner>,
}

impl InMemoryProvenanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProvenanceRepository for InMemoryProvenanceRepository {
    fn save(&self, id: &ProvenanceId, record_bytes: &[u8], signature: &[u8]) -> HemlockResult<()> {
        let mut inner = self.inner.write()?;
        inner.entries.insert(
            *id,
            StoredProvenance {
                id: *id,
                record_bytes: record_bytes.to_vec(),
                signature: signature.to_vec(),
            },
        );
        inner.latest = Some(*id);
        Ok(())
    }

    fn load(&self, id: &ProvenanceId) -> HemlockResult<Option<StoredProvenance>> {
        Ok(self.inner.read()?.entries.get(id).cloned())
    }

    fn latest(&self) -> HemlockResult<Option<ProvenanceId>> {
        Ok(self.inner.read()?.latest)
    }

    fn delete(&self, id: &ProvenanceId) -> HemlockResult<bool> {
        let mut inner = self.inner.write()?;
        let removed = inner.entries.remove(id).is_some();
        if inner.latest == Some(*id) {
            inner.latest = None;
        }
        Ok(removed)
    }

    fn list(&self) -> HemlockResult<Vec<ProvenanceId>> {
        Ok(self.inner.read()?.entries.keys().copied().collect())
    }
}
