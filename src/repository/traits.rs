//! Repository trait definitions
//!
//! Storage backends for signed provenance records implement
//! [`ProvenanceRepository`]; the engine only ever talks to the trait.

use crate::error::HemlockResult;
use crate::evidence::ProvenanceId;

/// Canonical record bytes and their detached signature, as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProvenance {
    pub id: ProvenanceId,
    pub record_bytes: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Repository for signed provenance records
///
/// A record and its signature are always written and read as one pair.
/// Implementations can use different storage backends (file, memory, ...)
pub trait ProvenanceRepository: Send + Sync {
    /// Store a record + signature pair under `id` and make it the latest
    fn save(&self, id: &ProvenanceId, record_bytes: &[u8], signature: &[u8]) -> HemlockResult<()>;

    /// Load the pair stored under `id`
    fn load(&self, id: &ProvenanceId) -> HemlockResult<Option<StoredProvenance>>;

    /// Id of the most recently saved pair
    fn latest(&self) -> HemlockResult<Option<ProvenanceId>>;

    /// Remove a stored pair, returning whether anything was deleted
    fn delete(&self, id: &ProvenanceId) -> HemlockResult<bool>;

    /// Every stored id, in no particular order
    fn list(&self) -> HemlockResult<Vec<ProvenanceId>>;

    /// Load the pair `LATEST` points at
    fn load_latest(&self) -> HemlockResult<Option<StoredProvenance>> {
        match self.latest()? {
            Some(id) => self.load(&id),
            None => Ok(None),
        }
    }

    /// Check if a pair exists for `id`
    fn has(&self, id: &ProvenanceId) -> HemlockResult<bool> {
        Ok(self.load(id)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Minimal implementation exercising the provided methods
    struct MockRepository {
        entries: Mutex<HashMap<ProvenanceId, (Vec<u8>, Vec<u8>)>>,
        latest: Mutex<Option<ProvenanceId>>,
    }

    impl MockRepository {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                latest: Mutex::new(None),
            }
        }
    }

    impl ProvenanceRepository for MockRepository {
        fn save(&self, id: &ProvenanceId, record_bytes: &[u8], signature: &[u8]) -> HemlockResult<()> {
            self.entries
                .lock()?
                .insert(*id, (record_bytes.to_vec(), signature.to_vec()));
            *self.latest.lock()? = Some(*id);
            Ok(())
        }

        fn load(&self, id: &ProvenanceId) -> HemlockResult<Option<StoredProvenance>> {
            Ok(self.entries.lock()?.get(id).map(|(record, signature)| StoredProvenance {
                id: *id,
                record_bytes: record.clone(),
                signature: signature.clone(),
            }))
        }

        fn latest(&self) -> HemlockResult<Option<ProvenanceId>> {
            Ok(*self.latest.lock()?)
        }

        fn delete(&self, id: &ProvenanceId) -> HemlockResult<bool> {
            Ok(self.entries.lock()?.remove(id).is_some())
        }

        fn list(&self) -> HemlockResult<Vec<ProvenanceId>> {
            Ok(self.entries.lock()?.keys().copied().collect())
        }
    }

    #[test]
    fn test_default_methods() {
        let repo = MockRepository::new();
        assert!(repo.load_latest().unwrap().is_none());

        let id = ProvenanceId::new();
        assert!(!repo.has(&id).unwrap());

        repo.save(&id, b"{}", b"sig").unwrap();
        assert!(repo.has(&id).unwrap());

        let latest = repo.load_latest().unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.signature, b"sig".to_vec());
    }
}
