use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Fields, ProfileStore, StoreError, StoreResult};

/// In-process [`ProfileStore`] backed by a document map.
///
/// Read and write counters plus one-shot failure injection make the store's
/// traffic observable from tests, e.g. to assert that the subscription path
/// never writes.
#[derive(Default)]
pub struct InMemoryProfileStore {
    documents: Arc<Mutex<BTreeMap<String, Fields>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_next: Mutex<Option<StoreError>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `get` or `set` fail with the given error.
    pub fn inject_failure(&self, error: StoreError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> Option<StoreError> {
        self.fail_next.lock().unwrap().take()
    }

    fn document_key(collection: &str, id: &str) -> String {
        format!("{collection}/{id}")
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>> {
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        let documents = self.documents.lock().unwrap();
        Ok(documents.get(&Self::document_key(collection, id)).cloned())
    }

    fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> StoreResult<()> {
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().unwrap();
        let key = Self::document_key(collection, id);
        if merge {
            let mut merged = documents.get(&key).cloned().unwrap_or_default();
            for (field, value) in fields {
                merged.insert(field, value);
            }
            documents.insert(key, merged);
        } else {
            documents.insert(key, fields);
        }
        Ok(())
    }
}
