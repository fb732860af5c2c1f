use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::{CommitBatch, HistoryIter, KeyModification, LedgerBackend, WriteOp};
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct MemoryState {
    state: BTreeMap<String, Vec<u8>>,
    history: HashMap<String, Vec<KeyModification>>,
    height: u64,
}

/// In-process backend. A batch is applied under a single write lock, so readers
/// observe either none or all of it.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.inner.read().state.len() }

    pub fn is_empty(&self) -> bool { self.inner.read().state.is_empty() }
}

impl LedgerBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.inner.read().state.get(key).cloned())
    }

    fn history(&self, key: &str) -> Result<HistoryIter, LedgerError> {
        let snapshot = self.inner.read().history.get(key).cloned().unwrap_or_default();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn height(&self) -> Result<u64, LedgerError> { Ok(self.inner.read().height) }

    fn commit(&self, batch: &CommitBatch) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        for (key, op) in &batch.writes {
            match op {
                WriteOp::Put(value) => { inner.state.insert(key.clone(), value.clone()); }
                WriteOp::Delete => { inner.state.remove(key); }
            }
        }
        for (key, modification) in batch.modifications() {
            inner.history.entry(key.to_string()).or_default().push(modification);
        }
        inner.height = inner.height.max(batch.seq);
        Ok(())
    }
}
