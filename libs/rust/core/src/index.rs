//! Append-only secondary index stored as a JSON array under a single key.

use tracing::debug;

use crate::error::ContractResult;
use crate::ledger::TxContext;

#[derive(Debug, Clone)]
pub struct KeyIndex {
    key: String,
}

impl KeyIndex {
    pub fn new(key: impl Into<String>) -> Self { Self { key: key.into() } }

    pub fn key(&self) -> &str { &self.key }

    /// A missing index key reads as empty.
    pub fn load(&self, tx: &TxContext<'_>) -> ContractResult<Vec<String>> {
        Ok(tx.get_record::<Vec<String>>(&self.key)?.unwrap_or_default())
    }

    /// Read-append-write; no dedup. Safe only because transitions are serialized.
    pub fn append(&self, tx: &mut TxContext<'_>, id: &str) -> ContractResult<()> {
        let mut ids = self.load(tx)?;
        ids.push(id.to_string());
        tx.put_record(&self.key, &ids)
    }

    pub fn reset(&self, tx: &mut TxContext<'_>) -> ContractResult<()> {
        tx.put_record(&self.key, &Vec::<String>::new())
    }

    /// Best-effort join: entries whose resolution fails are skipped.
    pub fn resolve<T, F>(&self, tx: &TxContext<'_>, mut resolve_one: F) -> ContractResult<Vec<T>>
    where
        F: FnMut(&TxContext<'_>, &str) -> ContractResult<T>,
    {
        let ids = self.load(tx)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in &ids {
            match resolve_one(tx, id) {
                Ok(item) => out.push(item),
                Err(e) => debug!(
                    index = %self.key,
                    id = %id,
                    error = %e,
                    "skipping unresolved index entry"
                ),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContractError;
    use crate::ledger::{Ledger, MemoryBackend};

    #[test]
    fn append_preserves_order_and_duplicates() {
        let ledger = Ledger::new(MemoryBackend::default());
        let idx = KeyIndex::new("idx");
        ledger.submit(|tx| { idx.append(tx, "a")?; idx.append(tx, "b")?; idx.append(tx, "a") }).unwrap();
        let ids = ledger.evaluate(|tx| idx.load(tx)).unwrap();
        assert_eq!(ids, vec!["a", "b", "a"]);
    }

    #[test]
    fn resolve_skips_failures() {
        let ledger = Ledger::new(MemoryBackend::default());
        let idx = KeyIndex::new("idx");
        ledger.submit(|tx| { idx.append(tx, "1")?; idx.append(tx, "x")?; idx.append(tx, "3") }).unwrap();
        let nums = ledger.evaluate(|tx| {
            idx.resolve(tx, |_, id| id.parse::<u32>().map_err(|e| ContractError::InvalidArgument(e.to_string())))
        }).unwrap();
        assert_eq!(nums, vec![1, 3]);
    }

    #[test]
    fn missing_index_is_empty() {
        let ledger = Ledger::new(MemoryBackend::default());
        assert!(ledger.evaluate(|tx| KeyIndex::new("none").load(tx)).unwrap().is_empty());
    }
}
