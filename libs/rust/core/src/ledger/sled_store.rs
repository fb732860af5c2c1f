//! Durable backend on `sled`.
//!
//! Trees: `state` (world state), `history` (rows keyed `key 0x00 seq_be`),
//! `meta` (commit height). A batch touches all three inside one sled
//! transaction.

use std::path::Path;

use sled::transaction::TransactionResult;
use sled::Transactional;
use tracing::info;

use super::{CommitBatch, HistoryIter, KeyModification, LedgerBackend, WriteOp};
use crate::error::LedgerError;

const HEIGHT_KEY: &[u8] = b"height";

pub struct SledBackend {
    db: sled::Db,
    state: sled::Tree,
    history: sled::Tree,
    meta: sled::Tree,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let backend = Self::from_db(sled::open(path)?)?;
        info!(path = %path.display(), height = backend.height()?, "sled ledger opened");
        Ok(backend)
    }

    /// Ephemeral store, removed when dropped.
    pub fn temporary() -> Result<Self, LedgerError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, LedgerError> {
        let state = db.open_tree("state")?;
        let history = db.open_tree("history")?;
        let meta = db.open_tree("meta")?;
        Ok(Self { db, state, history, meta })
    }
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

fn history_row_key(key: &str, seq: u64) -> Vec<u8> {
    let mut row = history_prefix(key);
    row.extend_from_slice(&seq.to_be_bytes());
    row
}

impl LedgerBackend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.state.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn history(&self, key: &str) -> Result<HistoryIter, LedgerError> {
        let owner = key.to_string();
        let rows = self.history.scan_prefix(history_prefix(key)).values();
        Ok(Box::new(rows.map(move |row| {
            let raw = row?;
            serde_json::from_slice::<KeyModification>(&raw).map_err(|e| {
                LedgerError::CorruptHistory { key: owner.clone(), reason: e.to_string() }
            })
        })))
    }

    fn height(&self) -> Result<u64, LedgerError> {
        match self.meta.get(HEIGHT_KEY)? {
            None => Ok(0),
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .as_ref()
                    .try_into()
                    .map_err(|_| LedgerError::Backend("malformed height record".into()))?;
                Ok(u64::from_be_bytes(bytes))
            }
        }
    }

    fn commit(&self, batch: &CommitBatch) -> Result<(), LedgerError> {
        let rows = batch
            .modifications()
            .map(|(key, m)| -> Result<_, LedgerError> {
                Ok((history_row_key(key, batch.seq), serde_json::to_vec(&m)?))
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        let height = batch.seq.to_be_bytes();

        let result: TransactionResult<(), String> =
            (&self.state, &self.history, &self.meta).transaction(|(state, history, meta)| {
                for (key, op) in &batch.writes {
                    match op {
                        WriteOp::Put(value) => { state.insert(key.as_bytes(), value.as_slice())?; }
                        WriteOp::Delete => { state.remove(key.as_bytes())?; }
                    }
                }
                for (row_key, row) in &rows {
                    history.insert(row_key.as_slice(), row.as_slice())?;
                }
                meta.insert(HEIGHT_KEY, &height[..])?;
                Ok(())
            });
        result.map_err(|e| LedgerError::Backend(e.to_string()))?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;

    #[test]
    fn history_scan_does_not_leak_into_longer_keys() {
        let ledger = Ledger::new(SledBackend::temporary().unwrap());
        ledger.submit(|tx| { tx.put_state("m1", b"a".to_vec())?; Ok(tx.put_state("m10", b"b".to_vec())?) }).unwrap();
        ledger.submit(|tx| Ok(tx.put_state("m1", b"c".to_vec())?)).unwrap();

        let m1: Vec<_> = ledger.backend().history("m1").unwrap().map(|r| r.unwrap().value).collect();
        assert_eq!(m1, vec![b"a".to_vec(), b"c".to_vec()]);
        assert_eq!(ledger.backend().history("m10").unwrap().count(), 1);
        assert_eq!(ledger.height().unwrap(), 2);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("fedledger-sled-{}", uuid::Uuid::new_v4()));
        {
            let ledger = Ledger::new(SledBackend::open(&dir).unwrap());
            ledger.submit(|tx| Ok(tx.put_state("k", b"v".to_vec())?)).unwrap();
            ledger.submit(|tx| Ok(tx.del_state("k")?)).unwrap();
        }
        let reopened = SledBackend::open(&dir).unwrap();
        assert_eq!(reopened.height().unwrap(), 2);
        assert!(reopened.get("k").unwrap().is_none());
        let entries: Vec<_> = reopened.history("k").unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_delete);
        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
