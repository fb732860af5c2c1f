//! Ledger substrate: a flat key-value world state with an append-only
//! modification log per key and a single global commit order.
//!
//! `Ledger` is the only writer. Each mutating transition runs under the
//! exclusive side of its gate against a `TxContext`; the collected write set is
//! handed to the backend as one `CommitBatch` and applied atomically, or dropped
//! when the transition returns an error. Queries hold the shared side, so they
//! never observe a commit half applied.

mod memory;
mod sled_store;

pub use memory::MemoryBackend;
pub use sled_store::SledBackend;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ContractError, ContractResult, LedgerError};

/// One committed write (or delete) of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyModification {
    pub tx_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    #[serde(with = "b64")]
    pub value: Vec<u8>,
}

/// Lazily evaluated, commit-ordered modifications of one key.
pub type HistoryIter = Box<dyn Iterator<Item = Result<KeyModification, LedgerError>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Vec<u8>),
    Delete,
}

/// The write set of one transition, stamped with its position in the global order.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub seq: u64,
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub writes: Vec<(String, WriteOp)>,
}

impl CommitBatch {
    pub fn modifications(&self) -> impl Iterator<Item = (&str, KeyModification)> + '_ {
        self.writes.iter().map(move |(key, op)| {
            let (is_delete, value) = match op {
                WriteOp::Put(v) => (false, v.clone()),
                WriteOp::Delete => (true, Vec::new()),
            };
            let modification = KeyModification {
                tx_id: self.tx_id.clone(),
                seq: self.seq,
                timestamp: self.timestamp,
                is_delete,
                value,
            };
            (key.as_str(), modification)
        })
    }
}

/// Storage seam for the replicated store. Implementations must apply a batch
/// all-or-nothing and keep per-key history in commit order.
pub trait LedgerBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;
    fn history(&self, key: &str) -> Result<HistoryIter, LedgerError>;
    /// Number of committed transitions.
    fn height(&self) -> Result<u64, LedgerError>;
    fn commit(&self, batch: &CommitBatch) -> Result<(), LedgerError>;
}

impl<T: LedgerBackend + ?Sized> LedgerBackend for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> { (**self).get(key) }
    fn history(&self, key: &str) -> Result<HistoryIter, LedgerError> { (**self).history(key) }
    fn height(&self) -> Result<u64, LedgerError> { (**self).height() }
    fn commit(&self, batch: &CommitBatch) -> Result<(), LedgerError> { (**self).commit(batch) }
}

pub struct Ledger<B> {
    backend: B,
    gate: RwLock<()>,
}

impl<B: LedgerBackend> Ledger<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, gate: RwLock::new(()) }
    }

    pub fn backend(&self) -> &B { &self.backend }

    pub fn height(&self) -> Result<u64, LedgerError> { self.backend.height() }

    /// Runs a mutating transition. Transitions are serialized by the gate, so
    /// read-then-write sequences on shared index keys never interleave.
    pub fn submit<T, F>(&self, f: F) -> ContractResult<T>
    where
        F: FnOnce(&mut TxContext<'_>) -> ContractResult<T>,
    {
        let _guard = self.gate.write();
        let seq = self.backend.height()? + 1;
        let mut tx = TxContext::new(&self.backend, seq);
        let out = f(&mut tx)?;
        let batch = tx.into_batch();
        if batch.writes.is_empty() {
            return Ok(out);
        }
        self.backend.commit(&batch)?;
        debug!(tx_id = %batch.tx_id, seq, writes = batch.writes.len(), "transition committed");
        Ok(out)
    }

    /// Runs a read-only query against committed state. Every read inside `f`
    /// sees the same commit height. Must not be called from inside `submit`.
    pub fn evaluate<T, F>(&self, f: F) -> ContractResult<T>
    where
        F: FnOnce(&TxContext<'_>) -> ContractResult<T>,
    {
        let _guard = self.gate.read();
        let seq = self.backend.height()?;
        let tx = TxContext::new(&self.backend, seq);
        f(&tx)
    }
}

/// View of the world state for one transition: committed state overlaid with
/// the transition's own pending writes.
pub struct TxContext<'a> {
    backend: &'a dyn LedgerBackend,
    tx_id: String,
    seq: u64,
    timestamp: DateTime<Utc>,
    writes: BTreeMap<String, WriteOp>,
}

impl<'a> TxContext<'a> {
    fn new(backend: &'a dyn LedgerBackend, seq: u64) -> Self {
        let nonce = uuid::Uuid::new_v4();
        let mut hasher = Sha256::new();
        hasher.update(nonce.as_bytes());
        hasher.update(seq.to_be_bytes());
        let tx_id = hex::encode(hasher.finalize());
        Self { backend, tx_id, seq, timestamp: Utc::now(), writes: BTreeMap::new() }
    }

    pub fn tx_id(&self) -> &str { &self.tx_id }

    pub fn seq(&self) -> u64 { self.seq }

    /// Transition time; identical for every read and write in the transition.
    pub fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

    pub fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        validate_key(key)?;
        match self.writes.get(key) {
            Some(WriteOp::Put(v)) => Ok(Some(v.clone())),
            Some(WriteOp::Delete) => Ok(None),
            None => self.backend.get(key),
        }
    }

    pub fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        validate_key(key)?;
        self.writes.insert(key.to_string(), WriteOp::Put(value));
        Ok(())
    }

    pub fn del_state(&mut self, key: &str) -> Result<(), LedgerError> {
        validate_key(key)?;
        self.writes.insert(key.to_string(), WriteOp::Delete);
        Ok(())
    }

    /// Committed history only; pending writes of this transition are not included.
    pub fn history_for_key(&self, key: &str) -> Result<HistoryIter, LedgerError> {
        validate_key(key)?;
        self.backend.history(key)
    }

    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> ContractResult<Option<T>> {
        match self.get_state(key)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| ContractError::Decode { key: key.to_string(), source }),
        }
    }

    pub fn put_record<T: Serialize>(&mut self, key: &str, record: &T) -> ContractResult<()> {
        let bytes = serde_json::to_vec(record).map_err(LedgerError::from)?;
        self.put_state(key, bytes)?;
        Ok(())
    }

    fn into_batch(self) -> CommitBatch {
        CommitBatch {
            seq: self.seq,
            tx_id: self.tx_id,
            timestamp: self.timestamp,
            writes: self.writes.into_iter().collect(),
        }
    }
}

fn validate_key(key: &str) -> Result<(), LedgerError> {
    if key.is_empty() || key.contains('\0') {
        return Err(LedgerError::InvalidKey(key.to_string()));
    }
    Ok(())
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T: AsRef<[u8]>, S: Serializer>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(ledger: &Ledger<MemoryBackend>, key: &str) -> Vec<KeyModification> {
        ledger.backend().history(key).unwrap().map(|m| m.unwrap()).collect()
    }

    #[test]
    fn failed_transition_leaves_no_writes() {
        let ledger = Ledger::new(MemoryBackend::default());
        let res: ContractResult<()> = ledger.submit(|tx| {
            tx.put_state("a", b"1".to_vec())?;
            Err(ContractError::InvalidArgument("boom".into()))
        });
        assert!(res.is_err());
        assert_eq!(ledger.height().unwrap(), 0);
        assert!(ledger.backend().get("a").unwrap().is_none());
        assert!(history(&ledger, "a").is_empty());
    }

    #[test]
    fn reads_see_own_pending_writes() {
        let ledger = Ledger::new(MemoryBackend::default());
        let seen = ledger.submit(|tx| {
            tx.put_state("k", b"v".to_vec())?;
            let first = tx.get_state("k")?;
            tx.del_state("k")?;
            let second = tx.get_state("k")?;
            Ok((first, second))
        }).unwrap();
        assert_eq!(seen, (Some(b"v".to_vec()), None));
    }

    #[test]
    fn empty_write_set_does_not_advance_height() {
        let ledger = Ledger::new(MemoryBackend::default());
        ledger.submit(|tx| { tx.get_state("nothing")?; Ok(()) }).unwrap();
        assert_eq!(ledger.height().unwrap(), 0);
    }

    #[test]
    fn rejects_empty_and_nul_keys() {
        let ledger = Ledger::new(MemoryBackend::default());
        let empty = ledger.submit(|tx| Ok(tx.put_state("", vec![1])?));
        assert!(matches!(empty, Err(ContractError::Ledger(LedgerError::InvalidKey(_)))));
        let nul = ledger.evaluate(|tx| Ok(tx.get_state("a\0b")?));
        assert!(matches!(nul, Err(ContractError::Ledger(LedgerError::InvalidKey(_)))));
    }

    #[test]
    fn history_records_puts_and_deletes_in_commit_order() {
        let ledger = Ledger::new(MemoryBackend::default());
        let first = ledger.submit(|tx| { tx.put_state("k", b"1".to_vec())?; Ok(tx.tx_id().to_string()) }).unwrap();
        ledger.submit(|tx| Ok(tx.put_state("k", b"2".to_vec())?)).unwrap();
        ledger.submit(|tx| Ok(tx.del_state("k")?)).unwrap();

        let entries = history(&ledger, "k");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].tx_id, first);
        assert_eq!(entries.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(entries[1].value, b"2".to_vec());
        assert!(entries[2].is_delete);
        assert!(ledger.backend().get("k").unwrap().is_none());
    }

    #[test]
    fn modification_serializes_value_as_base64() {
        let m = KeyModification { tx_id: "t".into(), seq: 1, timestamp: Utc::now(), is_delete: false, value: b"{}".to_vec() };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["value"], "e30=");
        let back: KeyModification = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
