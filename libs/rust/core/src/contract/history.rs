//! Audit access to the modification log of any key.

use std::iter::Peekable;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContractError, ContractResult};
use crate::ledger::{HistoryIter, KeyModification, TxContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    /// Decoded record as of this write; `null` for deletes.
    pub value: Value,
}

/// Lazy, commit-ordered history of one key. Each call to `key_history`
/// starts a fresh scan.
pub struct KeyHistory {
    key: String,
    inner: Peekable<HistoryIter>,
}

impl KeyHistory {
    pub fn key(&self) -> &str { &self.key }
}

impl Iterator for KeyHistory {
    type Item = ContractResult<HistoryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.inner.next()? {
            Ok(modification) => decode_entry(&self.key, modification),
            Err(e) => Err(e.into()),
        };
        Some(entry)
    }
}

fn decode_entry(key: &str, m: KeyModification) -> ContractResult<HistoryEntry> {
    let value = if m.is_delete {
        Value::Null
    } else {
        serde_json::from_slice(&m.value)
            .map_err(|source| ContractError::Decode { key: key.to_string(), source })?
    };
    Ok(HistoryEntry { tx_id: m.tx_id, timestamp: m.timestamp, is_delete: m.is_delete, value })
}

/// Fails with `NotFound` when the key was never written.
pub fn key_history(tx: &TxContext<'_>, key: &str) -> ContractResult<KeyHistory> {
    let mut inner = tx.history_for_key(key)?.peekable();
    if inner.peek().is_none() {
        return Err(ContractError::not_found("history for key", key));
    }
    Ok(KeyHistory { key: key.to_string(), inner })
}
