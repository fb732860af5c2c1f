//! Error taxonomy for the ledger substrate and the coordination contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid ledger key {0:?}")]
    InvalidKey(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("corrupted history entry for key {key}: {reason}")]
    CorruptHistory { key: String, reason: String },
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Backend(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: String },
    #[error("client {0} is not active")]
    InactiveClient(String),
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),
    #[error("stored value at {key} is not a valid record: {source}")]
    Decode { key: String, #[source] source: serde_json::Error },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ContractError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ContractError::NotFound { kind, id: id.into() }
    }

    /// Stable tag used in wire responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ContractError::AlreadyExists { .. } => "AlreadyExists",
            ContractError::NotFound { .. } => "NotFound",
            ContractError::InactiveClient(_) => "InactiveClient",
            ContractError::NotInitialized(_) => "NotInitialized",
            ContractError::Decode { .. } => "DecodeError",
            ContractError::InvalidArgument(_) => "InvalidArgument",
            ContractError::UnknownFunction(_) => "UnknownFunction",
            ContractError::Ledger(_) => "LedgerError",
        }
    }
}

pub type ContractResult<T> = std::result::Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ContractError::InactiveClient("c1".into()).kind(), "InactiveClient");
        let missing = ContractError::not_found("client", "c9");
        assert_eq!(missing.to_string(), "client c9 does not exist");
        let ledger: ContractError = LedgerError::InvalidKey(String::new()).into();
        assert_eq!(ledger.kind(), "LedgerError");
    }
}
