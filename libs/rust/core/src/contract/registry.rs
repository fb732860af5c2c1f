//! Client registry: participant records keyed by client id plus the
//! registration-ordered client index.

use tracing::info;

use crate::error::{ContractError, ContractResult};
use crate::index::KeyIndex;
use crate::ledger::TxContext;
use crate::records::{Client, Domain, CLIENT_DOC_TYPE, CLIENT_INDEX_KEY};

pub(crate) fn client_index() -> KeyIndex { KeyIndex::new(CLIENT_INDEX_KEY) }

/// True when anything is stored under `client_id`.
pub fn client_exists(tx: &TxContext<'_>, client_id: &str) -> ContractResult<bool> {
    Ok(tx.get_state(client_id)?.is_some())
}

pub fn register_client(
    tx: &mut TxContext<'_>,
    client_id: &str,
    domain: Domain,
    dataset_size: u64,
) -> ContractResult<Client> {
    if client_exists(tx, client_id)? {
        return Err(ContractError::AlreadyExists { kind: "client", id: client_id.to_string() });
    }
    let client = Client {
        client_id: client_id.to_string(),
        domain,
        is_active: true,
        last_update: tx.timestamp(),
        dataset_size,
        model_accuracy: 0.0,
        doc_type: CLIENT_DOC_TYPE.to_string(),
    };
    tx.put_record(client_id, &client)?;
    client_index().append(tx, client_id)?;
    info!(client_id, domain = %client.domain, dataset_size, "client registered");
    Ok(client)
}

pub fn get_client(tx: &TxContext<'_>, client_id: &str) -> ContractResult<Client> {
    tx.get_record(client_id)?
        .ok_or_else(|| ContractError::not_found("client", client_id))
}

/// Every indexed client that still resolves, in registration order.
pub fn all_clients(tx: &TxContext<'_>) -> ContractResult<Vec<Client>> {
    client_index().resolve(tx, get_client)
}

pub fn set_client_active(
    tx: &mut TxContext<'_>,
    client_id: &str,
    is_active: bool,
) -> ContractResult<Client> {
    let mut client = get_client(tx, client_id)?;
    client.is_active = is_active;
    client.last_update = tx.timestamp();
    tx.put_record(client_id, &client)?;
    info!(client_id, is_active, "client activity changed");
    Ok(client)
}
