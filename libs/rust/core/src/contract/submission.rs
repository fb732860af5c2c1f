//! Local model submissions and the per-round submission index.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{registry, state};
use crate::error::{ContractError, ContractResult};
use crate::index::KeyIndex;
use crate::ledger::TxContext;
use crate::records::{round_models_key, LocalModel, ModelStatus, LOCAL_MODEL_DOC_TYPE};

/// Arguments of a local model submission. Blobs are stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalModelSubmission {
    #[serde(rename = "modelID")]
    pub model_id: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub weights: String,
    pub latent_features: String,
    pub prototypes: String,
    pub accuracy: f64,
    pub loss: f64,
    pub alignment_loss: f64,
    pub data_size: u64,
}

pub(crate) fn round_index(round: u64) -> KeyIndex { KeyIndex::new(round_models_key(round)) }

/// Stores the model stamped with the current round, refreshes the owning
/// client and appends the model id to that round's index.
///
/// An existing record under the same model id is overwritten and the id is
/// indexed a second time.
pub fn submit_local_model(
    tx: &mut TxContext<'_>,
    submission: LocalModelSubmission,
) -> ContractResult<LocalModel> {
    super::ensure_finite(&[
        ("accuracy", submission.accuracy),
        ("loss", submission.loss),
        ("alignmentLoss", submission.alignment_loss),
    ])?;
    let mut client = registry::get_client(tx, &submission.client_id)?;
    if !client.is_active {
        return Err(ContractError::InactiveClient(client.client_id));
    }
    let config = state::aggregation_config(tx)?;
    let now = tx.timestamp();

    let model = LocalModel {
        model_id: submission.model_id,
        client_id: submission.client_id,
        round: config.current_round,
        domain: client.domain.clone(),
        weights: submission.weights,
        latent_features: submission.latent_features,
        prototypes: submission.prototypes,
        accuracy: submission.accuracy,
        loss: submission.loss,
        alignment_loss: submission.alignment_loss,
        data_size: submission.data_size,
        timestamp: now,
        status: ModelStatus::Submitted,
        doc_type: LOCAL_MODEL_DOC_TYPE.to_string(),
    };
    tx.put_record(&model.model_id, &model)?;

    client.last_update = now;
    client.model_accuracy = model.accuracy;
    tx.put_record(&client.client_id, &client)?;

    round_index(model.round).append(tx, &model.model_id)?;
    info!(
        model_id = %model.model_id,
        client_id = %model.client_id,
        round = model.round,
        accuracy = model.accuracy,
        "local model submitted"
    );
    Ok(model)
}

pub fn get_local_model(tx: &TxContext<'_>, model_id: &str) -> ContractResult<LocalModel> {
    tx.get_record(model_id)?
        .ok_or_else(|| ContractError::not_found("model", model_id))
}

/// Indexed models of `round` still awaiting aggregation.
pub fn local_models_by_round(tx: &TxContext<'_>, round: u64) -> ContractResult<Vec<LocalModel>> {
    let models = round_index(round).resolve(tx, get_local_model)?;
    Ok(models.into_iter().filter(|m| m.status == ModelStatus::Submitted).collect())
}
