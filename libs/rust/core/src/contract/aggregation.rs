//! Round-closing transition. The numeric aggregate is computed by the caller;
//! this records it, marks the consumed models and advances the round counter.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{state, submission};
use crate::error::ContractResult;
use crate::ledger::TxContext;
use crate::records::{
    metrics_key, Domain, GlobalModel, GlobalStatus, ModelStatus, TrainingMetrics, CONFIG_KEY,
    GLOBAL_MODEL_KEY,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    #[serde(rename = "modelIDs")]
    pub model_ids: Vec<String>,
    pub aggregated_weights: String,
    pub aggregated_prototypes: String,
    pub global_accuracy: f64,
    pub global_loss: f64,
    pub alignment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationOutcome {
    pub global_model: GlobalModel,
    pub metrics: TrainingMetrics,
    /// Input ids that resolved to a stored model.
    pub resolved_models: u64,
}

#[derive(Debug, Default)]
struct DomainTally {
    count: u64,
    accuracy_sum: f64,
}

impl DomainTally {
    fn record(&mut self, accuracy: f64) {
        self.count += 1;
        self.accuracy_sum += accuracy;
    }

    fn mean_accuracy(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.accuracy_sum / self.count as f64 }
    }
}

/// `numClients` and `numParticipants` are the raw input length; the
/// source/target counts only include ids that resolved. No quorum, round cap
/// or convergence check is applied.
pub fn aggregate_models(
    tx: &mut TxContext<'_>,
    request: AggregationRequest,
) -> ContractResult<AggregationOutcome> {
    super::ensure_finite(&[
        ("globalAccuracy", request.global_accuracy),
        ("globalLoss", request.global_loss),
        ("alignmentScore", request.alignment_score),
    ])?;
    let mut global = state::global_model(tx)?;
    let mut config = state::aggregation_config(tx)?;
    let now = tx.timestamp();
    let round = config.current_round;

    let mut source = DomainTally::default();
    let mut target = DomainTally::default();
    let mut resolved = 0u64;
    for model_id in &request.model_ids {
        let mut model = match submission::get_local_model(tx, model_id) {
            Ok(model) => model,
            Err(e) => {
                debug!(model_id = %model_id, error = %e, "skipping unresolved model");
                continue;
            }
        };
        resolved += 1;
        match model.domain {
            Domain::Source => source.record(model.accuracy),
            Domain::Target => target.record(model.accuracy),
            Domain::Other(_) => {}
        }
        model.status = ModelStatus::Aggregated;
        tx.put_record(model_id, &model)?;
    }

    let participants = request.model_ids.len() as u64;
    global.version += 1;
    global.round = round;
    global.weights = request.aggregated_weights;
    global.global_prototypes = request.aggregated_prototypes;
    global.accuracy = request.global_accuracy;
    global.loss = request.global_loss;
    global.num_clients = participants;
    global.source_clients = source.count;
    global.target_clients = target.count;
    global.timestamp = now;
    global.status = GlobalStatus::Training;
    tx.put_record(GLOBAL_MODEL_KEY, &global)?;

    let metrics = TrainingMetrics {
        metric_id: metrics_key(round),
        round,
        global_accuracy: request.global_accuracy,
        global_loss: request.global_loss,
        source_accuracy: source.mean_accuracy(),
        target_accuracy: target.mean_accuracy(),
        alignment_score: request.alignment_score,
        num_participants: participants,
        timestamp: now,
    };
    tx.put_record(&metrics.metric_id, &metrics)?;

    config.current_round += 1;
    config.last_updated = now;
    tx.put_record(CONFIG_KEY, &config)?;

    info!(
        round,
        version = global.version,
        participants,
        resolved,
        source = source.count,
        target = target.count,
        "round aggregated"
    );
    Ok(AggregationOutcome { global_model: global, metrics, resolved_models: resolved })
}
