//! Singleton records (global model, aggregation config) and per-round
//! training metrics.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{registry, submission};
use crate::error::{ContractError, ContractResult};
use crate::ledger::TxContext;
use crate::records::{
    metrics_key, AggregationConfig, GlobalModel, GlobalStatus, TrainingMetrics, CONFIG_KEY,
    GLOBAL_MODEL_ID, GLOBAL_MODEL_KEY,
};

const EMPTY_BLOB: &str = "{}";

/// Values written by `Init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitParams {
    pub min_clients: u32,
    pub max_rounds: u64,
    pub source_weight: f64,
    pub target_weight: f64,
    pub alignment_weight: f64,
    pub convergence_threshold: f64,
    pub latent_dim: u32,
    pub num_latents: u32,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            min_clients: 3,
            max_rounds: 100,
            source_weight: 0.6,
            target_weight: 0.4,
            alignment_weight: 0.1,
            convergence_threshold: 0.001,
            latent_dim: 768,
            num_latents: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub min_clients: u32,
    pub source_weight: f64,
    pub target_weight: f64,
    pub alignment_weight: f64,
}

/// Advisory snapshot for orchestrators; nothing here is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStatus {
    pub current_round: u64,
    pub pending_submissions: u64,
    pub min_clients: u32,
    pub quorum_reached: bool,
    pub max_rounds: u64,
    pub rounds_exhausted: bool,
}

/// Writes version-0 global model, round-0 config and an empty client index.
/// Overwrites whatever was there before.
pub fn init_ledger(tx: &mut TxContext<'_>, params: &InitParams) -> ContractResult<()> {
    super::ensure_finite(&[
        ("sourceWeight", params.source_weight),
        ("targetWeight", params.target_weight),
        ("alignmentWeight", params.alignment_weight),
        ("convergenceThreshold", params.convergence_threshold),
    ])?;
    if tx.get_state(CONFIG_KEY)?.is_some() || tx.get_state(GLOBAL_MODEL_KEY)?.is_some() {
        warn!("ledger already initialized; resetting singletons and client index");
    }
    let now = tx.timestamp();
    let global = GlobalModel {
        model_id: GLOBAL_MODEL_ID.to_string(),
        version: 0,
        round: 0,
        weights: EMPTY_BLOB.to_string(),
        global_prototypes: EMPTY_BLOB.to_string(),
        latent_dim: params.latent_dim,
        num_latents: params.num_latents,
        accuracy: 0.0,
        loss: 0.0,
        num_clients: 0,
        source_clients: 0,
        target_clients: 0,
        timestamp: now,
        status: GlobalStatus::Initialized,
    };
    tx.put_record(GLOBAL_MODEL_KEY, &global)?;

    let config = AggregationConfig {
        config_id: CONFIG_KEY.to_string(),
        min_clients: params.min_clients,
        max_rounds: params.max_rounds,
        source_weight: params.source_weight,
        target_weight: params.target_weight,
        alignment_weight: params.alignment_weight,
        convergence_threshold: params.convergence_threshold,
        current_round: 0,
        last_updated: now,
    };
    tx.put_record(CONFIG_KEY, &config)?;
    registry::client_index().reset(tx)?;
    info!(min_clients = params.min_clients, max_rounds = params.max_rounds, "ledger initialized");
    Ok(())
}

pub fn global_model(tx: &TxContext<'_>) -> ContractResult<GlobalModel> {
    tx.get_record(GLOBAL_MODEL_KEY)?
        .ok_or(ContractError::NotInitialized("global model"))
}

pub fn aggregation_config(tx: &TxContext<'_>) -> ContractResult<AggregationConfig> {
    tx.get_record(CONFIG_KEY)?
        .ok_or(ContractError::NotInitialized("aggregation config"))
}

/// Leaves `currentRound`, `maxRounds` and `convergenceThreshold` untouched.
pub fn update_aggregation_config(
    tx: &mut TxContext<'_>,
    update: ConfigUpdate,
) -> ContractResult<AggregationConfig> {
    super::ensure_finite(&[
        ("sourceWeight", update.source_weight),
        ("targetWeight", update.target_weight),
        ("alignmentWeight", update.alignment_weight),
    ])?;
    let mut config = aggregation_config(tx)?;
    config.min_clients = update.min_clients;
    config.source_weight = update.source_weight;
    config.target_weight = update.target_weight;
    config.alignment_weight = update.alignment_weight;
    config.last_updated = tx.timestamp();
    tx.put_record(CONFIG_KEY, &config)?;
    info!(?update, "aggregation config updated");
    Ok(config)
}

pub fn training_metrics(tx: &TxContext<'_>, round: u64) -> ContractResult<TrainingMetrics> {
    tx.get_record(&metrics_key(round))?
        .ok_or_else(|| ContractError::not_found("training metrics for round", round.to_string()))
}

/// Metrics for rounds `[0, currentRound)`; missing or undecodable rounds are skipped.
pub fn all_training_metrics(tx: &TxContext<'_>) -> ContractResult<Vec<TrainingMetrics>> {
    let config = aggregation_config(tx)?;
    Ok((0..config.current_round)
        .filter_map(|round| training_metrics(tx, round).ok())
        .collect())
}

pub fn round_status(tx: &TxContext<'_>) -> ContractResult<RoundStatus> {
    let config = aggregation_config(tx)?;
    let pending = submission::local_models_by_round(tx, config.current_round)?.len() as u64;
    Ok(RoundStatus {
        current_round: config.current_round,
        pending_submissions: pending,
        min_clients: config.min_clients,
        quorum_reached: pending >= u64::from(config.min_clients),
        max_rounds: config.max_rounds,
        rounds_exhausted: config.current_round >= config.max_rounds,
    })
}
