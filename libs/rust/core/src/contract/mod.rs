//! Federated-learning coordination contract.
//!
//! Every operation is a single transition against the shared ledger:
//! mutations go through `Ledger::submit` (serialized, atomic), queries through
//! `Ledger::evaluate`. The component modules hold the transition bodies and
//! compose freely inside one `TxContext`.
//!
//! Control flow: registry and config gate submissions, submissions feed the
//! per-round index, and aggregation is the only writer of the global model,
//! the training metrics and the round counter.

pub mod aggregation;
pub mod history;
pub mod registry;
pub mod state;
pub mod submission;

pub use aggregation::{AggregationOutcome, AggregationRequest};
pub use history::{HistoryEntry, KeyHistory};
pub use state::{ConfigUpdate, InitParams, RoundStatus};
pub use submission::LocalModelSubmission;

use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::error::{ContractError, ContractResult};
use crate::ledger::{Ledger, LedgerBackend, TxContext};
use crate::records::{
    AggregationConfig, Client, Domain, GlobalModel, LocalModel, TrainingMetrics, CONFIG_KEY,
};
use crate::telemetry::{self, LEDGER_METRICS};

pub struct FederatedContract<B> {
    ledger: Ledger<B>,
    init_params: InitParams,
}

impl<B: LedgerBackend> FederatedContract<B> {
    pub fn new(backend: B, init_params: InitParams) -> Self {
        Self { ledger: Ledger::new(backend), init_params }
    }

    pub fn ledger(&self) -> &Ledger<B> { &self.ledger }

    pub fn init_params(&self) -> &InitParams { &self.init_params }

    fn submit<T, F>(&self, function: &'static str, f: F) -> ContractResult<T>
    where
        F: FnOnce(&mut TxContext<'_>) -> ContractResult<T>,
    {
        let started = Instant::now();
        let result = self.ledger.submit(f);
        if let Err(e) = &result {
            warn!(function, kind = e.kind(), error = %e, "transition rejected");
        }
        telemetry::record_transaction(function, outcome(&result), started.elapsed());
        result
    }

    fn evaluate<T, F>(&self, function: &'static str, f: F) -> ContractResult<T>
    where
        F: FnOnce(&TxContext<'_>) -> ContractResult<T>,
    {
        let started = Instant::now();
        let result = self.ledger.evaluate(f);
        if let Err(e) = &result {
            debug!(function, kind = e.kind(), error = %e, "query failed");
        }
        telemetry::record_transaction(function, outcome(&result), started.elapsed());
        result
    }

    #[instrument(skip(self))]
    pub fn init(&self) -> ContractResult<()> {
        self.submit("Init", |tx| state::init_ledger(tx, &self.init_params))
    }

    pub fn is_initialized(&self) -> ContractResult<bool> {
        self.ledger.evaluate(|tx| Ok(tx.get_state(CONFIG_KEY)?.is_some()))
    }

    #[instrument(skip(self, domain))]
    pub fn register_client(
        &self,
        client_id: &str,
        domain: impl Into<Domain>,
        dataset_size: u64,
    ) -> ContractResult<Client> {
        let domain = domain.into();
        self.submit("RegisterClient", |tx| {
            registry::register_client(tx, client_id, domain, dataset_size)
        })
    }

    pub fn client_exists(&self, client_id: &str) -> ContractResult<bool> {
        self.evaluate("ClientExists", |tx| registry::client_exists(tx, client_id))
    }

    pub fn get_client(&self, client_id: &str) -> ContractResult<Client> {
        self.evaluate("GetClient", |tx| registry::get_client(tx, client_id))
    }

    pub fn get_all_clients(&self) -> ContractResult<Vec<Client>> {
        self.evaluate("GetAllClients", registry::all_clients)
    }

    #[instrument(skip(self))]
    pub fn set_client_active(&self, client_id: &str, is_active: bool) -> ContractResult<Client> {
        self.submit("SetClientActive", |tx| registry::set_client_active(tx, client_id, is_active))
    }

    #[instrument(
        skip(self, upload),
        fields(model_id = %upload.model_id, client_id = %upload.client_id)
    )]
    pub fn submit_local_model(&self, upload: LocalModelSubmission) -> ContractResult<LocalModel> {
        let model = self.submit("SubmitLocalModel", |tx| {
            submission::submit_local_model(tx, upload)
        })?;
        LEDGER_METRICS.submissions_total.add(1, &[]);
        Ok(model)
    }

    pub fn get_local_model(&self, model_id: &str) -> ContractResult<LocalModel> {
        self.evaluate("GetLocalModel", |tx| submission::get_local_model(tx, model_id))
    }

    pub fn get_local_models_by_round(&self, round: u64) -> ContractResult<Vec<LocalModel>> {
        self.evaluate("GetLocalModelsByRound", |tx| submission::local_models_by_round(tx, round))
    }

    #[instrument(skip(self, request), fields(models = request.model_ids.len()))]
    pub fn aggregate_models(
        &self,
        request: AggregationRequest,
    ) -> ContractResult<AggregationOutcome> {
        let outcome = self.submit("AggregateModels", |tx| {
            aggregation::aggregate_models(tx, request)
        })?;
        LEDGER_METRICS.rounds_completed_total.add(1, &[]);
        LEDGER_METRICS.participants_total.add(outcome.metrics.num_participants, &[]);
        LEDGER_METRICS
            .unresolved_models_total
            .add(outcome.metrics.num_participants - outcome.resolved_models, &[]);
        Ok(outcome)
    }

    pub fn get_global_model(&self) -> ContractResult<GlobalModel> {
        self.evaluate("GetGlobalModel", state::global_model)
    }

    pub fn get_aggregation_config(&self) -> ContractResult<AggregationConfig> {
        self.evaluate("GetAggregationConfig", state::aggregation_config)
    }

    #[instrument(skip(self))]
    pub fn update_aggregation_config(
        &self,
        update: ConfigUpdate,
    ) -> ContractResult<AggregationConfig> {
        self.submit("UpdateAggregationConfig", |tx| state::update_aggregation_config(tx, update))
    }

    pub fn get_training_metrics(&self, round: u64) -> ContractResult<TrainingMetrics> {
        self.evaluate("GetTrainingMetrics", |tx| state::training_metrics(tx, round))
    }

    pub fn get_all_training_metrics(&self) -> ContractResult<Vec<TrainingMetrics>> {
        self.evaluate("GetAllTrainingMetrics", state::all_training_metrics)
    }

    pub fn get_model_history(&self, key: &str) -> ContractResult<KeyHistory> {
        self.evaluate("GetModelHistory", |tx| history::key_history(tx, key))
    }

    pub fn get_round_status(&self) -> ContractResult<RoundStatus> {
        self.evaluate("GetRoundStatus", state::round_status)
    }
}

/// NaN and infinities have no JSON encoding and would be stored as `null`,
/// leaving a record that can never be decoded again.
pub(crate) fn ensure_finite(fields: &[(&str, f64)]) -> ContractResult<()> {
    match fields.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, value)) => {
            Err(ContractError::InvalidArgument(format!("{name} must be finite, got {value}")))
        }
        None => Ok(()),
    }
}

fn outcome<T>(result: &ContractResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(_) => "error",
    }
}
