//! Contract-API style invocation: a function name plus positional string
//! arguments, answered with a JSON value.
//!
//! `{"function":"RegisterClient","Args":["c1","source","10000"]}`

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::{
    ensure_finite, AggregationRequest, ConfigUpdate, FederatedContract, LocalModelSubmission,
};
use crate::error::{ContractError, ContractResult, LedgerError};
use crate::ledger::LedgerBackend;
use crate::records::Domain;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub function: String,
    #[serde(rename = "Args", alias = "args", default)]
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { function: function.into(), args: args.into_iter().map(Into::into).collect() }
    }
}

struct Args<'a> {
    function: &'a str,
    values: &'a [String],
}

impl<'a> Args<'a> {
    fn arity(&self, count: usize) -> ContractResult<()> {
        if self.values.len() != count {
            return Err(ContractError::InvalidArgument(format!(
                "{} expects {} argument(s), got {}",
                self.function,
                count,
                self.values.len()
            )));
        }
        Ok(())
    }

    fn str(&self, i: usize) -> &'a str { &self.values[i] }

    fn parse<T>(&self, i: usize, name: &str) -> ContractResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.values[i]
            .trim()
            .parse()
            .map_err(|e| ContractError::InvalidArgument(format!("{name}: {e}")))
    }

    /// `f64::from_str` accepts "NaN" and "inf"; those are rejected here.
    fn float(&self, i: usize, name: &str) -> ContractResult<f64> {
        let value: f64 = self.parse(i, name)?;
        ensure_finite(&[(name, value)])?;
        Ok(value)
    }
}

fn to_json<T: Serialize>(value: T) -> ContractResult<Value> {
    serde_json::to_value(value).map_err(|e| LedgerError::from(e).into())
}

impl<B: LedgerBackend> FederatedContract<B> {
    pub fn invoke(&self, invocation: &Invocation) -> ContractResult<Value> {
        let args = Args { function: &invocation.function, values: &invocation.args };
        match invocation.function.as_str() {
            "Init" | "InitLedger" => {
                args.arity(0)?;
                self.init()?;
                Ok(Value::Null)
            }
            "RegisterClient" => {
                args.arity(3)?;
                let dataset_size: u64 = args.parse(2, "datasetSize")?;
                to_json(self.register_client(args.str(0), Domain::from(args.str(1)), dataset_size)?)
            }
            "ClientExists" => {
                args.arity(1)?;
                to_json(self.client_exists(args.str(0))?)
            }
            "GetClient" => {
                args.arity(1)?;
                to_json(self.get_client(args.str(0))?)
            }
            "GetAllClients" => {
                args.arity(0)?;
                to_json(self.get_all_clients()?)
            }
            "SetClientActive" => {
                args.arity(2)?;
                let is_active: bool = args.parse(1, "isActive")?;
                to_json(self.set_client_active(args.str(0), is_active)?)
            }
            "SubmitLocalModel" => {
                args.arity(9)?;
                let upload = LocalModelSubmission {
                    model_id: args.str(0).to_string(),
                    client_id: args.str(1).to_string(),
                    weights: args.str(2).to_string(),
                    latent_features: args.str(3).to_string(),
                    prototypes: args.str(4).to_string(),
                    accuracy: args.float(5, "accuracy")?,
                    loss: args.float(6, "loss")?,
                    alignment_loss: args.float(7, "alignmentLoss")?,
                    data_size: args.parse(8, "dataSize")?,
                };
                to_json(self.submit_local_model(upload)?)
            }
            "GetLocalModel" => {
                args.arity(1)?;
                to_json(self.get_local_model(args.str(0))?)
            }
            "GetLocalModelsByRound" => {
                args.arity(1)?;
                to_json(self.get_local_models_by_round(args.parse(0, "round")?)?)
            }
            "AggregateModels" => {
                args.arity(6)?;
                let model_ids: Vec<String> = serde_json::from_str(args.str(0))
                    .map_err(|e| ContractError::InvalidArgument(format!("modelIDs: {e}")))?;
                let request = AggregationRequest {
                    model_ids,
                    aggregated_weights: args.str(1).to_string(),
                    aggregated_prototypes: args.str(2).to_string(),
                    global_accuracy: args.float(3, "globalAccuracy")?,
                    global_loss: args.float(4, "globalLoss")?,
                    alignment_score: args.float(5, "alignmentScore")?,
                };
                to_json(self.aggregate_models(request)?)
            }
            "GetGlobalModel" => {
                args.arity(0)?;
                to_json(self.get_global_model()?)
            }
            "GetAggregationConfig" => {
                args.arity(0)?;
                to_json(self.get_aggregation_config()?)
            }
            "UpdateAggregationConfig" => {
                args.arity(4)?;
                let update = ConfigUpdate {
                    min_clients: args.parse(0, "minClients")?,
                    source_weight: args.float(1, "sourceWeight")?,
                    target_weight: args.float(2, "targetWeight")?,
                    alignment_weight: args.float(3, "alignmentWeight")?,
                };
                to_json(self.update_aggregation_config(update)?)
            }
            "GetTrainingMetrics" => {
                args.arity(1)?;
                to_json(self.get_training_metrics(args.parse(0, "round")?)?)
            }
            "GetAllTrainingMetrics" => {
                args.arity(0)?;
                to_json(self.get_all_training_metrics()?)
            }
            "GetModelHistory" => {
                args.arity(1)?;
                let entries = self
                    .get_model_history(args.str(0))?
                    .collect::<ContractResult<Vec<_>>>()?;
                to_json(entries)
            }
            "GetRoundStatus" => {
                args.arity(0)?;
                to_json(self.get_round_status()?)
            }
            other => Err(ContractError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::InitParams;
    use crate::ledger::MemoryBackend;

    fn contract() -> FederatedContract<MemoryBackend> {
        let c = FederatedContract::new(MemoryBackend::default(), InitParams::default());
        c.invoke(&Invocation::new("InitLedger", Vec::<String>::new())).unwrap();
        c
    }

    #[test]
    fn invocation_accepts_contract_api_shape() {
        let inv: Invocation = serde_json::from_str(r#"{"function":"GetClient","Args":["c1"]}"#).unwrap();
        assert_eq!(inv, Invocation::new("GetClient", ["c1"]));
        let no_args: Invocation = serde_json::from_str(r#"{"function":"GetGlobalModel"}"#).unwrap();
        assert!(no_args.args.is_empty());
    }

    #[test]
    fn register_and_query_through_string_args() {
        let c = contract();
        let client = c.invoke(&Invocation::new("RegisterClient", ["c1", "source", "10000"])).unwrap();
        assert_eq!(client["clientID"], "c1");
        assert_eq!(client["datasetSize"], 10000);
        assert_eq!(c.invoke(&Invocation::new("ClientExists", ["c1"])).unwrap(), Value::Bool(true));
        let all = c.invoke(&Invocation::new("GetAllClients", Vec::<String>::new())).unwrap();
        assert_eq!(all.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn aggregate_takes_json_array_of_ids() {
        let c = contract();
        c.invoke(&Invocation::new("RegisterClient", ["c1", "source", "10"])).unwrap();
        c.invoke(&Invocation::new("SubmitLocalModel", ["m1", "c1", "{}", "{}", "{}", "0.85", "0.3", "0.1", "10"])).unwrap();
        let out = c
            .invoke(&Invocation::new("AggregateModels", [r#"["m1","ghost"]"#, "{\"w\":1}", "{}", "0.82", "0.4", "0.9"]))
            .unwrap();
        assert_eq!(out["globalModel"]["version"], 1);
        assert_eq!(out["globalModel"]["numClients"], 2);
        assert_eq!(out["globalModel"]["sourceClients"], 1);
        assert_eq!(out["metrics"]["numParticipants"], 2);
        let history = c.invoke(&Invocation::new("GetModelHistory", ["m1"])).unwrap();
        assert_eq!(history[1]["value"]["status"], "aggregated");
    }

    #[test]
    fn non_finite_submission_is_rejected_before_any_write() {
        let c = contract();
        c.invoke(&Invocation::new("RegisterClient", ["c1", "source", "10"])).unwrap();
        let height = c.ledger().height().unwrap();
        for bad in ["NaN", "inf", "-infinity"] {
            let args = ["m1", "c1", "{}", "{}", "{}", bad, "0.3", "0.1", "10"];
            let err = c.invoke(&Invocation::new("SubmitLocalModel", args)).unwrap_err();
            assert_eq!(err.kind(), "InvalidArgument");
        }
        assert_eq!(c.ledger().height().unwrap(), height);
        let client = c.invoke(&Invocation::new("GetClient", ["c1"])).unwrap();
        assert_eq!(client["modelAccuracy"], 0.0);

        let ids = r#"["m1"]"#;
        let agg = Invocation::new("AggregateModels", [ids, "{}", "{}", "0.8", "NaN", "0.9"]);
        assert_eq!(c.invoke(&agg).unwrap_err().kind(), "InvalidArgument");
        assert_eq!(c.ledger().height().unwrap(), height);
    }

    #[test]
    fn argument_errors() {
        let c = contract();
        let arity = c.invoke(&Invocation::new("GetClient", Vec::<String>::new())).unwrap_err();
        assert_eq!(arity.kind(), "InvalidArgument");
        let negative = c.invoke(&Invocation::new("RegisterClient", ["c1", "source", "-5"])).unwrap_err();
        assert_eq!(negative.kind(), "InvalidArgument");
        let ids = c.invoke(&Invocation::new("AggregateModels", ["m1", "{}", "{}", "0", "0", "0"])).unwrap_err();
        assert_eq!(ids.kind(), "InvalidArgument");
        let nan = Invocation::new("UpdateAggregationConfig", ["3", "NaN", "0.4", "0.1"]);
        assert_eq!(c.invoke(&nan).unwrap_err().kind(), "InvalidArgument");
        let unknown = c.invoke(&Invocation::new("DropTables", Vec::<String>::new())).unwrap_err();
        assert!(matches!(unknown, ContractError::UnknownFunction(f) if f == "DropTables"));
    }
}
