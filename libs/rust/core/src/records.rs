//! Ledger record shapes and the key layout they are stored under.
//!
//! Field names on the wire keep the contract's historical JSON spelling
//! (`clientID`, `modelID`, ...), everything else is camelCase.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CLIENT_INDEX_KEY: &str = "client-list";
pub const GLOBAL_MODEL_KEY: &str = "global-model";
pub const CONFIG_KEY: &str = "aggregation-config";
pub const GLOBAL_MODEL_ID: &str = "global";

pub const CLIENT_DOC_TYPE: &str = "client";
pub const LOCAL_MODEL_DOC_TYPE: &str = "localModel";

pub fn round_models_key(round: u64) -> String { format!("round-{round}-models") }

pub fn metrics_key(round: u64) -> String { format!("metrics-round-{round}") }

/// Participant population. Labels other than `source`/`target` are kept
/// verbatim and fall into neither aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    Source,
    Target,
    Other(String),
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Source => "source",
            Domain::Target => "target",
            Domain::Other(label) => label,
        }
    }
}

impl From<String> for Domain {
    fn from(label: String) -> Self {
        match label.as_str() {
            "source" => Domain::Source,
            "target" => Domain::Target,
            _ => Domain::Other(label),
        }
    }
}

impl From<&str> for Domain {
    fn from(label: &str) -> Self { Domain::from(label.to_string()) }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        match d {
            Domain::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for Domain {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Domain::from(s)) }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Submitted,
    Aggregated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalStatus {
    Initialized,
    Training,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub domain: Domain,
    pub is_active: bool,
    pub last_update: DateTime<Utc>,
    pub dataset_size: u64,
    pub model_accuracy: f64,
    pub doc_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalModel {
    #[serde(rename = "modelID")]
    pub model_id: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub round: u64,
    pub domain: Domain,
    pub weights: String,
    pub latent_features: String,
    pub prototypes: String,
    pub accuracy: f64,
    pub loss: f64,
    pub alignment_loss: f64,
    pub data_size: u64,
    pub timestamp: DateTime<Utc>,
    pub status: ModelStatus,
    pub doc_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalModel {
    #[serde(rename = "modelID")]
    pub model_id: String,
    pub version: u64,
    pub round: u64,
    pub weights: String,
    pub global_prototypes: String,
    pub latent_dim: u32,
    pub num_latents: u32,
    pub accuracy: f64,
    pub loss: f64,
    pub num_clients: u64,
    pub source_clients: u64,
    pub target_clients: u64,
    pub timestamp: DateTime<Utc>,
    pub status: GlobalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    #[serde(rename = "configID")]
    pub config_id: String,
    pub min_clients: u32,
    pub max_rounds: u64,
    pub source_weight: f64,
    pub target_weight: f64,
    pub alignment_weight: f64,
    pub convergence_threshold: f64,
    pub current_round: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    #[serde(rename = "metricID")]
    pub metric_id: String,
    pub round: u64,
    pub global_accuracy: f64,
    pub global_loss: f64,
    pub source_accuracy: f64,
    pub target_accuracy: f64,
    pub alignment_score: f64,
    pub num_participants: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_keeps_unknown_labels() {
        assert_eq!(Domain::from("source"), Domain::Source);
        assert_eq!(Domain::from("edge"), Domain::Other("edge".into()));
        let json = serde_json::to_string(&Domain::Other("edge".into())).unwrap();
        assert_eq!(json, "\"edge\"");
        let back: Domain = serde_json::from_str("\"target\"").unwrap();
        assert_eq!(back, Domain::Target);
    }

    #[test]
    fn client_uses_contract_field_names() {
        let c = Client {
            client_id: "c1".into(),
            domain: Domain::Source,
            is_active: true,
            last_update: Utc::now(),
            dataset_size: 10,
            model_accuracy: 0.0,
            doc_type: CLIENT_DOC_TYPE.into(),
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["clientID"], "c1");
        assert_eq!(v["isActive"], true);
        assert_eq!(v["datasetSize"], 10);
        assert_eq!(v["docType"], "client");
    }

    #[test]
    fn key_layout() {
        assert_eq!(round_models_key(3), "round-3-models");
        assert_eq!(metrics_key(0), "metrics-round-0");
    }
}
