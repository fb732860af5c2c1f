//! Core of the federated-learning coordination ledger.
//!
//! The round-based state machine (client registry, local model submissions,
//! aggregation, global model versioning, metrics and audit history) runs as
//! deterministic transitions over a key-value ledger. Shared bootstrap
//! (tracing, settings) for the services lives here too.

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the fmt subscriber once per process. Logs go to stderr so stdout
/// stays free for protocol output. `FEDLEDGER_JSON_LOG=1` switches to JSON lines.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))?;
        let json = std::env::var("FEDLEDGER_JSON_LOG")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "fedledger", service = %service, "tracing initialized");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service_name: String,
    pub log_level: String,
    pub storage: StorageKind,
    pub db_path: String,
    /// Run `Init` on startup when the ledger has no aggregation config yet.
    pub auto_init: bool,
    /// Port of the Prometheus `/metrics` endpoint; `0` disables it.
    pub metrics_port: u16,
    #[serde(default)]
    pub init: InitParams,
}

/// Defaults, then the file named by `FEDLEDGER_CONFIG_FILE`, then
/// `FEDLEDGER_*` environment variables (`__` separates nested keys, e.g.
/// `FEDLEDGER_INIT__MIN_CLIENTS`).
pub fn load_settings(service: &str) -> Result<Settings> {
    let file = std::env::var("FEDLEDGER_CONFIG_FILE").ok();
    build_settings(service, file.as_deref())
}

fn build_settings(service: &str, file: Option<&str>) -> Result<Settings> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?
        .set_default("storage", "sled")?
        .set_default("db_path", "./data/fedledger")?
        .set_default("auto_init", true)?
        .set_default("metrics_port", 9464)?;
    if let Some(file) = file {
        builder = builder.add_source(config::File::with_name(file).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("FEDLEDGER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    let settings: Settings = builder.build()?.try_deserialize()?;
    Ok(settings)
}

pub mod error;
pub mod ledger;
pub mod records;
pub mod index;
pub mod contract;
pub mod dispatch;
pub mod telemetry;

pub use error::{ContractError, ContractResult, LedgerError};
pub use ledger::{
    CommitBatch, KeyModification, Ledger, LedgerBackend, MemoryBackend, SledBackend, TxContext,
};
pub use records::{
    AggregationConfig, Client, Domain, GlobalModel, GlobalStatus, LocalModel, ModelStatus,
    TrainingMetrics,
};
pub use index::KeyIndex;
pub use contract::{
    AggregationOutcome, AggregationRequest, ConfigUpdate, FederatedContract, HistoryEntry,
    InitParams, KeyHistory, LocalModelSubmission, RoundStatus,
};
pub use dispatch::Invocation;
pub use telemetry::{init_metrics, render_metrics, LedgerMetrics, LEDGER_METRICS};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let s = build_settings("ledger-node", None).unwrap();
        assert_eq!(s.service_name, "ledger-node");
        assert_eq!(s.storage, StorageKind::Sled);
        assert!(s.auto_init);
        assert_eq!(s.metrics_port, 9464);
        assert_eq!(s.init, InitParams::default());
    }

    #[test]
    fn settings_from_yaml_file() {
        let path = std::env::temp_dir().join(format!("fedledger-settings-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "storage: memory\nauto_init: false\ninit:\n  min_clients: 5\n  max_rounds: 10\n").unwrap();
        let s = build_settings("ledger-node", path.to_str()).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(s.storage, StorageKind::Memory);
        assert!(!s.auto_init);
        assert_eq!(s.init.min_clients, 5);
        assert_eq!(s.init.max_rounds, 10);
        assert_eq!(s.init.source_weight, 0.6);
    }
}
