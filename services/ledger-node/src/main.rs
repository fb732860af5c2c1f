use anyhow::Result;
use fedledger_core::{
    init_metrics, init_tracing, load_settings, FederatedContract, LedgerBackend, MemoryBackend,
    SledBackend, StorageKind,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

mod metrics;
mod session;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_settings("ledger-node")?;
    init_tracing(&settings.service_name, &settings.log_level)?;
    init_metrics()?;
    info!(?settings, "config loaded");
    if settings.metrics_port != 0 {
        metrics::start_metrics_server(settings.metrics_port).await?;
    }

    let backend: Box<dyn LedgerBackend> = match settings.storage {
        StorageKind::Memory => Box::new(MemoryBackend::default()),
        StorageKind::Sled => Box::new(SledBackend::open(&settings.db_path)?),
    };
    let contract = FederatedContract::new(backend, settings.init.clone());
    if settings.auto_init && !contract.is_initialized()? {
        contract.init()?;
        info!("ledger initialized with default parameters");
    }
    info!(height = contract.ledger().height()?, "service ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(response) = session::handle_line(&contract, &line) {
                    stdout.write_all(response.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
            _ = &mut ctrl_c => {
                warn!("interrupted");
                break;
            }
        }
    }
    info!("shutdown");
    Ok(())
}
