//! vaultlink monitor - follows persisted pending transactions until they settle
//!
//! Resumes confirmation tracking for every configured account on every
//! enabled chain and logs each transaction as it reaches a terminal status.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use vaultlink::chain::{ConfirmationWatcher, RpcChainReader};
use vaultlink::config::{ChainFamily, Settings};
use vaultlink::state::open_store;
use vaultlink::wallet::Account;
use vaultlink::{events, metrics, telemetry, ClientEvent, PendingTransactionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_logging();

    info!("Starting vaultlink monitor v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    let store = open_store(&settings.storage).await?;
    let events = events::channel();
    let registry = Arc::new(PendingTransactionRegistry::new(store, events.clone()));

    let mut watched = Vec::new();
    for (name, chain) in settings.enabled_chains() {
        if chain.family != ChainFamily::Evm {
            warn!("Chain {} has no confirmation reader; skipping", name);
            continue;
        }
        let reader = match RpcChainReader::new(chain) {
            Ok(reader) => Arc::new(reader),
            Err(e) => {
                error!("Failed to initialize chain {}: {}", name, e);
                continue;
            }
        };
        if reader.health_check().await {
            info!("Chain {} reachable at block {}", name, reader.last_block());
        } else {
            warn!("Chain {} failed its initial health check", name);
        }

        registry.register_chain(
            ConfirmationWatcher::new(chain.id(), chain.confirmation_depth(), reader).with_limits(
                settings.registry.poll_interval(),
                settings.registry.timeout_blocks,
                settings.registry.max_wait(),
            ),
        );
        watched.push(chain.id());
    }

    // Log lifecycle events until shutdown
    let log_handle = tokio::spawn({
        let mut rx = events.subscribe();
        async move {
            loop {
                match rx.recv().await {
                    Ok(ClientEvent::TransactionSettled {
                        hash,
                        status,
                        chain,
                    }) => info!("Transaction {} on chain {} settled: {}", hash, chain, status.name()),
                    Ok(event) => info!("Event: {}", event.name()),
                    Err(RecvError::Lagged(missed)) => warn!("Event log lagged by {} events", missed),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    let mut restored = 0;
    for address in &settings.monitor.accounts {
        let account = Account::new(address.as_str());
        for chain in &watched {
            match registry.restore(&account, *chain).await {
                Ok(count) => restored += count,
                Err(e) => error!("Failed to restore {} on chain {}: {}", account, chain, e),
            }
        }
    }

    info!(
        "vaultlink monitor is running ({} transactions restored, {} watches active)",
        restored,
        registry.active_watchers()
    );

    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    registry.shutdown();
    log_handle.abort();

    if settings.metrics.enabled {
        info!("Final metrics:\n{}", metrics::render());
    }

    info!("vaultlink monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
