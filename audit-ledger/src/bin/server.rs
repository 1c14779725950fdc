//! Audit ledger server binary
//!
//! Opens the ledger, logs chain notifications, and performs the final seal on
//! Ctrl-C. Producers and readers embed the library; this process only owns the
//! chain and its sealing timer.

use anyhow::Context;
use audit_ledger::{Config, Ledger, LedgerNotification};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("AUDIT_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?
            .with_env_overrides()?,
        Err(_) => Config::from_env()?,
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        data_dir = ?config.data_dir,
        max_transactions_per_block = config.sealing.max_transactions_per_block,
        block_interval_ms = config.sealing.block_interval_ms,
        "Starting audit ledger server"
    );

    let ledger = Ledger::open(config).await.context("opening ledger")?;

    let status = ledger.status().await?;
    tracing::info!(
        chain_height = status.chain_height,
        total_transactions = status.total_transactions,
        "Ledger opened successfully"
    );

    let mut notifications = ledger.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(LedgerNotification::BlockSealed(block)) => {
                    tracing::info!(
                        block_number = block.block_number,
                        block_hash = %block.block_hash,
                        event_count = block.transaction_count,
                        "New audit block"
                    );
                }
                Ok(LedgerNotification::TransactionAppended(tx)) => {
                    tracing::debug!(
                        transaction_hash = %tx.transaction_hash,
                        asset_id = %tx.asset_id,
                        "Audit event recorded"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down audit ledger server");
    let final_block = ledger.shutdown().await?;
    if let Some(block) = final_block {
        tracing::info!(block_number = block.block_number, "Final block sealed");
    }

    // The notifier is gone once the ledger is, which closes the listener
    drop(ledger);
    listener.await?;
    Ok(())
}
