//! Wallet glue: track claim destinations and annotate matched transactions.
use async_trait::async_trait;
use bitcoin::{Address, Txid};

/// Callbacks into the wallet layer.
#[async_trait]
pub trait WalletHooks: Send + Sync {
    /// Start watching `address` for incoming matches. Idempotent; calling it
    /// for an already-watched address is a no-op.
    async fn track(&self, address: &Address) -> anyhow::Result<()>;

    /// A payout was matched to `txid`; annotate the wallet transaction for
    /// audit purposes. Failures here never abort reconciliation.
    async fn on_payout_matched(&self, payout_id: &str, txid: Txid) -> anyhow::Result<()>;
}
