//! Abstract chain query/broadcast contract consumed by the on-chain handler.
//!
//! This is the whole surface the engine needs from a node or indexer; no
//! consensus or RPC client lives in this crate.
use async_trait::async_trait;
use bitcoin::{Transaction, Txid};

/// A transaction as the chain collaborator currently sees it.
#[derive(Debug, Clone)]
pub struct ChainTransaction {
    /// Transaction id.
    pub txid: Txid,
    /// Confirmation count; `0` while unconfirmed.
    pub confirmations: u32,
    /// Raw transaction, kept so the engine can rebroadcast it verbatim.
    pub raw: Transaction,
}

/// Why a broadcast was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Structurally invalid transaction.
    Invalid,
    /// Conflicts with another transaction (spent inputs, replacement).
    Conflicting,
}

/// Outcome of a (re)broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Accepted into the mempool (or already there).
    Accepted,
    /// Refused; the candidate cannot settle the payout.
    Rejected(RejectReason),
}

/// Query/broadcast contract of the external chain collaborator.
///
/// `Err` means the collaborator itself failed (node down, transport error)
/// and the caller should retry on a later event; "transaction unknown" is
/// `Ok(None)`, not an error.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Look a transaction up by id. `Ok(None)` when the chain does not know
    /// it (dropped, replaced, or never seen).
    async fn get_transaction(&self, txid: Txid) -> anyhow::Result<Option<ChainTransaction>>;

    /// Attempt to (re)broadcast `tx`.
    async fn broadcast(&self, tx: &Transaction) -> anyhow::Result<BroadcastOutcome>;
}
