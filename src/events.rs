//! Events the reconciliation scheduler delivers to subscribed handlers.
use bitcoin::{Address, Amount, ScriptBuf, Txid};

/// Event categories a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new block extended the chain.
    NewChainTip,
    /// A transaction touching a tracked destination was observed.
    NewTransaction,
}

/// One output of an observed transaction.
#[derive(Debug, Clone)]
pub struct TxOutput {
    /// Script the output pays to.
    pub script_pubkey: ScriptBuf,
    /// Output value.
    pub value: Amount,
}

/// A newly observed, possibly unconfirmed transaction on some rail.
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    /// Ticker of the chain the transaction was seen on.
    pub crypto_code: String,
    /// Transaction id.
    pub txid: Txid,
    /// Outputs of the transaction. When `tracked_address` is set, these are
    /// only the outputs paying that address; otherwise the full output list.
    pub outputs: Vec<TxOutput>,
    /// Set when the event is scoped to a single tracked destination.
    pub tracked_address: Option<Address>,
}

/// Discrete unit of work delivered by the external event bus.
#[derive(Debug, Clone)]
pub enum ReconciliationEvent {
    /// New chain tip; confirmation counts may have moved.
    NewChainTip,
    /// New relevant transaction.
    NewTransaction(TransactionEvent),
}

impl ReconciliationEvent {
    /// The subscription category this event belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            ReconciliationEvent::NewChainTip => EventKind::NewChainTip,
            ReconciliationEvent::NewTransaction(_) => EventKind::NewTransaction,
        }
    }
}
