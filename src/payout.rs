//! Payout rows, lifecycle states, and rail identifiers.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement rail family a payment method belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RailKind {
    /// UTXO chain settled by broadcasting and confirming transactions.
    OnChain,
    /// Account-based chain where the node owns address/format rules.
    AccountBased,
}

impl RailKind {
    fn as_str(&self) -> &'static str {
        match self {
            RailKind::OnChain => "on-chain",
            RailKind::AccountBased => "account",
        }
    }
}

/// Rail identifier, e.g. `on-chain:BTC` or `account:XMR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentMethodId {
    /// Rail family.
    pub rail: RailKind,
    /// Uppercase ticker of the settled asset.
    pub crypto_code: String,
}

impl PaymentMethodId {
    /// On-chain (UTXO) method for `crypto_code`.
    pub fn on_chain(crypto_code: impl Into<String>) -> Self {
        Self {
            rail: RailKind::OnChain,
            crypto_code: crypto_code.into(),
        }
    }

    /// Account-based method for `crypto_code`.
    pub fn account(crypto_code: impl Into<String>) -> Self {
        Self {
            rail: RailKind::AccountBased,
            crypto_code: crypto_code.into(),
        }
    }
}

impl fmt::Display for PaymentMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rail.as_str(), self.crypto_code)
    }
}

impl FromStr for PaymentMethodId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rail, code) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("payment method id without rail separator: {s}"))?;
        let rail = match rail {
            "on-chain" => RailKind::OnChain,
            "account" => RailKind::AccountBased,
            other => anyhow::bail!("unknown rail {other}"),
        };
        Ok(Self {
            rail,
            crypto_code: code.to_string(),
        })
    }
}

/// Lifecycle state of a payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutState {
    /// Approved, waiting for a matching settlement transaction.
    AwaitingPayment,
    /// At least one candidate transaction is pending confirmation.
    InProgress,
    /// Settled; terminal.
    Completed,
    /// Voided by the approval layer; terminal.
    Cancelled,
}

impl PayoutState {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutState::AwaitingPayment => "awaiting-payment",
            PayoutState::InProgress => "in-progress",
            PayoutState::Completed => "completed",
            PayoutState::Cancelled => "cancelled",
        }
    }

    /// True for states a payout can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutState::Completed | PayoutState::Cancelled)
    }
}

impl FromStr for PayoutState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "awaiting-payment" => PayoutState::AwaitingPayment,
            "in-progress" => PayoutState::InProgress,
            "completed" => PayoutState::Completed,
            "cancelled" => PayoutState::Cancelled,
            other => anyhow::bail!("unknown payout state {other}"),
        })
    }
}

/// An approved withdrawal of custodied funds to an external destination.
///
/// Mutated only by a handler's reconciliation passes; immutable once
/// [`PayoutState::Completed`] (the proof is pruned to the final txid and
/// `destination` is cleared for privacy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    /// Opaque identifier.
    pub id: String,
    /// Owning pull payment (withdrawal request batch).
    pub pull_payment_id: String,
    /// Settlement rail this payout rides on.
    pub payment_method: PaymentMethodId,
    /// Resolved destination string as supplied at approval time.
    /// `None` once completed.
    pub destination: Option<String>,
    /// Exact decimal amount owed, in the rail's native unit.
    pub crypto_amount: Decimal,
    /// Confirmations required before the payout is considered settled.
    pub min_confirmations: u32,
    /// Lifecycle state.
    pub state: PayoutState,
    /// Rail-defined proof-of-payment blob; meaning owned by the handler.
    pub proof: Option<Vec<u8>>,
}

impl Payout {
    /// New payout in `AwaitingPayment`, as the approval workflow creates it.
    pub fn new(
        id: impl Into<String>,
        pull_payment_id: impl Into<String>,
        payment_method: PaymentMethodId,
        destination: impl Into<String>,
        crypto_amount: Decimal,
        min_confirmations: u32,
    ) -> Self {
        Self {
            id: id.into(),
            pull_payment_id: pull_payment_id.into(),
            payment_method,
            destination: Some(destination.into()),
            crypto_amount,
            min_confirmations,
            state: PayoutState::AwaitingPayment,
            proof: None,
        }
    }
}

/// Pull-payment context a claim destination is validated against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullPaymentTerms {
    /// Amount the claimant asked to withdraw.
    pub claimed_amount: Decimal,
    /// Smallest claim the rail/store accepts, if any.
    pub min_claim: Option<Decimal>,
    /// Remaining pull-payment budget, if capped.
    pub max_claim: Option<Decimal>,
}
