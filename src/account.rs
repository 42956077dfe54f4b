//! Account-based rail handler, the contrast case to [`crate::onchain`].
//!
//! Address-format rules live in the node, so destination parsing and
//! validation delegate to it over RPC, and there is no local confirmation
//! state machine: the proof stays an opaque tagged blob this engine never
//! interprets beyond its rail/version tag.
use crate::destination::{ClaimDestination, ClaimError};
use crate::events::{EventKind, ReconciliationEvent};
use crate::handler::PayoutHandler;
use crate::payout::{PaymentMethodId, Payout, PullPaymentTerms, RailKind};
use crate::proof::PayoutProof;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Destination fields the node extracted from a payment URI.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUri {
    /// Address embedded in the URI.
    pub address: String,
    /// Amount embedded in the URI, in the rail's native unit.
    pub amount: Option<Decimal>,
}

/// Wallet-node RPC surface the account rail needs.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Whether the node can be reached at all right now.
    fn is_available(&self) -> bool;

    /// Ask the node to parse a payment URI.
    async fn parse_uri(&self, uri: &str) -> anyhow::Result<ParsedUri>;

    /// Ask the node whether `address` is well-formed for this rail.
    async fn validate_address(&self, address: &str) -> anyhow::Result<bool>;
}

/// Handler for an account-based rail (e.g. `account:XMR`).
pub struct AccountPayoutHandler<R> {
    crypto_code: String,
    uri_scheme: String,
    rpc: R,
}

impl<R: NodeRpc + 'static> AccountPayoutHandler<R> {
    /// Create a handler for `crypto_code` with its URI scheme and node.
    pub fn new(crypto_code: impl Into<String>, uri_scheme: impl Into<String>, rpc: R) -> Self {
        Self {
            crypto_code: crypto_code.into(),
            uri_scheme: uri_scheme.into(),
            rpc,
        }
    }

    /// The payment method this handler owns.
    pub fn payment_method(&self) -> PaymentMethodId {
        PaymentMethodId::account(self.crypto_code.clone())
    }
}

#[async_trait]
impl<R: NodeRpc + 'static> PayoutHandler for AccountPayoutHandler<R> {
    fn can_handle(&self, payment_method: &PaymentMethodId) -> bool {
        payment_method.rail == RailKind::AccountBased
            && payment_method.crypto_code == self.crypto_code
    }

    async fn parse_claim_destination(
        &self,
        payment_method: &PaymentMethodId,
        raw: &str,
    ) -> Option<ClaimDestination> {
        if !self.can_handle(payment_method) || !self.rpc.is_available() {
            return None;
        }
        let raw = raw.trim();
        let prefix = format!("{}:", self.uri_scheme);
        let is_uri = raw
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&prefix));
        if is_uri && raw.len() > prefix.len() {
            let parsed = self.rpc.parse_uri(raw).await.ok()?;
            if parsed.address.is_empty() {
                return None;
            }
            return Some(ClaimDestination::Account {
                address: parsed.address,
                amount: parsed.amount,
                payment_request: Some(raw.to_string()),
            });
        }
        match self.rpc.validate_address(raw).await {
            Ok(true) => Some(ClaimDestination::Account {
                address: raw.to_string(),
                amount: None,
                payment_request: None,
            }),
            _ => None,
        }
    }

    fn validate_claim_destination(
        &self,
        destination: &ClaimDestination,
        terms: &PullPaymentTerms,
    ) -> Result<(), ClaimError> {
        let ClaimDestination::Account { amount, .. } = destination else {
            return Err(ClaimError::WrongRail);
        };
        if let Some(requested) = *amount {
            if requested != terms.claimed_amount {
                return Err(ClaimError::AmountMismatch {
                    requested,
                    claimed: terms.claimed_amount,
                });
            }
        }
        Ok(())
    }

    async fn minimum_payout_amount(
        &self,
        _payment_method: &PaymentMethodId,
        _destination: &ClaimDestination,
    ) -> Decimal {
        Decimal::ZERO
    }

    async fn track_claim(
        &self,
        _payment_method: &PaymentMethodId,
        _destination: &ClaimDestination,
    ) -> anyhow::Result<()> {
        // The node watches its own accounts; nothing to register here.
        Ok(())
    }

    fn parse_proof(&self, payout: &Payout) -> Option<PayoutProof> {
        let blob = payout.proof.as_deref()?;
        match PayoutProof::from_blob(blob)? {
            proof @ PayoutProof::Manual(_) => Some(proof),
            _ => None,
        }
    }

    fn subscribed_events(&self) -> Vec<EventKind> {
        // Completion is rail-defined and settled outside this engine.
        Vec::new()
    }

    async fn background_check(&self, _event: &ReconciliationEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
