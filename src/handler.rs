//! The capability interface every settlement rail implements.
use crate::destination::{ClaimDestination, ClaimError};
use crate::events::{EventKind, ReconciliationEvent};
use crate::payout::{PaymentMethodId, Payout, PullPaymentTerms};
use crate::proof::PayoutProof;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Capability-gated, rail-specific payout operations.
///
/// A handler is selected once per payment method via [`can_handle`] — never
/// by probing types at call sites — and then owns destination parsing,
/// validation, wallet tracking, proof interpretation, and the background
/// reconciliation of its payouts.
///
/// [`can_handle`]: PayoutHandler::can_handle
#[async_trait]
pub trait PayoutHandler: Send + Sync {
    /// True only if this handler owns `payment_method` *and* the rail's
    /// wallet can actually sign/settle (read-only wallets cannot pay out).
    fn can_handle(&self, payment_method: &PaymentMethodId) -> bool;

    /// Parse a user-supplied destination string. `None` on any failure; the
    /// caller cannot currently distinguish failure reasons.
    async fn parse_claim_destination(
        &self,
        payment_method: &PaymentMethodId,
        raw: &str,
    ) -> Option<ClaimDestination>;

    /// Rail-specific acceptance rules for a parsed destination.
    fn validate_claim_destination(
        &self,
        destination: &ClaimDestination,
        terms: &PullPaymentTerms,
    ) -> Result<(), ClaimError>;

    /// Smallest amount worth paying to `destination`; `0` if inapplicable.
    async fn minimum_payout_amount(
        &self,
        payment_method: &PaymentMethodId,
        destination: &ClaimDestination,
    ) -> Decimal;

    /// Ask the wallet layer to watch `destination` for incoming matches.
    async fn track_claim(
        &self,
        payment_method: &PaymentMethodId,
        destination: &ClaimDestination,
    ) -> anyhow::Result<()>;

    /// Deserialize the payout's proof with this handler's schema.
    /// `None` if there is no proof yet or the blob carries a foreign tag.
    fn parse_proof(&self, payout: &Payout) -> Option<PayoutProof>;

    /// Event categories this handler's background check must receive.
    fn subscribed_events(&self) -> Vec<EventKind>;

    /// Run the rail's reconciliation passes for one delivered event.
    async fn background_check(&self, event: &ReconciliationEvent) -> anyhow::Result<()>;
}
