//! On-chain (UTXO) payout handler: destination parsing, dust minimums, and
//! the two reconciliation passes that walk a payout from `AwaitingPayment`
//! through candidate tracking to `Completed`.
use crate::chain_source::{BroadcastOutcome, ChainSource};
use crate::destination::{btc_value, parse_claim_destination, ClaimDestination, ClaimError};
use crate::events::{EventKind, ReconciliationEvent, TransactionEvent};
use crate::handler::PayoutHandler;
use crate::hooks::WalletHooks;
use crate::payout::{PaymentMethodId, Payout, PayoutState, PullPaymentTerms, RailKind};
use crate::proof::{set_proof_blob, OnChainProof, PayoutProof};
use crate::store::PayoutStore;
use async_trait::async_trait;
use bitcoin::{Address, Amount, Network, TxOut};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Static description of one UTXO rail.
#[derive(Debug, Clone)]
pub struct RailConfig {
    /// Ticker, e.g. `"BTC"`.
    pub crypto_code: String,
    /// Network the rail's addresses belong to.
    pub network: Network,
    /// URI scheme recognized when parsing claim destinations.
    pub uri_scheme: String,
    /// Block-explorer URL template stamped onto proofs, `{0}` = txid.
    pub link_template: String,
    /// Read-only wallets cannot settle payouts; gates `can_handle`.
    pub read_only_wallet: bool,
}

impl RailConfig {
    /// Bitcoin-flavored defaults for `crypto_code` on `network`.
    pub fn new(crypto_code: impl Into<String>, network: Network) -> Self {
        Self {
            crypto_code: crypto_code.into(),
            network,
            uri_scheme: "bitcoin".into(),
            link_template: "https://mempool.space/tx/{0}".into(),
            read_only_wallet: false,
        }
    }
}

/// UTXO rail handler. `S` = payout store, `C` = chain collaborator,
/// `W` = wallet hooks.
pub struct OnChainPayoutHandler<S, C, W> {
    config: RailConfig,
    store: S,
    chain: C,
    wallet: W,
}

impl<S, C, W> OnChainPayoutHandler<S, C, W>
where
    S: PayoutStore + 'static,
    C: ChainSource + 'static,
    W: WalletHooks + 'static,
{
    /// Create a handler for one rail over its collaborators.
    pub fn new(config: RailConfig, store: S, chain: C, wallet: W) -> Self {
        Self {
            config,
            store,
            chain,
            wallet,
        }
    }

    /// The payment method this handler owns.
    pub fn payment_method(&self) -> PaymentMethodId {
        PaymentMethodId::on_chain(self.config.crypto_code.clone())
    }

    /// Awaiting-payment pass: match a newly observed transaction against
    /// payouts still waiting for settlement, by destination and exact amount.
    async fn update_payouts_awaiting(&self, event: &TransactionEvent) -> anyhow::Result<()> {
        // destination string -> total value received by it in this tx
        let mut destinations: HashMap<String, Amount> = HashMap::new();
        match &event.tracked_address {
            Some(address) => {
                let total = event.outputs.iter().fold(Amount::ZERO, |a, o| a + o.value);
                destinations.insert(address.to_string(), total);
            }
            None => {
                for output in &event.outputs {
                    let Ok(address) =
                        Address::from_script(&output.script_pubkey, self.config.network)
                    else {
                        continue; // non-address output, e.g. op_return
                    };
                    *destinations.entry(address.to_string()).or_insert(Amount::ZERO) +=
                        output.value;
                }
            }
        }
        if destinations.is_empty() {
            return Ok(());
        }

        let payment_method = self.payment_method();
        let payouts = self
            .store
            .payouts_by_state(&payment_method, PayoutState::AwaitingPayment)
            .await?;
        let mut updated = Vec::new();
        for mut payout in payouts {
            let Some(&received) = payout
                .destination
                .as_deref()
                .and_then(|d| destinations.get(d))
            else {
                continue;
            };
            // Strict equality: a wrong amount is never accepted as a partial
            // or over-payment.
            if btc_value(received) != payout.crypto_amount {
                continue;
            }
            let mut proof = match self.parse_proof(&payout) {
                Some(PayoutProof::OnChain(p)) => p,
                _ => OnChainProof::new(&self.config.link_template),
            };
            if proof.insert_candidate(event.txid) {
                payout.state = PayoutState::InProgress;
                if proof.transaction_id.is_none() {
                    proof.transaction_id = Some(event.txid);
                }
                set_proof_blob(&mut payout, &PayoutProof::OnChain(proof))?;
                if let Err(e) = self.wallet.on_payout_matched(&payout.id, event.txid).await {
                    warn!(payout = %payout.id, error = %e, "wallet label hook failed");
                }
                updated.push(payout);
            }
        }
        debug!(matched = updated.len(), txid = %event.txid, "awaiting-payment pass done");
        self.store.update_payouts(&updated).await
    }

    /// In-progress pass: re-query every candidate of every in-progress
    /// payout, prune the dead, rebroadcast the quiet, complete the confirmed.
    async fn update_payouts_in_progress(&self) -> anyhow::Result<()> {
        let payment_method = self.payment_method();
        let payouts = self
            .store
            .payouts_by_state(&payment_method, PayoutState::InProgress)
            .await?;
        let mut updated = Vec::new();
        'payouts: for mut payout in payouts {
            let Some(PayoutProof::OnChain(mut proof)) = self.parse_proof(&payout) else {
                continue;
            };
            let prior_state = payout.state;
            // Iterate a snapshot; the live set shrinks as candidates drop.
            for txid in proof.candidates.clone() {
                let lookup = match self.chain.get_transaction(txid).await {
                    Ok(l) => l,
                    Err(e) => {
                        // Collaborator outage on one payout must not abort
                        // the rest; leave this one for the next event.
                        warn!(payout = %payout.id, %txid, error = %e, "chain query failed");
                        continue 'payouts;
                    }
                };
                match lookup {
                    None => proof.remove_candidate(&txid),
                    Some(tx) if tx.confirmations >= payout.min_confirmations => {
                        payout.state = PayoutState::Completed;
                        proof.transaction_id = Some(txid);
                        payout.destination = None;
                        break;
                    }
                    Some(tx) => match self.chain.broadcast(&tx.raw).await {
                        Ok(BroadcastOutcome::Rejected(reason)) => {
                            debug!(payout = %payout.id, %txid, ?reason, "candidate rejected");
                            proof.remove_candidate(&txid);
                        }
                        // Still racing; keep it and evaluate the rest —
                        // competing double-spends can leave several
                        // candidates legitimately live at once.
                        Ok(BroadcastOutcome::Accepted) => {}
                        Err(e) => {
                            warn!(payout = %payout.id, %txid, error = %e, "rebroadcast failed");
                            continue 'payouts;
                        }
                    },
                }
            }
            if payout.state == PayoutState::Completed {
                // The final txid lives only in transaction_id from here on.
                proof.candidates.clear();
            } else {
                // transaction_id = existing value if still a candidate,
                // else the first remaining candidate, else none.
                match proof.transaction_id {
                    Some(t) if proof.contains_candidate(&t) => {}
                    _ => proof.transaction_id = proof.candidates.first().copied(),
                }
                if proof.candidates.is_empty() {
                    payout.state = PayoutState::AwaitingPayment;
                }
            }
            let proof_changed = set_proof_blob(&mut payout, &PayoutProof::OnChain(proof))?;
            if proof_changed || payout.state != prior_state {
                updated.push(payout);
            }
        }
        self.store.update_payouts(&updated).await
    }
}

#[async_trait]
impl<S, C, W> PayoutHandler for OnChainPayoutHandler<S, C, W>
where
    S: PayoutStore + 'static,
    C: ChainSource + 'static,
    W: WalletHooks + 'static,
{
    fn can_handle(&self, payment_method: &PaymentMethodId) -> bool {
        payment_method.rail == RailKind::OnChain
            && payment_method.crypto_code == self.config.crypto_code
            && !self.config.read_only_wallet
    }

    async fn parse_claim_destination(
        &self,
        payment_method: &PaymentMethodId,
        raw: &str,
    ) -> Option<ClaimDestination> {
        if !self.can_handle(payment_method) {
            return None;
        }
        parse_claim_destination(self.config.network, &self.config.uri_scheme, raw)
    }

    fn validate_claim_destination(
        &self,
        destination: &ClaimDestination,
        terms: &PullPaymentTerms,
    ) -> Result<(), ClaimError> {
        if matches!(destination, ClaimDestination::Account { .. }) {
            return Err(ClaimError::WrongRail);
        }
        if let Some(requested) = destination.requested_amount() {
            if requested != terms.claimed_amount {
                return Err(ClaimError::AmountMismatch {
                    requested,
                    claimed: terms.claimed_amount,
                });
            }
        }
        if let Some(min) = terms.min_claim {
            if terms.claimed_amount < min {
                return Err(ClaimError::BelowMinimum(min));
            }
        }
        if let Some(max) = terms.max_claim {
            if terms.claimed_amount > max {
                return Err(ClaimError::AboveMaximum(max));
            }
        }
        Ok(())
    }

    async fn minimum_payout_amount(
        &self,
        payment_method: &PaymentMethodId,
        destination: &ClaimDestination,
    ) -> Decimal {
        if !self.can_handle(payment_method) {
            return Decimal::ZERO;
        }
        match destination.script_pubkey() {
            // Dust threshold of the destination's script type at the
            // reference relay rate.
            Some(script) => btc_value(TxOut::minimal_non_dust(script).value),
            None => Decimal::ZERO,
        }
    }

    async fn track_claim(
        &self,
        payment_method: &PaymentMethodId,
        destination: &ClaimDestination,
    ) -> anyhow::Result<()> {
        if !self.can_handle(payment_method) {
            return Ok(());
        }
        match destination.address() {
            Some(address) => self.wallet.track(address).await,
            None => Ok(()),
        }
    }

    fn parse_proof(&self, payout: &Payout) -> Option<PayoutProof> {
        let blob = payout.proof.as_deref()?;
        match PayoutProof::from_blob(blob)? {
            PayoutProof::OnChain(mut proof) => {
                // The explorer link is rail configuration, not payout state.
                proof.link_template = self.config.link_template.clone();
                Some(PayoutProof::OnChain(proof))
            }
            _ => None,
        }
    }

    fn subscribed_events(&self) -> Vec<EventKind> {
        vec![EventKind::NewTransaction, EventKind::NewChainTip]
    }

    async fn background_check(&self, event: &ReconciliationEvent) -> anyhow::Result<()> {
        if let ReconciliationEvent::NewTransaction(tx_event) = event {
            if tx_event.crypto_code == self.config.crypto_code {
                self.update_payouts_awaiting(tx_event).await?;
            }
        }
        self.update_payouts_in_progress().await
    }
}
