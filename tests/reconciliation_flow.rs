use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    WPubkeyHash, Witness,
};
use bitcoin::hashes::Hash as _;
use remesa::chain_source::{BroadcastOutcome, ChainTransaction, RejectReason};
use remesa::events::{ReconciliationEvent, TransactionEvent, TxOutput};
use remesa::onchain::RailConfig;
use remesa::payout::{Payout, PullPaymentTerms};
use remesa::prelude::*;
use remesa::proof::PayoutProof;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// ------- In-memory payout store with a physical-write counter -------
#[derive(Clone, Default)]
struct MemStore {
    payouts: Arc<Mutex<BTreeMap<String, Payout>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemStore {
    fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
    fn get(&self, id: &str) -> Payout {
        self.payouts.lock().unwrap().get(id).unwrap().clone()
    }
}

#[async_trait]
impl PayoutStore for MemStore {
    async fn create_payout(&self, payout: Payout) -> anyhow::Result<()> {
        self.payouts.lock().unwrap().insert(payout.id.clone(), payout);
        Ok(())
    }
    async fn get_payout(&self, id: &str) -> anyhow::Result<Option<Payout>> {
        Ok(self.payouts.lock().unwrap().get(id).cloned())
    }
    async fn payouts_by_state(
        &self,
        payment_method: &PaymentMethodId,
        state: PayoutState,
    ) -> anyhow::Result<Vec<Payout>> {
        Ok(self
            .payouts
            .lock()
            .unwrap()
            .values()
            .filter(|p| &p.payment_method == payment_method && p.state == state)
            .cloned()
            .collect())
    }
    async fn update_payouts(&self, payouts: &[Payout]) -> anyhow::Result<()> {
        let mut map = self.payouts.lock().unwrap();
        for payout in payouts {
            map.insert(payout.id.clone(), payout.clone());
        }
        *self.writes.lock().unwrap() += payouts.len();
        Ok(())
    }
}

/// ------- Scriptable chain collaborator -------
#[derive(Clone, Default)]
struct FakeChain {
    /// txid -> (confirmations, raw tx); absent means NotFound.
    txs: Arc<Mutex<HashMap<Txid, (u32, Transaction)>>>,
    /// txids whose rebroadcast the chain refuses.
    rejects: Arc<Mutex<HashMap<Txid, RejectReason>>>,
    /// txids whose lookup fails hard (collaborator outage).
    outages: Arc<Mutex<HashSet<Txid>>>,
    broadcasts: Arc<Mutex<Vec<Txid>>>,
}

impl FakeChain {
    fn put(&self, tx: &Transaction, confirmations: u32) {
        self.txs
            .lock()
            .unwrap()
            .insert(tx.compute_txid(), (confirmations, tx.clone()));
    }
    fn confirm(&self, txid: Txid, confirmations: u32) {
        self.txs.lock().unwrap().get_mut(&txid).unwrap().0 = confirmations;
    }
    fn drop_tx(&self, txid: &Txid) {
        self.txs.lock().unwrap().remove(txid);
    }
    fn reject(&self, txid: Txid, reason: RejectReason) {
        self.rejects.lock().unwrap().insert(txid, reason);
    }
    fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn get_transaction(&self, txid: Txid) -> anyhow::Result<Option<ChainTransaction>> {
        if self.outages.lock().unwrap().contains(&txid) {
            anyhow::bail!("node unreachable");
        }
        Ok(self.txs.lock().unwrap().get(&txid).map(|(confirmations, raw)| {
            ChainTransaction {
                txid,
                confirmations: *confirmations,
                raw: raw.clone(),
            }
        }))
    }
    async fn broadcast(&self, tx: &Transaction) -> anyhow::Result<BroadcastOutcome> {
        let txid = tx.compute_txid();
        self.broadcasts.lock().unwrap().push(txid);
        Ok(match self.rejects.lock().unwrap().get(&txid) {
            Some(reason) => BroadcastOutcome::Rejected(*reason),
            None => BroadcastOutcome::Accepted,
        })
    }
}

/// ------- Wallet hooks: tracked destinations + label recorder -------
#[derive(Clone, Default)]
struct FakeWallet {
    tracked: Arc<Mutex<Vec<String>>>,
    labels: Arc<Mutex<Vec<(String, Txid)>>>,
}

#[async_trait]
impl WalletHooks for FakeWallet {
    async fn track(&self, address: &Address) -> anyhow::Result<()> {
        self.tracked.lock().unwrap().push(address.to_string());
        Ok(())
    }
    async fn on_payout_matched(&self, payout_id: &str, txid: Txid) -> anyhow::Result<()> {
        self.labels.lock().unwrap().push((payout_id.to_string(), txid));
        Ok(())
    }
}

/// Destination address used throughout: a fixed P2WPKH script.
fn dest_address() -> Address {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([7u8; 20]));
    Address::from_script(&script, Network::Bitcoin).unwrap()
}

fn other_address() -> Address {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([8u8; 20]));
    Address::from_script(&script, Network::Bitcoin).unwrap()
}

/// Build a transaction paying `outputs`; `salt` varies the txid.
fn make_tx(outputs: &[(Address, Amount)], salt: u32) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::from_consensus(salt),
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([9u8; 32]),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs
            .iter()
            .map(|(address, value)| TxOut {
                value: *value,
                script_pubkey: address.script_pubkey(),
            })
            .collect(),
    }
}

fn tx_event(tx: &Transaction) -> ReconciliationEvent {
    ReconciliationEvent::NewTransaction(TransactionEvent {
        crypto_code: "BTC".into(),
        txid: tx.compute_txid(),
        outputs: tx
            .output
            .iter()
            .map(|o| TxOutput {
                script_pubkey: o.script_pubkey.clone(),
                value: o.value,
            })
            .collect(),
        tracked_address: None,
    })
}

fn handler(
    store: MemStore,
    chain: FakeChain,
    wallet: FakeWallet,
) -> OnChainPayoutHandler<MemStore, FakeChain, FakeWallet> {
    OnChainPayoutHandler::new(RailConfig::new("BTC", Network::Bitcoin), store, chain, wallet)
}

fn onchain_proof(payout: &Payout) -> remesa::proof::OnChainProof {
    match PayoutProof::from_blob(payout.proof.as_deref().expect("proof present")) {
        Some(PayoutProof::OnChain(p)) => p,
        other => panic!("expected on-chain proof, got {other:?}"),
    }
}

async fn seed_payout(store: &MemStore, id: &str, amount: rust_decimal::Decimal, min_conf: u32) {
    store
        .create_payout(Payout::new(
            id,
            "pp-1",
            PaymentMethodId::on_chain("BTC"),
            dest_address().to_string(),
            amount,
            min_conf,
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn exact_match_promotes_to_in_progress() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());

    h.background_check(&tx_event(&t1)).await?;

    let p = store.get("p1");
    assert_eq!(p.state, PayoutState::InProgress);
    let proof = onchain_proof(&p);
    assert_eq!(proof.candidates, vec![t1.compute_txid()]);
    assert_eq!(proof.transaction_id, Some(t1.compute_txid()));
    assert_eq!(
        wallet.labels.lock().unwrap().as_slice(),
        &[("p1".to_string(), t1.compute_txid())]
    );
    Ok(())
}

#[tokio::test]
async fn confirmed_candidate_completes_payout() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());
    h.background_check(&tx_event(&t1)).await?;

    chain.confirm(t1.compute_txid(), 1);
    h.background_check(&ReconciliationEvent::NewChainTip).await?;

    let p = store.get("p1");
    assert_eq!(p.state, PayoutState::Completed);
    assert_eq!(p.destination, None, "destination is cleared for privacy");
    let proof = onchain_proof(&p);
    assert_eq!(proof.transaction_id, Some(t1.compute_txid()));
    assert!(proof.candidates.is_empty(), "final txid lives only in transaction_id");
    Ok(())
}

#[tokio::test]
async fn dropped_candidate_reverts_to_awaiting() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());
    h.background_check(&tx_event(&t1)).await?;

    // T1 is replaced before confirmation; the chain no longer knows it.
    chain.drop_tx(&t1.compute_txid());
    h.background_check(&ReconciliationEvent::NewChainTip).await?;

    let p = store.get("p1");
    assert_eq!(p.state, PayoutState::AwaitingPayment);
    assert_eq!(p.destination, Some(dest_address().to_string()));
    let proof = onchain_proof(&p);
    assert!(proof.candidates.is_empty());
    assert_eq!(proof.transaction_id, None);
    Ok(())
}

#[tokio::test]
async fn redelivered_event_is_idempotent_and_write_suppressed() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());

    h.background_check(&tx_event(&t1)).await?;
    let after_first = store.get("p1");
    let writes_after_first = store.writes();

    // At-least-once delivery: the same event arrives again.
    h.background_check(&tx_event(&t1)).await?;

    assert_eq!(store.get("p1"), after_first, "state converged");
    assert_eq!(
        store.writes(),
        writes_after_first,
        "unchanged proof must not trigger another physical write"
    );
    Ok(())
}

#[tokio::test]
async fn wrong_amount_is_never_matched() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;
    let h = handler(store.clone(), chain.clone(), wallet.clone());

    let short = make_tx(&[(dest_address(), Amount::from_sat(999_999))], 1);
    let over = make_tx(&[(dest_address(), Amount::from_sat(1_000_001))], 2);
    h.background_check(&tx_event(&short)).await?;
    h.background_check(&tx_event(&over)).await?;

    let p = store.get("p1");
    assert_eq!(p.state, PayoutState::AwaitingPayment);
    assert!(p.proof.is_none());
    Ok(())
}

#[tokio::test]
async fn split_outputs_to_one_destination_sum_to_a_match() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    // Two outputs to the same address, plus change elsewhere.
    let t1 = make_tx(
        &[
            (dest_address(), Amount::from_sat(400_000)),
            (dest_address(), Amount::from_sat(600_000)),
            (other_address(), Amount::from_sat(123_456)),
        ],
        1,
    );
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());
    h.background_check(&tx_event(&t1)).await?;

    assert_eq!(store.get("p1").state, PayoutState::InProgress);
    Ok(())
}

#[tokio::test]
async fn tracked_address_scope_sums_event_outputs() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());

    let event = ReconciliationEvent::NewTransaction(TransactionEvent {
        crypto_code: "BTC".into(),
        txid: t1.compute_txid(),
        outputs: vec![TxOutput {
            script_pubkey: dest_address().script_pubkey(),
            value: Amount::from_sat(1_000_000),
        }],
        tracked_address: Some(dest_address()),
    });
    h.background_check(&event).await?;

    assert_eq!(store.get("p1").state, PayoutState::InProgress);
    Ok(())
}

#[tokio::test]
async fn foreign_rail_event_is_ignored() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;
    let h = handler(store.clone(), chain.clone(), wallet.clone());

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    let mut event = match tx_event(&t1) {
        ReconciliationEvent::NewTransaction(e) => e,
        _ => unreachable!(),
    };
    event.crypto_code = "LTC".into();
    h.background_check(&ReconciliationEvent::NewTransaction(event)).await?;

    assert_eq!(store.get("p1").state, PayoutState::AwaitingPayment);
    Ok(())
}

#[tokio::test]
async fn confirmation_threshold_is_a_strict_boundary() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 3).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    chain.put(&t1, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());
    h.background_check(&tx_event(&t1)).await?;

    // minimum - 1: still in progress, and the candidate was rebroadcast
    chain.confirm(t1.compute_txid(), 2);
    let broadcasts_before = chain.broadcast_count();
    h.background_check(&ReconciliationEvent::NewChainTip).await?;
    assert_eq!(store.get("p1").state, PayoutState::InProgress);
    assert!(chain.broadcast_count() > broadcasts_before);

    // exactly the minimum: completed
    chain.confirm(t1.compute_txid(), 3);
    h.background_check(&ReconciliationEvent::NewChainTip).await?;
    assert_eq!(store.get("p1").state, PayoutState::Completed);
    Ok(())
}

#[tokio::test]
async fn double_spend_race_keeps_both_candidates_until_one_wins() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    let t2 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 2);
    chain.put(&t1, 0);
    chain.put(&t2, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());

    h.background_check(&tx_event(&t1)).await?;
    h.background_check(&tx_event(&t2)).await?;

    let proof = onchain_proof(&store.get("p1"));
    assert_eq!(proof.candidates, vec![t1.compute_txid(), t2.compute_txid()]);
    // first observed candidate holds the provisional transaction_id
    assert_eq!(proof.transaction_id, Some(t1.compute_txid()));

    // T2 confirms; T1 is now a conflict the chain refuses to take back.
    chain.reject(t1.compute_txid(), RejectReason::Conflicting);
    chain.confirm(t2.compute_txid(), 1);
    h.background_check(&ReconciliationEvent::NewChainTip).await?;

    let p = store.get("p1");
    assert_eq!(p.state, PayoutState::Completed);
    assert_eq!(onchain_proof(&p).transaction_id, Some(t2.compute_txid()));
    Ok(())
}

#[tokio::test]
async fn rejected_rebroadcast_drops_candidate_and_repairs_transaction_id() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 5).await;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    let t2 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 2);
    chain.put(&t1, 0);
    chain.put(&t2, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());
    h.background_check(&tx_event(&t1)).await?;
    h.background_check(&tx_event(&t2)).await?;

    // T1 (the provisional transaction_id) becomes invalid; T2 stays quiet.
    chain.reject(t1.compute_txid(), RejectReason::Invalid);
    h.background_check(&ReconciliationEvent::NewChainTip).await?;

    let p = store.get("p1");
    assert_eq!(p.state, PayoutState::InProgress);
    let proof = onchain_proof(&p);
    assert_eq!(proof.candidates, vec![t2.compute_txid()]);
    assert_eq!(
        proof.transaction_id,
        Some(t2.compute_txid()),
        "transaction_id falls back to the first remaining candidate"
    );
    Ok(())
}

#[tokio::test]
async fn collaborator_outage_on_one_payout_spares_the_others() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    seed_payout(&store, "p1", dec!(0.01), 1).await;
    store
        .create_payout(Payout::new(
            "p2",
            "pp-1",
            PaymentMethodId::on_chain("BTC"),
            other_address().to_string(),
            dec!(0.02),
            1,
        ))
        .await?;

    let t1 = make_tx(&[(dest_address(), Amount::from_sat(1_000_000))], 1);
    let t2 = make_tx(&[(other_address(), Amount::from_sat(2_000_000))], 2);
    chain.put(&t1, 0);
    chain.put(&t2, 0);
    let h = handler(store.clone(), chain.clone(), wallet.clone());
    h.background_check(&tx_event(&t1)).await?;
    h.background_check(&tx_event(&t2)).await?;

    // p1's candidate lookup now fails hard; p2's confirms.
    chain.outages.lock().unwrap().insert(t1.compute_txid());
    chain.confirm(t2.compute_txid(), 1);
    h.background_check(&ReconciliationEvent::NewChainTip).await?;

    assert_eq!(store.get("p1").state, PayoutState::InProgress, "left for the next event");
    assert_eq!(store.get("p2").state, PayoutState::Completed);
    Ok(())
}

#[tokio::test]
async fn read_only_wallet_cannot_handle_the_rail() {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    let mut config = RailConfig::new("BTC", Network::Bitcoin);
    config.read_only_wallet = true;
    let h = OnChainPayoutHandler::new(config, store, chain, wallet);

    assert!(!h.can_handle(&PaymentMethodId::on_chain("BTC")));
    assert_eq!(
        h.parse_claim_destination(&PaymentMethodId::on_chain("BTC"), &dest_address().to_string())
            .await,
        None
    );
}

#[tokio::test]
async fn track_claim_registers_the_destination() -> anyhow::Result<()> {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    let h = handler(store, chain, wallet.clone());
    let pm = PaymentMethodId::on_chain("BTC");
    let destination = h
        .parse_claim_destination(&pm, &dest_address().to_string())
        .await
        .expect("parses");

    h.track_claim(&pm, &destination).await?;

    assert_eq!(
        wallet.tracked.lock().unwrap().as_slice(),
        &[dest_address().to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn uri_amount_must_agree_with_the_claim() {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    let h = handler(store, chain, wallet);
    let pm = PaymentMethodId::on_chain("BTC");
    let uri = format!("bitcoin:{}?amount=0.01", dest_address());
    let destination = h.parse_claim_destination(&pm, &uri).await.expect("parses");

    let ok = PullPaymentTerms {
        claimed_amount: dec!(0.01),
        ..Default::default()
    };
    assert!(h.validate_claim_destination(&destination, &ok).is_ok());

    let mismatched = PullPaymentTerms {
        claimed_amount: dec!(0.02),
        ..Default::default()
    };
    assert!(h.validate_claim_destination(&destination, &mismatched).is_err());
}

#[tokio::test]
async fn dust_threshold_is_the_rail_minimum() {
    let (store, chain, wallet) = (MemStore::default(), FakeChain::default(), FakeWallet::default());
    let h = handler(store, chain, wallet);
    let pm = PaymentMethodId::on_chain("BTC");
    let destination = h
        .parse_claim_destination(&pm, &dest_address().to_string())
        .await
        .expect("parses");

    let minimum = h.minimum_payout_amount(&pm, &destination).await;
    assert!(
        minimum > rust_decimal::Decimal::ZERO,
        "a P2WPKH destination has a nonzero dust floor, got {minimum}"
    );
    assert!(minimum < dec!(0.0001), "dust floor is a handful of sats, got {minimum}");
}
