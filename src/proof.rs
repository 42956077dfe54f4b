//! Proof-of-payment codec: rail-tagged JSON blobs stored on the payout row.
//!
//! Deserialization is total and typed — the `proofType` tag picks the schema,
//! so no caller ever downcasts an untagged blob. A blob with a foreign or
//! missing tag simply parses to `None`.
use crate::payout::Payout;
use anyhow::Context;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// Rail-tagged proof-of-payment, persisted as UTF-8 JSON on [`Payout::proof`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "proofType")]
pub enum PayoutProof {
    /// On-chain (UTXO) proof: candidate txids racing to confirmation.
    #[serde(rename = "on-chain/1")]
    OnChain(OnChainProof),
    /// Opaque proof for rails whose completion semantics the engine never
    /// interprets (account-based or manual settlement).
    #[serde(rename = "manual/1")]
    Manual(ManualProof),
}

impl PayoutProof {
    /// Decode a stored blob. Foreign tags and malformed bytes yield `None`.
    pub fn from_blob(blob: &[u8]) -> Option<PayoutProof> {
        serde_json::from_slice(blob).ok()
    }
}

/// On-chain proof schema.
///
/// Invariant: while the payout is `InProgress`, `transaction_id` (if set) is
/// a member of `candidates`; `candidates` is empty only transiently between a
/// full drop and the state revert that follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainProof {
    /// The settling transaction, once one is known or final.
    pub transaction_id: Option<Txid>,
    /// Insertion-ordered set of txids believed to settle this payout.
    pub candidates: Vec<Txid>,
    /// Block-explorer URL template with `{0}` standing in for the txid.
    pub link_template: String,
}

impl OnChainProof {
    /// Empty proof carrying the rail's explorer link template.
    pub fn new(link_template: impl Into<String>) -> Self {
        Self {
            transaction_id: None,
            candidates: Vec::new(),
            link_template: link_template.into(),
        }
    }

    /// Set-insert: returns `false` (and changes nothing) if already present.
    pub fn insert_candidate(&mut self, txid: Txid) -> bool {
        if self.candidates.contains(&txid) {
            return false;
        }
        self.candidates.push(txid);
        true
    }

    /// Drop a candidate, keeping the order of the rest.
    pub fn remove_candidate(&mut self, txid: &Txid) {
        self.candidates.retain(|c| c != txid);
    }

    /// Whether `txid` is still a live candidate.
    pub fn contains_candidate(&self, txid: &Txid) -> bool {
        self.candidates.contains(txid)
    }
}

/// Proof schema for rails settled outside this engine's state machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualProof {
    /// Rail-defined settlement reference, if any.
    pub id: Option<String>,
    /// Link to wherever the settlement can be inspected.
    pub link: Option<String>,
}

/// Serialize `proof` onto `payout`, writing only when the bytes actually
/// changed. Returns whether a write happened, so no-op passes stay no-ops
/// all the way down to storage.
pub fn set_proof_blob(payout: &mut Payout, proof: &PayoutProof) -> anyhow::Result<bool> {
    let bytes = serde_json::to_vec(proof).context("serialize payout proof")?;
    if payout.proof.as_deref() == Some(bytes.as_slice()) {
        return Ok(false);
    }
    payout.proof = Some(bytes);
    Ok(true)
}
