//! Claim destination parsing: rail URI scheme first, bare address second.
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Amount, Denomination, Network, ScriptBuf};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// A resolved, typed target a payout settles to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimDestination {
    /// Bare on-chain address.
    Address {
        /// Network-checked address.
        address: Address,
    },
    /// Payment URI embedding an address and, optionally, a requested amount.
    Uri {
        /// Network-checked address extracted from the URI.
        address: Address,
        /// Amount requested by the URI, to reconcile against the claim.
        amount: Option<Amount>,
    },
    /// Node-validated destination for account-based rails, kept as strings
    /// because address-format rules live in the node, not here.
    Account {
        /// Address as the node reported it.
        address: String,
        /// Amount embedded in the payment request, if any.
        amount: Option<Decimal>,
        /// The original payment request URI, when parsed from one.
        payment_request: Option<String>,
    },
}

impl ClaimDestination {
    /// The on-chain address, when this destination has one.
    pub fn address(&self) -> Option<&Address> {
        match self {
            ClaimDestination::Address { address } | ClaimDestination::Uri { address, .. } => {
                Some(address)
            }
            ClaimDestination::Account { .. } => None,
        }
    }

    /// Script paying this destination, for UTXO rails.
    pub fn script_pubkey(&self) -> Option<ScriptBuf> {
        self.address().map(|a| a.script_pubkey())
    }

    /// Amount the destination itself asks for, in the rail's native unit.
    pub fn requested_amount(&self) -> Option<Decimal> {
        match self {
            ClaimDestination::Address { .. } => None,
            ClaimDestination::Uri { amount, .. } => amount.map(btc_value),
            ClaimDestination::Account { amount, .. } => *amount,
        }
    }
}

impl fmt::Display for ClaimDestination {
    /// The canonical destination string stored on the payout row — always the
    /// address, even for URI claims, so it matches incoming output addresses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimDestination::Address { address } | ClaimDestination::Uri { address, .. } => {
                write!(f, "{address}")
            }
            ClaimDestination::Account { address, .. } => write!(f, "{address}"),
        }
    }
}

/// Why a claim destination was rejected during validation.
#[derive(Debug, Error, PartialEq)]
pub enum ClaimError {
    /// Claimed amount is under the rail's minimum (e.g. dust).
    #[error("claimed amount is below the rail minimum of {0}")]
    BelowMinimum(Decimal),
    /// Claimed amount exceeds the pull-payment budget.
    #[error("claimed amount exceeds the pull payment limit of {0}")]
    AboveMaximum(Decimal),
    /// The destination embeds an amount that disagrees with the claim.
    #[error("destination requests {requested} but the claim is for {claimed}")]
    AmountMismatch {
        /// Amount embedded in the destination.
        requested: Decimal,
        /// Amount the claimant asked for.
        claimed: Decimal,
    },
    /// The destination does not belong to this rail.
    #[error("destination does not belong to this rail")]
    WrongRail,
}

/// Exact decimal value of a satoshi amount in BTC denomination.
pub fn btc_value(amount: Amount) -> Decimal {
    Decimal::new(amount.to_sat() as i64, 8)
}

/// Parse a user-supplied destination for a UTXO rail.
///
/// Tries a case-insensitive `<scheme>:` URI first, then a bare address.
/// Any malformed input yields `None`; no parse error escapes to the caller.
pub fn parse_claim_destination(
    network: Network,
    uri_scheme: &str,
    raw: &str,
) -> Option<ClaimDestination> {
    let raw = raw.trim();
    let prefix = format!("{uri_scheme}:");
    if let Some(head) = raw.get(..prefix.len()) {
        if head.eq_ignore_ascii_case(&prefix) && raw.len() > prefix.len() {
            return parse_uri(network, &raw[prefix.len()..]);
        }
    }
    let address = raw
        .parse::<Address<NetworkUnchecked>>()
        .ok()?
        .require_network(network)
        .ok()?;
    Some(ClaimDestination::Address { address })
}

/// BIP21-style body: `[//]<address>[?amount=..&key=..]`.
/// Unknown query keys are ignored; a malformed `amount` fails the parse.
fn parse_uri(network: Network, body: &str) -> Option<ClaimDestination> {
    let body = body.strip_prefix("//").unwrap_or(body);
    let (addr_part, query) = match body.split_once('?') {
        Some((a, q)) => (a, Some(q)),
        None => (body, None),
    };
    let address = addr_part
        .parse::<Address<NetworkUnchecked>>()
        .ok()?
        .require_network(network)
        .ok()?;
    let mut amount = None;
    if let Some(query) = query {
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=')?;
            if key.eq_ignore_ascii_case("amount") {
                amount = Some(Amount::from_str_in(value, Denomination::Bitcoin).ok()?);
            }
        }
    }
    Some(ClaimDestination::Uri { address, amount })
}
