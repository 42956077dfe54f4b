#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! remesa: a payout reconciliation engine for self-custody payment processors.
//!
//! ## What you implement
//! - [`ChainSource`]: transaction lookup + (re)broadcast against your node.
//! - [`WalletHooks`]: destination tracking and audit labels in your wallet.
//! - [`PayoutStore`]: persistence for payout rows (SQLite impl included).
//! - An event feed that turns your node's notifications into
//!   [`events::ReconciliationEvent`]s.
//!
//! ## What the engine does
//! - Routes each payment method to the one [`PayoutHandler`] that claims it.
//! - On a new relevant transaction, matches destinations and exact amounts
//!   against `AwaitingPayment` payouts and promotes them to `InProgress`.
//! - On every event, re-checks candidate transactions: prunes dropped or
//!   rejected ones, rebroadcasts the rest, completes payouts at their
//!   confirmation threshold, and reverts to `AwaitingPayment` when every
//!   candidate dies.
//! - Persists rail-tagged proof blobs, writing only when the bytes change.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use remesa::prelude::*;
//! use remesa::events::ReconciliationEvent;
//! use remesa::onchain::RailConfig;
//! use std::sync::Arc;
//!
//! async fn run(
//!     store: impl PayoutStore + 'static,
//!     chain: impl ChainSource + 'static,
//!     wallet: impl WalletHooks + 'static,
//! ) {
//!     let handler = OnChainPayoutHandler::new(
//!         RailConfig::new("BTC", bitcoin::Network::Bitcoin),
//!         store,
//!         chain,
//!         wallet,
//!     );
//!     let mut registry = HandlerRegistry::new();
//!     registry.register(Arc::new(handler));
//!
//!     // Feed events from your node's notification stream:
//!     registry.dispatch(&ReconciliationEvent::NewChainTip).await;
//! }
//! ```
/// Payout rows, lifecycle states, and rail identifiers.
pub mod payout;

/// Claim destination variants and the on-chain resolver.
pub mod destination;

/// Rail-tagged proof codec with write-suppressed persistence.
pub mod proof;

/// Abstract chain query/broadcast contract.
pub mod chain_source;

/// Wallet callbacks: destination tracking and audit labels.
pub mod hooks;

/// Events delivered by the reconciliation scheduler.
pub mod events;

/// The capability interface every settlement rail implements.
pub mod handler;

/// CanHandle-based handler routing and event dispatch.
pub mod registry;

/// On-chain (UTXO) rail handler and its reconciliation passes.
pub mod onchain;

/// Account-based rail handler (node-delegated validation).
pub mod account;

/// Persistence layer (trait and SQLite implementation).
pub mod store;

// Public re-exports
pub use chain_source::ChainSource;
pub use handler::PayoutHandler;
pub use hooks::WalletHooks;
pub use onchain::OnChainPayoutHandler;
pub use registry::HandlerRegistry;
#[cfg(feature = "store-sqlite")]
pub use store::sqlite_store::SqliteStore;
pub use store::PayoutStore;

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::payout::{PaymentMethodId, Payout, PayoutState};
    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
    pub use crate::{
        ChainSource, HandlerRegistry, OnChainPayoutHandler, PayoutHandler, PayoutStore,
        WalletHooks,
    };
}
