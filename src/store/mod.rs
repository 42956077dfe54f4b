//! Persistence interfaces and implementations for payout rows.
//!
//! Reconciliation passes read a fresh snapshot at the start of every pass
//! and commit their mutations as one batch at the end; implementations must
//! make the batch atomic. Nothing here interprets proof blobs.
use crate::payout::{PaymentMethodId, Payout, PayoutState};
use async_trait::async_trait;

/// Storage contract for payout rows.
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Insert a freshly approved payout (state `AwaitingPayment`).
    async fn create_payout(&self, payout: Payout) -> anyhow::Result<()>;

    /// Fetch one payout by id.
    async fn get_payout(&self, id: &str) -> anyhow::Result<Option<Payout>>;

    /// All payouts on `payment_method` currently in `state`.
    async fn payouts_by_state(
        &self,
        payment_method: &PaymentMethodId,
        state: PayoutState,
    ) -> anyhow::Result<Vec<Payout>>;

    /// Persist a batch of mutated payouts atomically.
    async fn update_payouts(&self, payouts: &[Payout]) -> anyhow::Result<()>;
}

// submodules / concrete stores live here
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
