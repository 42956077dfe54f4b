//! Embedded SQLite payout store.
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::{path::PathBuf, str::FromStr};
use tokio::task;

use crate::payout::{PaymentMethodId, Payout, PayoutState};
use crate::store::PayoutStore;

/// One row per payout:
///   payouts(id TEXT PRIMARY KEY, pull_payment_id, payment_method,
///           destination, crypto_amount, min_confirmations, state, proof BLOB)
///
/// `crypto_amount` is stored as its decimal string to stay exact;
/// `payment_method` and `state` use their stable string forms.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS payouts (
                id                TEXT PRIMARY KEY,
                pull_payment_id   TEXT NOT NULL,
                payment_method    TEXT NOT NULL,
                destination       TEXT,
                crypto_amount     TEXT NOT NULL,
                min_confirmations INTEGER NOT NULL,
                state             TEXT NOT NULL,
                proof             BLOB
            );
            CREATE INDEX IF NOT EXISTS payouts_by_method_state
                ON payouts(payment_method, state);
            "#,
        )?;
        Ok(Self { path })
    }

    fn read_payout(row: &Row<'_>) -> anyhow::Result<Payout> {
        let payment_method: String = row.get(2)?;
        let crypto_amount: String = row.get(4)?;
        let state: String = row.get(6)?;
        Ok(Payout {
            id: row.get(0)?,
            pull_payment_id: row.get(1)?,
            payment_method: payment_method.parse()?,
            destination: row.get(3)?,
            crypto_amount: Decimal::from_str(&crypto_amount)
                .with_context(|| format!("parse crypto_amount {crypto_amount}"))?,
            min_confirmations: row.get(5)?,
            state: PayoutState::from_str(&state)?,
            proof: row.get(7)?,
        })
    }

    fn write_payout(conn: &Connection, payout: &Payout) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO payouts(id, pull_payment_id, payment_method, destination,
                                 crypto_amount, min_confirmations, state, proof)
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(id) DO UPDATE SET
                 destination=excluded.destination,
                 state=excluded.state,
                 proof=excluded.proof",
            params![
                payout.id,
                payout.pull_payment_id,
                payout.payment_method.to_string(),
                payout.destination,
                payout.crypto_amount.to_string(),
                payout.min_confirmations,
                payout.state.as_str(),
                payout.proof,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl PayoutStore for SqliteStore {
    async fn create_payout(&self, payout: Payout) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            Self::write_payout(&conn, &payout)
        })
        .await?
    }

    async fn get_payout(&self, id: &str) -> anyhow::Result<Option<Payout>> {
        let path = self.path.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let mut stmt = conn.prepare(
                "SELECT id, pull_payment_id, payment_method, destination,
                        crypto_amount, min_confirmations, state, proof
                 FROM payouts WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(Self::read_payout(row)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    async fn payouts_by_state(
        &self,
        payment_method: &PaymentMethodId,
        state: PayoutState,
    ) -> anyhow::Result<Vec<Payout>> {
        let path = self.path.clone();
        let payment_method = payment_method.to_string();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let mut stmt = conn.prepare(
                "SELECT id, pull_payment_id, payment_method, destination,
                        crypto_amount, min_confirmations, state, proof
                 FROM payouts WHERE payment_method = ?1 AND state = ?2
                 ORDER BY id",
            )?;
            let mut rows = stmt.query(params![payment_method, state.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(Self::read_payout(row)?);
            }
            Ok(out)
        })
        .await?
    }

    async fn update_payouts(&self, payouts: &[Payout]) -> anyhow::Result<()> {
        if payouts.is_empty() {
            return Ok(());
        }
        let path = self.path.clone();
        let payouts = payouts.to_vec();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let tx = conn.unchecked_transaction()?;
            for payout in &payouts {
                Self::write_payout(&conn, payout)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }
}
