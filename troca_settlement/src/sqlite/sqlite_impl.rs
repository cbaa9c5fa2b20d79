//! `SqliteDatabase` is a concrete implementation of a settlement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the [`crate::traits`] module.
//! The multi-row guarantees (trade+escrow creation, release, refund) are plain SQL transactions; the per-row
//! transition guarantees are conditional updates, so the engine stays correct with any number of stateless instances
//! pointed at the same file.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::db::{db_url, escrows, new_pool, payments, reputation, trades};
use crate::{
    db_types::{
        Escrow,
        EscrowStatus,
        NewPayment,
        NewRating,
        NewTrade,
        Payment,
        PaymentStatus,
        Rating,
        Trade,
        TradeId,
        TradeStatus,
        UserReputation,
    },
    traits::{CryptoVolume, PaymentConfirmation, RatingStats, SettlementDatabase, SettlementDbError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool using the URL from `TROCA_DATABASE_URL` (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, SettlementDbError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementDbError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_trade(&self, trade: NewTrade) -> Result<Trade, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let trade = trades::insert_trade(trade, &mut tx).await?;
        escrows::insert_escrow(&trade.id, &mut tx).await?;
        tx.commit().await?;
        Ok(trade)
    }

    async fn fetch_trade(&self, id: &TradeId) -> Result<Option<Trade>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::fetch_trade(id, &mut conn).await?)
    }

    async fn update_trade_status(
        &self,
        id: &TradeId,
        from: &[TradeStatus],
        to: TradeStatus,
    ) -> Result<Trade, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        trades::update_status_cas(id, from, to, &mut conn).await
    }

    async fn fetch_escrow(&self, trade_id: &TradeId) -> Result<Option<Escrow>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(escrows::fetch_escrow(trade_id, &mut conn).await?)
    }

    async fn lock_escrow(&self, trade_id: &TradeId) -> Result<Escrow, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        escrows::lock_escrow(trade_id, &mut conn).await
    }

    async fn release_escrow(&self, trade_id: &TradeId) -> Result<(Escrow, Trade), SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        // Preconditions are re-validated inside the transaction; never trust the caller's reads.
        let escrow = escrows::fetch_escrow(trade_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::EscrowNotFound(trade_id.clone()))?;
        if escrow.status != EscrowStatus::Locked {
            return Err(SettlementDbError::InvalidEscrowState {
                trade_id: trade_id.clone(),
                expected: EscrowStatus::Locked,
                actual: escrow.status,
            });
        }
        let payment = payments::fetch_payment(trade_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::PaymentNotFoundForTrade(trade_id.clone()))?;
        if payment.status != PaymentStatus::Completed {
            return Err(SettlementDbError::PaymentNotConfirmed { trade_id: trade_id.clone(), status: payment.status });
        }
        // The guards above passed, so a conditional-update miss here means a concurrent writer beat us to it.
        let escrow = escrows::release_escrow(trade_id, &mut tx).await.map_err(|e| as_race(e, trade_id))?;
        let trade = trades::update_status_cas(
            trade_id,
            &[TradeStatus::WaitingPayment, TradeStatus::PaymentConfirmed, TradeStatus::Disputed],
            TradeStatus::ReleasingCrypto,
            &mut tx,
        )
        .await
        .map_err(|e| as_race(e, trade_id))?;
        tx.commit().await?;
        Ok((escrow, trade))
    }

    async fn refund_escrow(&self, trade_id: &TradeId, reason: &str) -> Result<(Escrow, Trade), SettlementDbError> {
        const REFUNDABLE: [TradeStatus; 5] = [
            TradeStatus::Pending,
            TradeStatus::Accepted,
            TradeStatus::WaitingPayment,
            TradeStatus::PaymentConfirmed,
            TradeStatus::Disputed,
        ];
        let mut tx = self.pool.begin().await?;
        let escrow = escrows::fetch_escrow(trade_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::EscrowNotFound(trade_id.clone()))?;
        if escrow.status.is_terminal() {
            return Err(SettlementDbError::InvalidEscrowState {
                trade_id: trade_id.clone(),
                expected: EscrowStatus::Locked,
                actual: escrow.status,
            });
        }
        let trade = trades::fetch_trade(trade_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::TradeNotFound(trade_id.clone()))?;
        if !trade.status.is_refundable() {
            return Err(SettlementDbError::InvalidTradeState {
                trade_id: trade_id.clone(),
                expected: REFUNDABLE.to_vec(),
                actual: trade.status,
            });
        }
        let escrow = escrows::refund_escrow(trade_id, reason, &mut tx).await.map_err(|e| as_race(e, trade_id))?;
        let trade = trades::update_status_cas(trade_id, &REFUNDABLE, TradeStatus::Cancelled, &mut tx)
            .await
            .map_err(|e| as_race(e, trade_id))?;
        tx.commit().await?;
        Ok((escrow, trade))
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::insert_payment(payment, &mut conn).await
    }

    async fn fetch_payment(&self, trade_id: &TradeId) -> Result<Option<Payment>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(trade_id, &mut conn).await?)
    }

    async fn fetch_payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_by_external_id(external_id, &mut conn).await?)
    }

    async fn confirm_payment(
        &self,
        external_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentConfirmation, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::confirm_payment(external_id, paid_at, &mut conn).await
    }

    async fn set_payment_status(&self, external_id: &str, status: PaymentStatus) -> Result<Payment, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::set_payment_status(external_id, status, &mut conn).await
    }

    async fn insert_rating(&self, rating: NewRating, rated_id: &str) -> Result<Rating, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        reputation::insert_rating(rating, rated_id, &mut conn).await
    }

    async fn rating_stats_for_user(&self, user_id: &str) -> Result<RatingStats, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::rating_stats_for_user(user_id, &mut conn).await?)
    }

    async fn count_completed_trades(&self, user_id: &str) -> Result<i64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::count_completed_trades(user_id, &mut conn).await?)
    }

    async fn count_terminal_trades(&self, user_id: &str) -> Result<i64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::count_terminal_trades(user_id, &mut conn).await?)
    }

    async fn upsert_reputation(&self, rep: UserReputation) -> Result<UserReputation, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::upsert_reputation(rep, &mut conn).await?)
    }

    async fn fetch_reputation(&self, user_id: &str) -> Result<Option<UserReputation>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::fetch_reputation(user_id, &mut conn).await?)
    }

    async fn top_traders(&self, limit: i64) -> Result<Vec<UserReputation>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::top_traders(limit, &mut conn).await?)
    }

    async fn volume_by_crypto_for_user(&self, user_id: &str) -> Result<Vec<CryptoVolume>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reputation::volume_by_crypto_for_user(user_id, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}

/// A conditional update that misses *after* its precondition was read successfully in the same transaction lost a
/// race with a concurrent writer, which callers may retry. Anything else passes through untouched.
fn as_race(e: SettlementDbError, trade_id: &TradeId) -> SettlementDbError {
    match e {
        SettlementDbError::InvalidEscrowState { .. } | SettlementDbError::InvalidTradeState { .. } => {
            SettlementDbError::PreconditionFailed(trade_id.clone())
        },
        e => e,
    }
}
