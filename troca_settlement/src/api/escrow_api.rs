use std::fmt::Debug;

use log::*;

use crate::{
    api::{errors::SettlementApiError, MAX_CAS_RETRIES},
    db_types::{Escrow, EscrowStatus, PaymentStatus, Trade, TradeId},
    events::{EventProducers, TradeSettledEvent},
    traits::{SettlementDatabase, SettlementDbError},
};

/// `EscrowApi` owns the custody state machine for a trade: `Pending → Locked → {Released | Refunded}`.
///
/// Every mutating operation re-validates its preconditions against freshly-read state inside the backend — the
/// reconciler, the scheduled poller and a human clicking "release" all race against each other, and none of them can
/// be trusted to have seen the latest state.
pub struct EscrowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for EscrowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowApi")
    }
}

impl<B> EscrowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> EscrowApi<B>
where B: SettlementDatabase
{
    /// Locks the seller's asset into escrow. Requires the escrow to be `Pending`; locking twice is an error, not a
    /// no-op, precisely so that double-lock bugs surface instead of hiding.
    pub async fn lock_funds(&self, trade_id: &TradeId) -> Result<Escrow, SettlementApiError> {
        let escrow = self.db.lock_escrow(trade_id).await?;
        info!("🔒️ Funds for trade [{trade_id}] are held in escrow");
        Ok(escrow)
    }

    /// Releases escrowed funds to the buyer. Requires escrow `Locked` **and** payment `Completed`; both are checked
    /// in the same repository transaction that performs the two-row write (escrow → `Released`, trade →
    /// `ReleasingCrypto`), so a partially-released pair cannot exist.
    pub async fn release_funds(&self, trade_id: &TradeId) -> Result<(Escrow, Trade), SettlementApiError> {
        for attempt in 1..=MAX_CAS_RETRIES {
            match self.db.release_escrow(trade_id).await {
                Ok((escrow, trade)) => {
                    info!("🔓️ Funds for trade [{trade_id}] released; asset transfer is in flight");
                    return Ok((escrow, trade));
                },
                Err(e) if e.is_retryable() => {
                    warn!("🔓️ Release for [{trade_id}] lost a race (attempt {attempt}). Re-reading and retrying.");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(SettlementApiError::RetriesExhausted { trade_id: trade_id.clone(), attempts: MAX_CAS_RETRIES })
    }

    /// Returns escrowed funds to the seller and cancels the trade, atomically. Allowed while the escrow is `Pending`
    /// or `Locked` and the trade has not yet entered asset transfer.
    pub async fn refund_funds(&self, trade_id: &TradeId, reason: &str) -> Result<(Escrow, Trade), SettlementApiError> {
        for attempt in 1..=MAX_CAS_RETRIES {
            match self.db.refund_escrow(trade_id, reason).await {
                Ok((escrow, trade)) => {
                    info!("↩️ Trade [{trade_id}] refunded and cancelled: {reason}");
                    self.call_trade_settled_hook(&trade).await;
                    return Ok((escrow, trade));
                },
                Err(e) if e.is_retryable() => {
                    warn!("↩️ Refund for [{trade_id}] lost a race (attempt {attempt}). Re-reading and retrying.");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(SettlementApiError::RetriesExhausted { trade_id: trade_id.clone(), attempts: MAX_CAS_RETRIES })
    }

    /// Read-only mirror of the `release_funds` guard. Never errors for a missing record and never mutates anything;
    /// callers use it to avoid issuing calls doomed to fail.
    pub async fn can_release(&self, trade_id: &TradeId) -> Result<bool, SettlementApiError> {
        let escrow = match self.db.fetch_escrow(trade_id).await? {
            Some(e) => e,
            None => return Ok(false),
        };
        let payment = match self.db.fetch_payment(trade_id).await? {
            Some(p) => p,
            None => return Ok(false),
        };
        Ok(escrow.status == EscrowStatus::Locked && payment.status == PaymentStatus::Completed)
    }

    /// Read-only mirror of the `refund_funds` guard.
    pub async fn can_refund(&self, trade_id: &TradeId) -> Result<bool, SettlementApiError> {
        let escrow = match self.db.fetch_escrow(trade_id).await? {
            Some(e) => e,
            None => return Ok(false),
        };
        let trade = match self.db.fetch_trade(trade_id).await? {
            Some(t) => t,
            None => return Ok(false),
        };
        Ok(!escrow.status.is_terminal() && trade.status.is_refundable())
    }

    /// Read projection of the escrow row.
    pub async fn escrow_status(&self, trade_id: &TradeId) -> Result<Escrow, SettlementApiError> {
        self.db
            .fetch_escrow(trade_id)
            .await?
            .ok_or_else(|| SettlementDbError::EscrowNotFound(trade_id.clone()).into())
    }

    async fn call_trade_settled_hook(&self, trade: &Trade) {
        for emitter in &self.producers.trade_settled_producer {
            debug!("🔄️📦️ Notifying trade-settled hook subscribers");
            let event = TradeSettledEvent::new(trade.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
