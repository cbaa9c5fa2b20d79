use std::fmt::Debug;

use log::*;

use crate::{
    api::errors::SettlementApiError,
    db_types::{NewTrade, Trade, TradeId, TradeStatus},
    events::{EventProducers, TradeSettledEvent},
    traits::{SettlementDatabase, SettlementDbError},
};

/// `TradeFlowApi` handles the trade lifecycle around the escrow core: creation (trade + escrow in one transaction),
/// acceptance, disputes, and completion once the asset transfer lands.
pub struct TradeFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for TradeFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TradeFlowApi")
    }
}

impl<B> TradeFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> TradeFlowApi<B>
where B: SettlementDatabase
{
    /// Creates a trade and its escrow record together. Both start `Pending`; the pair either fully exists or not at
    /// all.
    pub async fn create_trade(&self, trade: NewTrade) -> Result<Trade, SettlementApiError> {
        if trade.fiat_amount.value() <= 0 {
            return Err(SettlementApiError::InvalidTradeAmount(trade.fiat_amount));
        }
        let trade = self.db.insert_trade(trade).await?;
        info!("📦️ Trade [{}] created: {} {} for {}", trade.id, trade.crypto_amount, trade.cryptocurrency, trade.fiat_amount);
        Ok(trade)
    }

    /// Seller accepts the proposed trade.
    pub async fn accept_trade(&self, trade_id: &TradeId) -> Result<Trade, SettlementApiError> {
        let trade = self.db.update_trade_status(trade_id, &[TradeStatus::Pending], TradeStatus::Accepted).await?;
        info!("📦️ Trade [{trade_id}] accepted");
        Ok(trade)
    }

    /// A party raises a dispute. The trade starts counting against both success rates immediately, so the
    /// trade-settled hook fires here as well as at resolution.
    pub async fn mark_disputed(&self, trade_id: &TradeId) -> Result<Trade, SettlementApiError> {
        let trade = self
            .db
            .update_trade_status(
                trade_id,
                &[TradeStatus::WaitingPayment, TradeStatus::PaymentConfirmed],
                TradeStatus::Disputed,
            )
            .await?;
        warn!("📦️⚖️ Trade [{trade_id}] is disputed");
        self.call_trade_settled_hook(&trade).await;
        Ok(trade)
    }

    /// Marks the trade `Completed` once the released asset has landed with the buyer, and notifies subscribers so
    /// both participants' reputations get rebuilt.
    pub async fn complete_trade(&self, trade_id: &TradeId) -> Result<Trade, SettlementApiError> {
        let trade =
            self.db.update_trade_status(trade_id, &[TradeStatus::ReleasingCrypto], TradeStatus::Completed).await?;
        info!("📦️✅️ Trade [{trade_id}] completed");
        self.call_trade_settled_hook(&trade).await;
        Ok(trade)
    }

    pub async fn trade(&self, trade_id: &TradeId) -> Result<Trade, SettlementApiError> {
        self.db
            .fetch_trade(trade_id)
            .await?
            .ok_or_else(|| SettlementDbError::TradeNotFound(trade_id.clone()).into())
    }

    async fn call_trade_settled_hook(&self, trade: &Trade) {
        for emitter in &self.producers.trade_settled_producer {
            debug!("📦️📬️ Notifying trade-settled hook subscribers");
            let event = TradeSettledEvent::new(trade.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
