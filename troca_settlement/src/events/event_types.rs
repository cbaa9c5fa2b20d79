use serde::{Deserialize, Serialize};

use crate::db_types::{Payment, Trade};

/// Emitted exactly once per payment, by whichever observer (poll or webhook) won the confirmation write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmedEvent {
    pub payment: Payment,
    pub trade: Trade,
}

impl PaymentConfirmedEvent {
    pub fn new(payment: Payment, trade: Trade) -> Self {
        Self { payment, trade }
    }
}

/// Emitted whenever a trade reaches a reputation-relevant terminal state (`Completed` via the happy path, or
/// `Cancelled` via refund). Subscribers typically recompute reputation for both counterparties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSettledEvent {
    pub trade: Trade,
}

impl TradeSettledEvent {
    pub fn new(trade: Trade) -> Self {
        Self { trade }
    }

    /// The two users whose reputation is stale after this settlement.
    pub fn participants(&self) -> [&str; 2] {
        [self.trade.buyer_id.as_str(), self.trade.seller_id.as_str()]
    }
}
