use pix_gateway::PixApiError;
use thiserror::Error;
use troca_common::FiatAmount;

use crate::{db_types::TradeId, traits::SettlementDbError};

#[derive(Debug, Clone, Error)]
pub enum SettlementApiError {
    #[error(transparent)]
    Db(#[from] SettlementDbError),
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] PixApiError),
    #[error("The gateway returned a status outside the mapping table: {0}")]
    UnknownGatewayStatus(String),
    #[error("Invalid trade amount: {0}")]
    InvalidTradeAmount(FiatAmount),
    #[error("Invalid rating score {0}. Scores run from 1 to 5")]
    InvalidRatingScore(i64),
    #[error("User {user_id} is not a participant in trade {trade_id}")]
    NotAParticipant { trade_id: TradeId, user_id: String },
    #[error("Gave up on trade {trade_id} after {attempts} attempts; every try lost a concurrent-update race")]
    RetriesExhausted { trade_id: TradeId, attempts: usize },
}

impl SettlementApiError {
    /// Distinguishes "not allowed yet" (business state, show the user an actionable message) from "system error"
    /// (infrastructure, show a retry prompt).
    pub fn is_business_rule(&self) -> bool {
        match self {
            SettlementApiError::Db(e) => matches!(
                e,
                SettlementDbError::InvalidTradeState { .. } |
                    SettlementDbError::InvalidEscrowState { .. } |
                    SettlementDbError::PaymentNotConfirmed { .. } |
                    SettlementDbError::TradeNotFound(_) |
                    SettlementDbError::EscrowNotFound(_) |
                    SettlementDbError::PaymentNotFound(_) |
                    SettlementDbError::PaymentNotFoundForTrade(_) |
                    SettlementDbError::RatingAlreadyExists { .. }
            ),
            SettlementApiError::InvalidTradeAmount(_) |
            SettlementApiError::InvalidRatingScore(_) |
            SettlementApiError::NotAParticipant { .. } => true,
            _ => false,
        }
    }
}
