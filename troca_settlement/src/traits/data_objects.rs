use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use troca_common::FiatAmount;

use crate::db_types::Payment;

/// Aggregate over the ratings received by a user.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingStats {
    pub total: i64,
    /// Mean score, 0.0 when the user has no ratings.
    pub average: f64,
}

/// Result of the compare-and-set payment confirmation.
///
/// `transitioned` is true only for the single observer (poll or webhook) whose write actually moved the payment to
/// `Completed`. Everyone else sees the already-confirmed record with `transitioned == false` and must not re-trigger
/// downstream release logic.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub payment: Payment,
    pub transitioned: bool,
}

/// Completed-trade volume for one cryptocurrency, as reported by user stats.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CryptoVolume {
    pub cryptocurrency: String,
    pub total_fiat: FiatAmount,
    pub trades: i64,
}
