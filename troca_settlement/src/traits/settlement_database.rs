use chrono::{DateTime, Utc};
use thiserror::Error;

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
    },
    traits::{CryptoVolume, PaymentConfirmation, RatingStats},
};

/// This trait defines the storage behaviour backing the settlement core.
///
/// This behaviour includes:
/// * Creating trades together with their escrow record, atomically.
/// * Compare-and-set status transitions for trades, escrows and payments.
/// * The atomic two-row writes behind escrow release and refund.
/// * The aggregate queries the reputation engine derives trust scores from.
///
/// Implementations must make every transition self-guarding: "set status = X where status = Y" semantics, with the
/// loser of a race receiving an error rather than silently overwriting. The engine runs as multiple stateless
/// instances, so in-process locks are worthless here; the database is the only arbiter.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    //----------------------------------------- Trades ----------------------------------------------------------------

    /// Stores a new trade and its escrow record in a single atomic transaction. Both start out `Pending`.
    async fn insert_trade(&self, trade: NewTrade) -> Result<Trade, SettlementDbError>;

    async fn fetch_trade(&self, id: &TradeId) -> Result<Option<Trade>, SettlementDbError>;

    /// Conditionally moves a trade from one of `from` to `to`.
    ///
    /// Fails with [`SettlementDbError::TradeNotFound`] if the trade does not exist, and with
    /// [`SettlementDbError::InvalidTradeState`] if its current status is not in `from` — including when it is already
    /// `to`. A double application is surfaced, never swallowed.
    async fn update_trade_status(
        &self,
        id: &TradeId,
        from: &[TradeStatus],
        to: TradeStatus,
    ) -> Result<Trade, SettlementDbError>;

    //----------------------------------------- Escrow ----------------------------------------------------------------

    async fn fetch_escrow(&self, trade_id: &TradeId) -> Result<Option<Escrow>, SettlementDbError>;

    /// Escrow `Pending` → `Locked`, setting `locked_at`.
    async fn lock_escrow(&self, trade_id: &TradeId) -> Result<Escrow, SettlementDbError>;

    /// Escrow `Locked` → `Released` and trade → `ReleasingCrypto`, written as one transaction.
    ///
    /// The payment must be `Completed`; this is re-checked inside the same transaction as the writes, so a caller's
    /// stale read can never release unpaid funds. Fails with [`SettlementDbError::PaymentNotConfirmed`] otherwise.
    async fn release_escrow(&self, trade_id: &TradeId) -> Result<(Escrow, Trade), SettlementDbError>;

    /// Escrow {`Pending`,`Locked`} → `Refunded` (with `reason`) and trade → `Cancelled`, as one transaction.
    async fn refund_escrow(&self, trade_id: &TradeId, reason: &str) -> Result<(Escrow, Trade), SettlementDbError>;

    //----------------------------------------- Payments --------------------------------------------------------------

    /// Stores the payment record for a trade with status `Pending`. The gateway-assigned external id is written here
    /// exactly once and never reassigned.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, SettlementDbError>;

    async fn fetch_payment(&self, trade_id: &TradeId) -> Result<Option<Payment>, SettlementDbError>;

    async fn fetch_payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>, SettlementDbError>;

    /// Compare-and-set confirmation: moves the payment to `Completed` only if it is not already `Completed`.
    ///
    /// Whichever of the poll and webhook paths gets here first wins and receives `transitioned == true`; the other
    /// observer gets the already-confirmed record back with `transitioned == false`.
    async fn confirm_payment(
        &self,
        external_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentConfirmation, SettlementDbError>;

    /// Records an intermediate (non-conclusive) gateway status. Completed payments are never downgraded.
    async fn set_payment_status(&self, external_id: &str, status: PaymentStatus) -> Result<Payment, SettlementDbError>;

    //----------------------------------------- Ratings & reputation --------------------------------------------------

    /// Stores a rating. At most one rating per rater per trade; violations fail with
    /// [`SettlementDbError::RatingAlreadyExists`].
    async fn insert_rating(&self, rating: NewRating, rated_id: &str) -> Result<Rating, SettlementDbError>;

    async fn rating_stats_for_user(&self, user_id: &str) -> Result<RatingStats, SettlementDbError>;

    /// Trades the user took part in (either side) that reached `Completed`.
    async fn count_completed_trades(&self, user_id: &str) -> Result<i64, SettlementDbError>;

    /// Trades the user took part in that count for reputation: `Completed`, `Cancelled` or `Disputed`.
    async fn count_terminal_trades(&self, user_id: &str) -> Result<i64, SettlementDbError>;

    async fn upsert_reputation(
        &self,
        reputation: crate::db_types::UserReputation,
    ) -> Result<crate::db_types::UserReputation, SettlementDbError>;

    async fn fetch_reputation(
        &self,
        user_id: &str,
    ) -> Result<Option<crate::db_types::UserReputation>, SettlementDbError>;

    async fn top_traders(&self, limit: i64) -> Result<Vec<crate::db_types::UserReputation>, SettlementDbError>;

    /// Completed-trade fiat volume per cryptocurrency, largest first.
    async fn volume_by_crypto_for_user(&self, user_id: &str) -> Result<Vec<CryptoVolume>, SettlementDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested trade {0} does not exist")]
    TradeNotFound(TradeId),
    #[error("No escrow record exists for trade {0}")]
    EscrowNotFound(TradeId),
    #[error("No payment record exists for trade {0}")]
    PaymentNotFoundForTrade(TradeId),
    #[error("No payment record exists with external id {0}")]
    PaymentNotFound(String),
    #[error("Cannot insert trade, since it already exists with id {0}")]
    TradeAlreadyExists(TradeId),
    #[error("Cannot insert payment for trade {0}, since one already exists")]
    PaymentAlreadyExists(TradeId),
    #[error("A rating for trade {trade_id} by {rater_id} already exists")]
    RatingAlreadyExists { trade_id: TradeId, rater_id: String },
    #[error("Trade {trade_id} is {actual}, but this operation requires one of [{}]", .expected.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    InvalidTradeState { trade_id: TradeId, expected: Vec<TradeStatus>, actual: TradeStatus },
    #[error("Escrow for trade {trade_id} is {actual}, but this operation requires {expected}")]
    InvalidEscrowState { trade_id: TradeId, expected: EscrowStatus, actual: EscrowStatus },
    #[error("Funds for trade {trade_id} cannot be released: the payment is {status}, not Completed")]
    PaymentNotConfirmed { trade_id: TradeId, status: PaymentStatus },
    #[error("A concurrent writer updated {0} first; re-read and retry")]
    PreconditionFailed(TradeId),
}

impl SettlementDbError {
    /// `true` for the one failure mode a caller may safely retry: a lost compare-and-set race.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementDbError::PreconditionFailed(_))
    }
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDbError::DatabaseError(e.to_string())
    }
}
