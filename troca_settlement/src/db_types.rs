//! Record and status types shared between the repository traits, the SQLite backend and the public APIs.
//!
//! Every status enum converts to and from its string representation *exhaustively*: an unrecognised string is an
//! error, never a silent default. Masking an unknown state as "still pending" is exactly the class of bug the
//! reconciler exists to prevent.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use troca_common::{CryptoAmount, FiatAmount};

#[derive(Debug, Clone, Error)]
#[error("Invalid status string: {0}")]
pub struct StatusConversionError(pub String);

//--------------------------------------        TradeId        --------------------------------------------------------
/// The marketplace-assigned identifier of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TradeId(pub String);

impl FromStr for TradeId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TradeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TradeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TradeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      TradeStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TradeStatus {
    /// The trade has been proposed but not yet accepted by the seller.
    Pending,
    /// Both parties have agreed to the trade; escrow exists but holds nothing yet.
    Accepted,
    /// A payment charge has been issued and the buyer has been shown the payment instructions.
    WaitingPayment,
    /// The fiat leg has been confirmed by the gateway.
    PaymentConfirmed,
    /// Escrow has been released; the asset transfer to the buyer is in flight.
    ReleasingCrypto,
    /// The asset has been delivered. Terminal.
    Completed,
    /// The trade was refunded or abandoned. Terminal.
    Cancelled,
    /// A party raised a dispute. Counts against the success rate; still refundable.
    Disputed,
}

impl TradeStatus {
    /// Statuses from which no further transition is defined.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Completed | TradeStatus::Cancelled)
    }

    /// Statuses that count in the success-rate denominator.
    pub fn counts_for_reputation(&self) -> bool {
        matches!(self, TradeStatus::Completed | TradeStatus::Cancelled | TradeStatus::Disputed)
    }

    /// Statuses from which a refund may still be issued.
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            TradeStatus::Pending |
                TradeStatus::Accepted |
                TradeStatus::WaitingPayment |
                TradeStatus::PaymentConfirmed |
                TradeStatus::Disputed
        )
    }
}

impl Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeStatus::Pending => "Pending",
            TradeStatus::Accepted => "Accepted",
            TradeStatus::WaitingPayment => "WaitingPayment",
            TradeStatus::PaymentConfirmed => "PaymentConfirmed",
            TradeStatus::ReleasingCrypto => "ReleasingCrypto",
            TradeStatus::Completed => "Completed",
            TradeStatus::Cancelled => "Cancelled",
            TradeStatus::Disputed => "Disputed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TradeStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "WaitingPayment" => Ok(Self::WaitingPayment),
            "PaymentConfirmed" => Ok(Self::PaymentConfirmed),
            "ReleasingCrypto" => Ok(Self::ReleasingCrypto),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Disputed" => Ok(Self::Disputed),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------     EscrowStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Escrow record exists; the seller's asset has not been locked yet.
    Pending,
    /// The asset is held by the platform, awaiting payment confirmation.
    Locked,
    /// The asset has been released to the buyer. Terminal.
    Released,
    /// The asset has been returned to the seller. Terminal.
    Refunded,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

impl Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscrowStatus::Pending => "Pending",
            EscrowStatus::Locked => "Locked",
            EscrowStatus::Released => "Released",
            EscrowStatus::Refunded => "Refunded",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EscrowStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Locked" => Ok(Self::Locked),
            "Released" => Ok(Self::Released),
            "Refunded" => Ok(Self::Refunded),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------     PaymentStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Processing => "Processing",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        Trade          --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub buyer_id: String,
    pub seller_id: String,
    pub cryptocurrency: String,
    pub fiat_amount: FiatAmount,
    pub crypto_amount: CryptoAmount,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTrade {
    pub id: TradeId,
    pub buyer_id: String,
    pub seller_id: String,
    pub cryptocurrency: String,
    pub fiat_amount: FiatAmount,
    pub crypto_amount: CryptoAmount,
}

impl NewTrade {
    pub fn new(
        id: TradeId,
        buyer_id: impl Into<String>,
        seller_id: impl Into<String>,
        cryptocurrency: impl Into<String>,
        fiat_amount: FiatAmount,
        crypto_amount: CryptoAmount,
    ) -> Self {
        Self {
            id,
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
            cryptocurrency: cryptocurrency.into(),
            fiat_amount,
            crypto_amount,
        }
    }
}

//--------------------------------------        Escrow         --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Escrow {
    pub id: i64,
    pub trade_id: TradeId,
    pub status: EscrowStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Payment        --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub trade_id: TradeId,
    /// Assigned by the gateway exactly once at creation, never reassigned.
    pub external_payment_id: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub trade_id: TradeId,
    pub external_payment_id: String,
}

//--------------------------------------        Rating         --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub trade_id: TradeId,
    pub rater_id: String,
    pub rated_id: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub trade_id: TradeId,
    pub rater_id: String,
    pub score: i64,
}

impl NewRating {
    pub fn new(trade_id: TradeId, rater_id: impl Into<String>, score: i64) -> Self {
        Self { trade_id, rater_id: rater_id.into(), score }
    }
}

//--------------------------------------    ReputationLevel    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
pub enum ReputationLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ReputationLevel {
    /// Tier table, checked top-down so that a user clearing a higher bar is never shunted into a lower tier.
    pub fn classify(completed_trades: i64, average_score: f64, success_rate: f64) -> Self {
        if completed_trades >= 50 && average_score >= 4.5 && success_rate >= 0.95 {
            ReputationLevel::Expert
        } else if completed_trades >= 20 && average_score >= 4.0 && success_rate >= 0.90 {
            ReputationLevel::Advanced
        } else if completed_trades >= 5 && average_score >= 3.5 && success_rate >= 0.80 {
            ReputationLevel::Intermediate
        } else {
            ReputationLevel::Beginner
        }
    }
}

impl Display for ReputationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReputationLevel::Beginner => "Beginner",
            ReputationLevel::Intermediate => "Intermediate",
            ReputationLevel::Advanced => "Advanced",
            ReputationLevel::Expert => "Expert",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ReputationLevel {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Self::Beginner),
            "Intermediate" => Ok(Self::Intermediate),
            "Advanced" => Ok(Self::Advanced),
            "Expert" => Ok(Self::Expert),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------    UserReputation     --------------------------------------------------------
/// A materialized view over a user's trade and rating history. Never a source of truth; always rebuilt wholesale by
/// the reputation engine.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: String,
    pub total_ratings: i64,
    pub average_score: f64,
    pub completed_trades: i64,
    pub success_rate: f64,
    pub level: ReputationLevel,
    pub updated_at: DateTime<Utc>,
}
