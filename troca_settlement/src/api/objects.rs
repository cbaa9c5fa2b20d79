use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{PaymentStatus, TradeId, UserReputation},
    traits::CryptoVolume,
};

/// What the buyer is shown after requesting payment instructions: the copy-and-paste PIX payload and the QR image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentArtifact {
    pub trade_id: TradeId,
    pub external_payment_id: String,
    pub qr_code: String,
    pub qr_code_base64: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The reconciler's answer to "has this payment conclusively settled?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResult {
    pub external_payment_id: String,
    pub status: PaymentStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

/// The state change (if any) a webhook notification led to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub trade_id: TradeId,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
}

/// Outcome of webhook ingestion. `processed == false` means the notification was acknowledged and dropped — a shape
/// we don't act on, or a charge we don't own. Gateways retry on errors, so unknown shapes must land here, not in Err.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub processed: bool,
    pub update: Option<TradeUpdate>,
}

impl WebhookOutcome {
    pub fn ignored() -> Self {
        Self { processed: false, update: None }
    }
}

/// A user's reputation together with their completed-trade volume per cryptocurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub reputation: Option<UserReputation>,
    pub volumes: Vec<CryptoVolume>,
}
