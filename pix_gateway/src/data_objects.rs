use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use troca_common::FiatAmount;

/// The webhook `action` value that signals a charge may have changed state. Everything else is noise that must be
/// acknowledged but ignored.
pub const WEBHOOK_ACTION_UPDATED: &str = "payment.updated";

//--------------------------------------      NewCharge       ---------------------------------------------------------
/// A request to register a payment intent with the provider. The REST body is assembled by hand in `api.rs` to match
/// the provider's shape, so this stays a plain struct.
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub amount: FiatAmount,
    pub description: String,
    pub payer: ChargePayer,
    /// Our trade id, echoed back by the provider. Useful for support and audits; never used for reconciliation.
    pub external_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargePayer {
    pub email: String,
    /// CPF/CNPJ, when the payer has provided one.
    pub document: Option<String>,
}

//--------------------------------------        Charge        ---------------------------------------------------------
/// A charge as reported by the provider. `status` carries the provider's own vocabulary; translating it into the
/// engine's payment states is the reconciler's job, not this crate's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub external_id: String,
    pub status: String,
    /// Machine-readable PIX payload (copy-and-paste code).
    pub qr_code: String,
    /// Base64-encoded QR image for display.
    pub qr_code_base64: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

//--------------------------------------   WebhookNotification   ------------------------------------------------------
/// The provider's callback body. Only `{type: "payment", action: "payment.updated"}` notifications are acted on, and
/// even then the embedded data is only used to learn *which* charge to re-poll, never what its status is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub id: String,
}

impl WebhookNotification {
    pub fn is_payment_update(&self) -> bool {
        self.kind == "payment" && self.action == WEBHOOK_ACTION_UPDATED
    }

    pub fn payment_update(charge_id: &str) -> Self {
        Self {
            kind: "payment".to_string(),
            action: WEBHOOK_ACTION_UPDATED.to_string(),
            data: WebhookData { id: charge_id.to_string() },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payment_update_detection() {
        let n = WebhookNotification::payment_update("12345");
        assert!(n.is_payment_update());
        let created = WebhookNotification { action: "payment.created".to_string(), ..n.clone() };
        assert!(!created.is_payment_update());
        let wrong_kind = WebhookNotification { kind: "plan".to_string(), ..n };
        assert!(!wrong_kind.is_payment_update());
    }

    #[test]
    fn webhook_deserializes_provider_shape() {
        let body = r#"{"type": "payment", "action": "payment.updated", "data": {"id": "987654"}}"#;
        let n: WebhookNotification = serde_json::from_str(body).unwrap();
        assert!(n.is_payment_update());
        assert_eq!(n.data.id, "987654");
    }
}
