use std::fmt::Debug;

use chrono::Utc;
use log::*;
use pix_gateway::{ChargePayer, NewCharge, PixGatewayClient, WebhookNotification};
use troca_common::FiatAmount;

use crate::{
    api::{
        errors::SettlementApiError,
        objects::{PaymentArtifact, PaymentStatusResult, TradeUpdate, WebhookOutcome},
        MAX_CAS_RETRIES,
    },
    db_types::{NewPayment, PaymentStatus, Trade, TradeId, TradeStatus},
    events::{EventProducers, PaymentConfirmedEvent},
    traits::{SettlementDatabase, SettlementDbError},
};

/// Translates the gateway's status vocabulary into the engine's payment states.
///
/// The table is exhaustive and fails closed: a status we have never seen means the gateway changed underneath us,
/// and the one thing we must not do is quietly treat it as "still waiting".
pub fn map_gateway_status(raw: &str) -> Result<PaymentStatus, SettlementApiError> {
    match raw {
        "pending" => Ok(PaymentStatus::Pending),
        "in_process" => Ok(PaymentStatus::Processing),
        "approved" => Ok(PaymentStatus::Completed),
        "rejected" | "cancelled" | "refunded" | "charged_back" => Ok(PaymentStatus::Failed),
        other => Err(SettlementApiError::UnknownGatewayStatus(other.to_string())),
    }
}

/// `ReconcilerApi` bridges the internal trade/payment model to the external fiat gateway.
///
/// Payment completion can be observed twice — once by the scheduled poller, once by the gateway's webhook — and both
/// observations funnel into the same compare-and-set update path, so exactly one of them triggers downstream logic.
pub struct ReconcilerApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for ReconcilerApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi")
    }
}

impl<B, G> ReconcilerApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }
}

impl<B, G> ReconcilerApi<B, G>
where
    B: SettlementDatabase,
    G: PixGatewayClient,
{
    /// Registers a payment intent with the gateway and persists the resulting charge against the trade.
    ///
    /// The gateway call carries a fresh idempotency key (see [`pix_gateway`]), so a network-level retry cannot create
    /// a duplicate charge. The returned artifact is what the buyer is shown to pay out-of-band.
    pub async fn create_payment(
        &self,
        trade_id: &TradeId,
        amount: FiatAmount,
        payer: ChargePayer,
    ) -> Result<PaymentArtifact, SettlementApiError> {
        if amount.value() <= 0 {
            return Err(SettlementApiError::InvalidTradeAmount(amount));
        }
        let trade = self
            .db
            .fetch_trade(trade_id)
            .await?
            .ok_or_else(|| SettlementDbError::TradeNotFound(trade_id.clone()))?;
        if !matches!(trade.status, TradeStatus::Accepted | TradeStatus::WaitingPayment) {
            return Err(SettlementDbError::InvalidTradeState {
                trade_id: trade_id.clone(),
                expected: vec![TradeStatus::Accepted, TradeStatus::WaitingPayment],
                actual: trade.status,
            }
            .into());
        }
        // Check for an existing charge before talking to the gateway. Failing only on the insert below would leave a
        // live, payable QR registered at the provider with no payment row pointing at it.
        if self.db.fetch_payment(trade_id).await?.is_some() {
            return Err(SettlementDbError::PaymentAlreadyExists(trade_id.clone()).into());
        }
        let new_charge = NewCharge {
            amount,
            description: format!("Troca trade {trade_id}"),
            payer,
            external_reference: trade_id.as_str().to_string(),
        };
        let charge = self.gateway.create_charge(new_charge).await?;
        // The external id is written exactly once here; the UNIQUE constraint is the backstop.
        let payment = self
            .db
            .insert_payment(NewPayment { trade_id: trade_id.clone(), external_payment_id: charge.external_id.clone() })
            .await?;
        if trade.status == TradeStatus::Accepted {
            self.db.update_trade_status(trade_id, &[TradeStatus::Accepted], TradeStatus::WaitingPayment).await?;
        }
        debug!("💱️ Charge [{}] issued for trade [{trade_id}], {amount}", payment.external_payment_id);
        Ok(PaymentArtifact {
            trade_id: trade_id.clone(),
            external_payment_id: charge.external_id,
            qr_code: charge.qr_code,
            qr_code_base64: charge.qr_code_base64,
            expires_at: charge.expires_at,
        })
    }

    /// Polls the gateway for the ground-truth charge state and reconciles the internal payment record with it.
    ///
    /// When the charge turns out to be paid, the confirmation write is a compare-and-set: only the observer whose
    /// write actually transitions the payment advances the trade and fires the payment-confirmed hook. Late or
    /// duplicate observers see `is_paid == true` but trigger nothing.
    pub async fn check_payment_status(&self, external_id: &str) -> Result<PaymentStatusResult, SettlementApiError> {
        let charge = self.gateway.get_charge(external_id).await?;
        let status = map_gateway_status(&charge.status)?;
        trace!("💱️ Gateway reports charge [{external_id}] as {} → {status}", charge.status);
        match status {
            PaymentStatus::Completed => {
                let paid_at = charge.paid_at.unwrap_or_else(Utc::now);
                let confirmation = self.db.confirm_payment(external_id, paid_at).await?;
                if confirmation.transitioned {
                    let trade = self.advance_trade_to_confirmed(&confirmation.payment.trade_id).await?;
                    info!("💱️✅️ Payment [{external_id}] confirmed; trade [{}] awaits release", trade.id);
                    self.call_payment_confirmed_hook(confirmation.payment.clone(), trade).await;
                } else {
                    debug!("💱️ Payment [{external_id}] was already confirmed; nothing to do");
                }
                Ok(PaymentStatusResult {
                    external_payment_id: external_id.to_string(),
                    status,
                    is_paid: true,
                    paid_at: confirmation.payment.paid_at.or(Some(paid_at)),
                })
            },
            PaymentStatus::Pending => Ok(PaymentStatusResult {
                external_payment_id: external_id.to_string(),
                status,
                is_paid: false,
                paid_at: None,
            }),
            PaymentStatus::Processing | PaymentStatus::Failed => {
                let payment = self.db.set_payment_status(external_id, status).await?;
                Ok(PaymentStatusResult {
                    external_payment_id: external_id.to_string(),
                    status: payment.status,
                    is_paid: payment.status == PaymentStatus::Completed,
                    paid_at: payment.paid_at,
                })
            },
        }
    }

    /// Ingests a gateway webhook.
    ///
    /// The payload's embedded status is never trusted — a forged or stale callback must not move money — so the only
    /// thing taken from it is *which* charge to re-poll. Unknown shapes and unknown charges are acknowledged and
    /// dropped (`processed == false`): the gateway retries on errors, and there is nothing to retry here.
    pub async fn handle_webhook(&self, payload: serde_json::Value) -> Result<WebhookOutcome, SettlementApiError> {
        let notification: WebhookNotification = match serde_json::from_value(payload) {
            Ok(n) => n,
            Err(e) => {
                debug!("💱️📨️ Discarding malformed webhook payload: {e}");
                return Ok(WebhookOutcome::ignored());
            },
        };
        if !notification.is_payment_update() {
            trace!("💱️📨️ Ignoring webhook {}/{}", notification.kind, notification.action);
            return Ok(WebhookOutcome::ignored());
        }
        let external_id = notification.data.id;
        let payment = match self.db.fetch_payment_by_external_id(&external_id).await? {
            Some(p) => p,
            None => {
                debug!("💱️📨️ Webhook for unknown charge [{external_id}]; acknowledged and dropped");
                return Ok(WebhookOutcome::ignored());
            },
        };
        let result = self.check_payment_status(&external_id).await?;
        Ok(WebhookOutcome {
            processed: true,
            update: Some(TradeUpdate {
                trade_id: payment.trade_id,
                payment_status: result.status,
                is_paid: result.is_paid,
            }),
        })
    }

    /// Moves the trade to `PaymentConfirmed` after a winning confirmation write. Tolerates racers that advanced the
    /// trade further already — including a dispute or refund that landed while the money was in flight — and retries
    /// the benign lost-update case a bounded number of times.
    async fn advance_trade_to_confirmed(&self, trade_id: &TradeId) -> Result<Trade, SettlementApiError> {
        for attempt in 1..=MAX_CAS_RETRIES {
            let result = self
                .db
                .update_trade_status(
                    trade_id,
                    &[TradeStatus::Accepted, TradeStatus::WaitingPayment],
                    TradeStatus::PaymentConfirmed,
                )
                .await;
            match result {
                Ok(trade) => return Ok(trade),
                Err(SettlementDbError::InvalidTradeState { actual, .. })
                    if matches!(
                        actual,
                        TradeStatus::PaymentConfirmed |
                            TradeStatus::ReleasingCrypto |
                            TradeStatus::Completed |
                            TradeStatus::Disputed |
                            TradeStatus::Cancelled
                    ) =>
                {
                    // Someone else already moved the trade along, or the trade was disputed/refunded while the money
                    // was in flight. Either way the confirmation stands and the trade keeps its status.
                    if matches!(actual, TradeStatus::Disputed | TradeStatus::Cancelled) {
                        warn!("💱️ Payment confirmed on {actual} trade [{trade_id}]; leaving the trade as-is");
                    }
                    let trade = self
                        .db
                        .fetch_trade(trade_id)
                        .await?
                        .ok_or_else(|| SettlementDbError::TradeNotFound(trade_id.clone()))?;
                    return Ok(trade);
                },
                Err(e) if e.is_retryable() => {
                    warn!("💱️ Trade [{trade_id}] status update lost a race (attempt {attempt}); retrying");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(SettlementApiError::RetriesExhausted { trade_id: trade_id.clone(), attempts: MAX_CAS_RETRIES })
    }

    async fn call_payment_confirmed_hook(&self, payment: crate::db_types::Payment, trade: Trade) {
        for emitter in &self.producers.payment_confirmed_producer {
            debug!("💱️📬️ Notifying payment-confirmed hook subscribers");
            let event = PaymentConfirmedEvent::new(payment.clone(), trade.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}
