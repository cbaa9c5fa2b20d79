use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use super::trades::is_unique_violation;
use crate::{
    db_types::{NewPayment, Payment, PaymentStatus, TradeId},
    traits::{PaymentConfirmation, SettlementDbError},
};

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, SettlementDbError> {
    let now = Utc::now();
    let result = sqlx::query_as::<_, Payment>(
        r#"
            INSERT INTO payments (trade_id, external_payment_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(payment.trade_id.as_str())
    .bind(&payment.external_payment_id)
    .bind(PaymentStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(p) => {
            debug!("📝️ Payment [{}] recorded for trade {}", p.external_payment_id, p.trade_id);
            Ok(p)
        },
        Err(e) if is_unique_violation(&e) => Err(SettlementDbError::PaymentAlreadyExists(payment.trade_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payment(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE trade_id = $1")
        .bind(trade_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payment_by_external_id(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE external_payment_id = $1")
        .bind(external_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// The idempotent confirmation write. "Set status to Completed where it is not Completed yet" — whichever of the
/// poll and webhook observers runs this first makes the transition; the other matches zero rows and learns it was
/// second.
pub async fn confirm_payment(
    external_id: &str,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentConfirmation, SettlementDbError> {
    let updated = sqlx::query_as::<_, Payment>(
        r#"
            UPDATE payments SET status = $1, paid_at = $2, updated_at = $3
            WHERE external_payment_id = $4 AND status != $1
            RETURNING *;
        "#,
    )
    .bind(PaymentStatus::Completed)
    .bind(paid_at)
    .bind(Utc::now())
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(payment) => {
            debug!("✅️ Payment [{external_id}] confirmed (paid at {paid_at})");
            Ok(PaymentConfirmation { payment, transitioned: true })
        },
        None => match fetch_payment_by_external_id(external_id, conn).await? {
            Some(payment) => Ok(PaymentConfirmation { payment, transitioned: false }),
            None => Err(SettlementDbError::PaymentNotFound(external_id.to_string())),
        },
    }
}

/// Records a non-conclusive gateway status (`Processing`, `Failed`). Terminal payment statuses are never downgraded;
/// if the payment already left {Pending, Processing}, the stored record is returned unchanged.
pub async fn set_payment_status(
    external_id: &str,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Payment, SettlementDbError> {
    let updated = sqlx::query_as::<_, Payment>(
        r#"
            UPDATE payments SET status = $1, updated_at = $2
            WHERE external_payment_id = $3 AND status IN ('Pending', 'Processing') AND status != $1
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(Utc::now())
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(payment) => Ok(payment),
        None => fetch_payment_by_external_id(external_id, conn)
            .await?
            .ok_or_else(|| SettlementDbError::PaymentNotFound(external_id.to_string())),
    }
}
