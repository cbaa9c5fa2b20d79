use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Escrow, EscrowStatus, TradeId},
    traits::SettlementDbError,
};

pub async fn insert_escrow(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Escrow, SettlementDbError> {
    let escrow = sqlx::query_as::<_, Escrow>(
        "INSERT INTO escrows (trade_id, status, created_at) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(trade_id.as_str())
    .bind(EscrowStatus::Pending)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(escrow)
}

pub async fn fetch_escrow(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Option<Escrow>, sqlx::Error> {
    let escrow = sqlx::query_as("SELECT * FROM escrows WHERE trade_id = $1")
        .bind(trade_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(escrow)
}

/// Escrow `Pending` → `Locked`. The guard is part of the UPDATE, so a double lock loses the race and surfaces as
/// [`SettlementDbError::InvalidEscrowState`] rather than silently succeeding.
pub async fn lock_escrow(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Escrow, SettlementDbError> {
    let updated = sqlx::query_as::<_, Escrow>(
        "UPDATE escrows SET status = $1, locked_at = $2 WHERE trade_id = $3 AND status = $4 RETURNING *",
    )
    .bind(EscrowStatus::Locked)
    .bind(Utc::now())
    .bind(trade_id.as_str())
    .bind(EscrowStatus::Pending)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(escrow) => {
            debug!("🔒️ Escrow for trade [{trade_id}] locked");
            Ok(escrow)
        },
        None => Err(state_error(trade_id, EscrowStatus::Pending, conn).await?),
    }
}

/// Escrow `Locked` → `Released`. Caller is responsible for running this inside the same transaction as the trade
/// status write and the payment guard.
pub async fn release_escrow(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Escrow, SettlementDbError> {
    let updated = sqlx::query_as::<_, Escrow>(
        "UPDATE escrows SET status = $1, released_at = $2 WHERE trade_id = $3 AND status = $4 RETURNING *",
    )
    .bind(EscrowStatus::Released)
    .bind(Utc::now())
    .bind(trade_id.as_str())
    .bind(EscrowStatus::Locked)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(escrow) => {
            debug!("🔓️ Escrow for trade [{trade_id}] released");
            Ok(escrow)
        },
        None => Err(state_error(trade_id, EscrowStatus::Locked, conn).await?),
    }
}

/// Escrow {`Pending`,`Locked`} → `Refunded`, recording the reason. Same transactional caveat as [`release_escrow`].
pub async fn refund_escrow(
    trade_id: &TradeId,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Escrow, SettlementDbError> {
    let updated = sqlx::query_as::<_, Escrow>(
        r#"
            UPDATE escrows SET status = $1, refunded_at = $2, refund_reason = $3
            WHERE trade_id = $4 AND status IN ('Pending', 'Locked')
            RETURNING *;
        "#,
    )
    .bind(EscrowStatus::Refunded)
    .bind(Utc::now())
    .bind(reason)
    .bind(trade_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(escrow) => {
            debug!("↩️ Escrow for trade [{trade_id}] refunded: {reason}");
            Ok(escrow)
        },
        // Reported as "expected Locked" since that is the latest non-terminal state a refund accepts.
        None => Err(state_error(trade_id, EscrowStatus::Locked, conn).await?),
    }
}

/// Builds the error describing why a guarded escrow update matched nothing.
async fn state_error(
    trade_id: &TradeId,
    expected: EscrowStatus,
    conn: &mut SqliteConnection,
) -> Result<SettlementDbError, sqlx::Error> {
    let err = match fetch_escrow(trade_id, conn).await? {
        Some(escrow) => SettlementDbError::InvalidEscrowState {
            trade_id: trade_id.clone(),
            expected,
            actual: escrow.status,
        },
        None => SettlementDbError::EscrowNotFound(trade_id.clone()),
    };
    Ok(err)
}
