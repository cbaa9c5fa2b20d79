use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTrade, Trade, TradeId, TradeStatus},
    traits::SettlementDbError,
};

pub async fn insert_trade(trade: NewTrade, conn: &mut SqliteConnection) -> Result<Trade, SettlementDbError> {
    let result = sqlx::query_as::<_, Trade>(
        r#"
            INSERT INTO trades (
                id,
                buyer_id,
                seller_id,
                cryptocurrency,
                fiat_amount,
                crypto_amount,
                status,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(trade.id.as_str())
    .bind(&trade.buyer_id)
    .bind(&trade.seller_id)
    .bind(&trade.cryptocurrency)
    .bind(trade.fiat_amount.value())
    .bind(trade.crypto_amount.value())
    .bind(TradeStatus::Pending)
    .bind(Utc::now())
    .fetch_one(conn)
    .await;
    match result {
        Ok(t) => {
            debug!("📝️ Trade [{}] inserted ({} for {})", t.id, t.crypto_amount, t.fiat_amount);
            Ok(t)
        },
        Err(e) if is_unique_violation(&e) => Err(SettlementDbError::TradeAlreadyExists(trade.id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_trade(id: &TradeId, conn: &mut SqliteConnection) -> Result<Option<Trade>, sqlx::Error> {
    let trade = sqlx::query_as("SELECT * FROM trades WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(trade)
}

/// Conditionally moves the trade status from one of `from` to `to` in a single guarded UPDATE.
///
/// The guard and the write are one statement, so two racing callers cannot both apply the same transition: the loser
/// matches zero rows and gets back an [`SettlementDbError::InvalidTradeState`] describing what the winner left behind.
pub async fn update_status_cas(
    id: &TradeId,
    from: &[TradeStatus],
    to: TradeStatus,
    conn: &mut SqliteConnection,
) -> Result<Trade, SettlementDbError> {
    // `from` holds enum values, so interpolating their display form is safe.
    let in_clause = from.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    let stamp_column = match to {
        TradeStatus::Cancelled => ", cancelled_at = $3",
        TradeStatus::Completed => ", completed_at = $3",
        _ => "",
    };
    let sql =
        format!("UPDATE trades SET status = $1{stamp_column} WHERE id = $2 AND status IN ({in_clause}) RETURNING *");
    let query = sqlx::query_as::<_, Trade>(&sql).bind(to).bind(id.as_str());
    let updated = if stamp_column.is_empty() {
        query.fetch_optional(&mut *conn).await?
    } else {
        query.bind(Utc::now()).fetch_optional(&mut *conn).await?
    };
    match updated {
        Some(trade) => {
            debug!("🔀️ Trade [{id}] moved to {to}");
            Ok(trade)
        },
        None => match fetch_trade(id, conn).await? {
            Some(trade) => Err(SettlementDbError::InvalidTradeState {
                trade_id: id.clone(),
                expected: from.to_vec(),
                actual: trade.status,
            }),
            None => Err(SettlementDbError::TradeNotFound(id.clone())),
        },
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
