use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use super::trades::is_unique_violation;
use crate::{
    db_types::{NewRating, Rating, UserReputation},
    traits::{CryptoVolume, RatingStats, SettlementDbError},
};

pub async fn insert_rating(
    rating: NewRating,
    rated_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Rating, SettlementDbError> {
    let result = sqlx::query_as::<_, Rating>(
        r#"
            INSERT INTO ratings (trade_id, rater_id, rated_id, score, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(rating.trade_id.as_str())
    .bind(&rating.rater_id)
    .bind(rated_id)
    .bind(rating.score)
    .bind(Utc::now())
    .fetch_one(conn)
    .await;
    match result {
        Ok(r) => {
            debug!("⭐️ {} rated {} with {} on trade {}", r.rater_id, r.rated_id, r.score, r.trade_id);
            Ok(r)
        },
        Err(e) if is_unique_violation(&e) => {
            Err(SettlementDbError::RatingAlreadyExists { trade_id: rating.trade_id, rater_id: rating.rater_id })
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn rating_stats_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<RatingStats, sqlx::Error> {
    let (total, average): (i64, f64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(AVG(score), 0.0) FROM ratings WHERE rated_id = $1")
            .bind(user_id)
            .fetch_one(conn)
            .await?;
    Ok(RatingStats { total, average })
}

pub async fn count_completed_trades(user_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trades WHERE (buyer_id = $1 OR seller_id = $1) AND status = 'Completed'",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn count_terminal_trades(user_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM trades
            WHERE (buyer_id = $1 OR seller_id = $1) AND status IN ('Completed', 'Cancelled', 'Disputed')
        "#,
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn upsert_reputation(
    reputation: UserReputation,
    conn: &mut SqliteConnection,
) -> Result<UserReputation, sqlx::Error> {
    let rep = sqlx::query_as::<_, UserReputation>(
        r#"
            INSERT INTO user_reputation (
                user_id, total_ratings, average_score, completed_trades, success_rate, level, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                total_ratings = excluded.total_ratings,
                average_score = excluded.average_score,
                completed_trades = excluded.completed_trades,
                success_rate = excluded.success_rate,
                level = excluded.level,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(&reputation.user_id)
    .bind(reputation.total_ratings)
    .bind(reputation.average_score)
    .bind(reputation.completed_trades)
    .bind(reputation.success_rate)
    .bind(reputation.level)
    .bind(reputation.updated_at)
    .fetch_one(conn)
    .await?;
    Ok(rep)
}

pub async fn fetch_reputation(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UserReputation>, sqlx::Error> {
    let rep = sqlx::query_as("SELECT * FROM user_reputation WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(rep)
}

pub async fn top_traders(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<UserReputation>, sqlx::Error> {
    let traders = sqlx::query_as(
        r#"
            SELECT * FROM user_reputation
            ORDER BY average_score DESC, completed_trades DESC, user_id ASC
            LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(traders)
}

pub async fn volume_by_crypto_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<CryptoVolume>, sqlx::Error> {
    let volumes = sqlx::query_as(
        r#"
            SELECT cryptocurrency, COALESCE(SUM(fiat_amount), 0) AS total_fiat, COUNT(*) AS trades
            FROM trades
            WHERE (buyer_id = $1 OR seller_id = $1) AND status = 'Completed'
            GROUP BY cryptocurrency
            ORDER BY total_fiat DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(volumes)
}
