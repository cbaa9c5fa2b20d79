use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    api::{errors::SettlementApiError, objects::UserStats},
    db_types::{NewRating, Rating, ReputationLevel, TradeStatus, UserReputation},
    traits::{SettlementDatabase, SettlementDbError},
};

/// `ReputationApi` derives a user's trust score and tier from their trade and rating history.
///
/// `recalculate` is a stateless full recomputation, not an incremental patch — it reads the whole history and
/// rebuilds the cached row, so it is safe to run redundantly from any number of triggers without coordination.
/// The failure mode to guard against is *not* running it after a state change, never running it twice.
pub struct ReputationApi<B> {
    db: B,
}

impl<B> Debug for ReputationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReputationApi")
    }
}

impl<B> ReputationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReputationApi<B>
where B: SettlementDatabase
{
    /// Rebuilds the materialized reputation row for `user_id` from scratch and upserts it.
    pub async fn recalculate(&self, user_id: &str) -> Result<UserReputation, SettlementApiError> {
        let ratings = self.db.rating_stats_for_user(user_id).await?;
        let completed = self.db.count_completed_trades(user_id).await?;
        let terminal = self.db.count_terminal_trades(user_id).await?;
        let success_rate = if terminal == 0 { 0.0 } else { completed as f64 / terminal as f64 };
        let level = ReputationLevel::classify(completed, ratings.average, success_rate);
        let reputation = UserReputation {
            user_id: user_id.to_string(),
            total_ratings: ratings.total,
            average_score: ratings.average,
            completed_trades: completed,
            success_rate,
            level,
            updated_at: Utc::now(),
        };
        let stored = self.db.upsert_reputation(reputation).await?;
        debug!(
            "🏅️ Reputation for [{user_id}] rebuilt: {level}, {completed} completed, avg {:.2}, success {:.2}",
            ratings.average, success_rate
        );
        Ok(stored)
    }

    /// The cached reputation row, if the user has ever been scored.
    pub async fn user_reputation(&self, user_id: &str) -> Result<Option<UserReputation>, SettlementApiError> {
        Ok(self.db.fetch_reputation(user_id).await?)
    }

    /// Reputation plus completed-trade volume per cryptocurrency.
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats, SettlementApiError> {
        let reputation = self.db.fetch_reputation(user_id).await?;
        let volumes = self.db.volume_by_crypto_for_user(user_id).await?;
        Ok(UserStats { user_id: user_id.to_string(), reputation, volumes })
    }

    /// The best-reputed users, by average score and then completed-trade count.
    pub async fn top_traders(&self, limit: i64) -> Result<Vec<UserReputation>, SettlementApiError> {
        Ok(self.db.top_traders(limit.max(0)).await?)
    }

    /// Records a rating left by one trade participant about the other, then recomputes the rated user's score.
    ///
    /// Ratings are only valid against a `Completed` trade, may only target the counterparty, and are immutable —
    /// a second rating by the same rater for the same trade is rejected.
    pub async fn record_rating(&self, rating: NewRating) -> Result<Rating, SettlementApiError> {
        if !(1..=5).contains(&rating.score) {
            return Err(SettlementApiError::InvalidRatingScore(rating.score));
        }
        let trade = self
            .db
            .fetch_trade(&rating.trade_id)
            .await?
            .ok_or_else(|| SettlementDbError::TradeNotFound(rating.trade_id.clone()))?;
        if trade.status != TradeStatus::Completed {
            return Err(SettlementDbError::InvalidTradeState {
                trade_id: trade.id,
                expected: vec![TradeStatus::Completed],
                actual: trade.status,
            }
            .into());
        }
        let rated_id = if rating.rater_id == trade.buyer_id {
            trade.seller_id.clone()
        } else if rating.rater_id == trade.seller_id {
            trade.buyer_id.clone()
        } else {
            return Err(SettlementApiError::NotAParticipant { trade_id: trade.id, user_id: rating.rater_id });
        };
        let stored = self.db.insert_rating(rating, &rated_id).await?;
        self.recalculate(&rated_id).await?;
        Ok(stored)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
