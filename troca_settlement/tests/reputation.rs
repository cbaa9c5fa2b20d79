use std::time::Duration;

use log::*;
use troca_settlement::{
    db_types::*,
    events::{EventHandlers, EventHooks, TradeSettledEvent},
    traits::SettlementDbError,
    ReputationApi,
    SettlementApiError,
    SqliteDatabase,
};

use crate::support::{new_trade, TestHarness};

mod support;

#[tokio::test]
async fn unknown_users_start_from_zero() {
    let h = TestHarness::new().await;
    assert!(h.reputation.user_reputation("alice").await.unwrap().is_none());

    let rep = h.reputation.recalculate("alice").await.unwrap();
    assert_eq!(rep.total_ratings, 0);
    assert_eq!(rep.average_score, 0.0);
    assert_eq!(rep.completed_trades, 0);
    assert_eq!(rep.success_rate, 0.0);
    assert_eq!(rep.level, ReputationLevel::Beginner);

    // Recomputing from the same history lands on the same numbers.
    let again = h.reputation.recalculate("alice").await.unwrap();
    assert_eq!(again.total_ratings, rep.total_ratings);
    assert_eq!(again.average_score, rep.average_score);
    assert_eq!(again.completed_trades, rep.completed_trades);
    assert_eq!(again.success_rate, rep.success_rate);
    assert_eq!(again.level, rep.level);
}

#[tokio::test]
async fn rating_a_completed_trade_updates_the_counterparty() {
    let h = TestHarness::new().await;
    h.settle_trade("trade-3001", "alice", "bob", "BTC", 100).await;

    let rating = h.reputation.record_rating(NewRating::new(TradeId::from("trade-3001"), "alice", 5)).await.unwrap();
    assert_eq!(rating.rated_id, "bob", "the rating always targets the counterparty");

    let rep = h.reputation.user_reputation("bob").await.unwrap().expect("bob must have a reputation row");
    assert_eq!(rep.total_ratings, 1);
    assert_eq!(rep.average_score, 5.0);
    assert_eq!(rep.completed_trades, 1);
    assert_eq!(rep.success_rate, 1.0);
    assert_eq!(rep.level, ReputationLevel::Beginner, "one good trade does not make an expert");
    info!("⭐️ rating test complete");
}

#[tokio::test]
async fn rating_guards() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-3002");
    h.settle_trade("trade-3002", "alice", "bob", "BTC", 100).await;

    let err = h.reputation.record_rating(NewRating::new(id.clone(), "alice", 6)).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::InvalidRatingScore(6)));

    let err = h.reputation.record_rating(NewRating::new(id.clone(), "mallory", 1)).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::NotAParticipant { ref user_id, .. } if user_id == "mallory"));

    h.reputation.record_rating(NewRating::new(id.clone(), "bob", 4)).await.unwrap();
    let err = h.reputation.record_rating(NewRating::new(id.clone(), "bob", 5)).await.unwrap_err();
    assert!(matches!(err, SettlementApiError::Db(SettlementDbError::RatingAlreadyExists { .. })));

    // Trades still in flight cannot be rated.
    let open = TradeId::from("trade-3003");
    h.trades.create_trade(new_trade("trade-3003", "alice", "bob", "BTC", 50)).await.unwrap();
    let err = h.reputation.record_rating(NewRating::new(open, "alice", 5)).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementApiError::Db(SettlementDbError::InvalidTradeState { actual: TradeStatus::Pending, .. })
    ));
}

#[tokio::test]
async fn cancellations_drag_the_success_rate_down() {
    let h = TestHarness::new().await;
    for i in 0..5 {
        let id = format!("trade-31{i:02}");
        h.settle_trade(&id, "alice", "bob", "BTC", 100).await;
        // Bob rates alice a steady 4.
        h.reputation.record_rating(NewRating::new(TradeId::from(id.as_str()), "bob", 4)).await.unwrap();
    }
    h.cancel_trade("trade-3105", "alice", "bob", "BTC", 100).await;

    let rep = h.reputation.recalculate("alice").await.unwrap();
    assert_eq!(rep.completed_trades, 5);
    assert_eq!(rep.total_ratings, 5);
    assert_eq!(rep.average_score, 4.0);
    assert!((rep.success_rate - 5.0 / 6.0).abs() < 1e-9);
    assert_eq!(rep.level, ReputationLevel::Intermediate);
}

#[tokio::test]
async fn twenty_good_trades_make_an_advanced_trader() {
    let h = TestHarness::new().await;
    for i in 0..20 {
        let id = format!("trade-32{i:02}");
        h.settle_trade(&id, "alice", "bob", "BTC", 100).await;
        // Alternating 4s and 5s average out to exactly 4.5.
        let score = if i % 2 == 0 { 4 } else { 5 };
        h.reputation.record_rating(NewRating::new(TradeId::from(id.as_str()), "alice", score)).await.unwrap();
    }
    h.cancel_trade("trade-3220", "carol", "bob", "BTC", 100).await;

    let rep = h.reputation.recalculate("bob").await.unwrap();
    assert_eq!(rep.completed_trades, 20);
    assert_eq!(rep.average_score, 4.5);
    assert!((rep.success_rate - 20.0 / 21.0).abs() < 1e-9);
    assert_eq!(rep.level, ReputationLevel::Advanced, "20 trades is one tier short of expert");
}

#[tokio::test]
async fn settlement_hook_refreshes_both_parties() {
    // The hook needs the database, which only exists once the harness is up, so it is handed over via a cell.
    let db_slot = std::sync::Arc::new(tokio::sync::OnceCell::<SqliteDatabase>::new());
    let db_for_hook = db_slot.clone();
    let mut hooks = EventHooks::default();
    hooks.on_trade_settled(move |ev: TradeSettledEvent| {
        let db_for_hook = db_for_hook.clone();
        Box::pin(async move {
            let Some(db) = db_for_hook.get() else {
                warn!("🪝️ Settlement event before the database was wired up");
                return;
            };
            let api = ReputationApi::new(db.clone());
            for user in ev.participants() {
                if let Err(e) = api.recalculate(user).await {
                    error!("🪝️ Could not refresh reputation for {user}: {e}");
                }
            }
        })
    });
    let handlers = EventHandlers::new(10, hooks);
    let h = TestHarness::with_producers(handlers.producers()).await;
    db_slot.set(h.db.clone()).ok();
    handlers.start_handlers().await;

    h.settle_trade("trade-3301", "alice", "bob", "BTC", 100).await;
    h.cancel_trade("trade-3302", "alice", "bob", "BTC", 50).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    for user in ["alice", "bob"] {
        let rep = h.reputation.user_reputation(user).await.unwrap().expect("hook must have created the row");
        assert_eq!(rep.completed_trades, 1);
        assert!((rep.success_rate - 0.5).abs() < 1e-9, "one settled, one cancelled");
    }
}

#[tokio::test]
async fn top_traders_orders_by_score() {
    let h = TestHarness::new().await;
    let pairs = [("trade-3401", "alice", "bob", 3), ("trade-3402", "carol", "dave", 5), ("trade-3403", "erin", "frank", 4)];
    for (id, buyer, seller, score) in pairs {
        h.settle_trade(id, buyer, seller, "BTC", 100).await;
        // The buyer rates the seller; only sellers end up on the leaderboard here.
        h.reputation.record_rating(NewRating::new(TradeId::from(id), buyer, score)).await.unwrap();
    }

    let top = h.reputation.top_traders(10).await.unwrap();
    let names = top.iter().map(|r| r.user_id.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["dave", "frank", "bob"]);

    let top2 = h.reputation.top_traders(2).await.unwrap();
    assert_eq!(top2.len(), 2);
    assert_eq!(top2[0].user_id, "dave");

    assert!(h.reputation.top_traders(-1).await.unwrap().is_empty());
}

#[tokio::test]
async fn user_stats_aggregate_volume_per_asset() {
    let h = TestHarness::new().await;
    h.settle_trade("trade-3501", "alice", "bob", "BTC", 100).await;
    h.settle_trade("trade-3502", "alice", "carol", "BTC", 50).await;
    h.settle_trade("trade-3503", "alice", "dave", "ETH", 200).await;
    // An open trade contributes nothing until it completes.
    h.trades.create_trade(new_trade("trade-3504", "alice", "bob", "SOL", 999)).await.unwrap();
    h.reputation.recalculate("alice").await.unwrap();

    let stats = h.reputation.user_stats("alice").await.unwrap();
    assert_eq!(stats.user_id, "alice");
    assert_eq!(stats.reputation.map(|r| r.completed_trades), Some(3));
    assert_eq!(stats.volumes.len(), 2);
    // Sorted by fiat volume, largest first.
    assert_eq!(stats.volumes[0].cryptocurrency, "ETH");
    assert_eq!(stats.volumes[0].total_fiat.value(), 200_00);
    assert_eq!(stats.volumes[0].trades, 1);
    assert_eq!(stats.volumes[1].cryptocurrency, "BTC");
    assert_eq!(stats.volumes[1].total_fiat.value(), 150_00);
    assert_eq!(stats.volumes[1].trades, 2);
}
