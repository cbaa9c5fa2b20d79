use log::*;
use troca_common::FiatAmount;
use troca_settlement::{db_types::*, traits::SettlementDbError, SettlementApiError};

use crate::support::{new_trade, payer, TestHarness};

mod support;

#[tokio::test]
async fn happy_path_settles_trade() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1001");

    let trade = h.trades.create_trade(new_trade("trade-1001", "alice", "bob", "BTC", 100)).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Pending);
    assert_eq!(trade.fiat_amount, FiatAmount::from_reais(100));
    let escrow = h.escrow.escrow_status(&id).await.unwrap();
    assert_eq!(escrow.status, EscrowStatus::Pending);

    let trade = h.trades.accept_trade(&id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Accepted);

    let escrow = h.escrow.lock_funds(&id).await.unwrap();
    assert_eq!(escrow.status, EscrowStatus::Locked);
    assert!(escrow.locked_at.is_some());

    let artifact = h.reconciler.create_payment(&id, FiatAmount::from_reais(100), payer("alice")).await.unwrap();
    assert!(!artifact.qr_code.is_empty());
    let trade = h.trades.trade(&id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::WaitingPayment);

    // The charge has not settled yet, so polling reports pending and nothing moves.
    let status = h.reconciler.check_payment_status(&artifact.external_payment_id).await.unwrap();
    assert!(!status.is_paid);
    assert_eq!(status.status, PaymentStatus::Pending);

    h.gateway.fast_forward(31);
    let status = h.reconciler.check_payment_status(&artifact.external_payment_id).await.unwrap();
    assert!(status.is_paid);
    assert!(status.paid_at.is_some());
    let trade = h.trades.trade(&id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::PaymentConfirmed);

    let (escrow, trade) = h.escrow.release_funds(&id).await.unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);
    assert!(escrow.released_at.is_some());
    assert_eq!(trade.status, TradeStatus::ReleasingCrypto);

    let trade = h.trades.complete_trade(&id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    assert!(trade.completed_at.is_some());
    info!("🔒️ happy path test complete");
}

#[tokio::test]
async fn locking_twice_is_an_error() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1002");
    h.trades.create_trade(new_trade("trade-1002", "alice", "bob", "BTC", 50)).await.unwrap();
    h.trades.accept_trade(&id).await.unwrap();
    h.escrow.lock_funds(&id).await.unwrap();

    let err = h.escrow.lock_funds(&id).await.expect_err("second lock must fail");
    assert!(matches!(
        err,
        SettlementApiError::Db(SettlementDbError::InvalidEscrowState {
            actual: EscrowStatus::Locked,
            ..
        })
    ));
    assert!(err.is_business_rule());
    // The first lock is untouched.
    assert_eq!(h.escrow.escrow_status(&id).await.unwrap().status, EscrowStatus::Locked);
}

#[tokio::test]
async fn release_requires_locked_escrow() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1003");
    h.trades.create_trade(new_trade("trade-1003", "alice", "bob", "ETH", 75)).await.unwrap();

    let err = h.escrow.release_funds(&id).await.expect_err("release of an unlocked escrow must fail");
    assert!(matches!(
        err,
        SettlementApiError::Db(SettlementDbError::InvalidEscrowState {
            actual: EscrowStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn release_requires_a_payment_record() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1004");
    h.trades.create_trade(new_trade("trade-1004", "alice", "bob", "BTC", 75)).await.unwrap();
    h.trades.accept_trade(&id).await.unwrap();
    h.escrow.lock_funds(&id).await.unwrap();

    let err = h.escrow.release_funds(&id).await.expect_err("release without any charge must fail");
    assert!(matches!(err, SettlementApiError::Db(SettlementDbError::PaymentNotFoundForTrade(_))));
}

#[tokio::test]
async fn release_requires_confirmed_payment() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1005");
    h.trades.create_trade(new_trade("trade-1005", "alice", "bob", "BTC", 200)).await.unwrap();
    h.trades.accept_trade(&id).await.unwrap();
    h.escrow.lock_funds(&id).await.unwrap();
    h.reconciler.create_payment(&id, FiatAmount::from_reais(200), payer("alice")).await.unwrap();

    // The buyer has been shown the QR code but the gateway has not seen the money yet.
    let err = h.escrow.release_funds(&id).await.expect_err("release before payment confirmation must fail");
    assert!(matches!(
        err,
        SettlementApiError::Db(SettlementDbError::PaymentNotConfirmed { status: PaymentStatus::Pending, .. })
    ));
    assert_eq!(h.escrow.escrow_status(&id).await.unwrap().status, EscrowStatus::Locked);
}

#[tokio::test]
async fn refunding_a_pending_trade_cancels_it() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1006");
    h.trades.create_trade(new_trade("trade-1006", "alice", "bob", "BTC", 30)).await.unwrap();

    let (escrow, trade) = h.escrow.refund_funds(&id, "buyer timed out").await.unwrap();
    assert_eq!(escrow.status, EscrowStatus::Refunded);
    assert_eq!(escrow.refund_reason.as_deref(), Some("buyer timed out"));
    assert!(escrow.refunded_at.is_some());
    assert_eq!(trade.status, TradeStatus::Cancelled);
    assert!(trade.cancelled_at.is_some());

    // A refunded escrow is terminal. Nothing can be released out of it.
    let err = h.escrow.release_funds(&id).await.expect_err("release after refund must fail");
    assert!(err.is_business_rule());
}

#[tokio::test]
async fn refund_after_lock_returns_the_asset() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1007");
    h.trades.create_trade(new_trade("trade-1007", "alice", "bob", "SOL", 45)).await.unwrap();
    h.trades.accept_trade(&id).await.unwrap();
    h.escrow.lock_funds(&id).await.unwrap();

    let (escrow, trade) = h.escrow.refund_funds(&id, "seller backed out").await.unwrap();
    assert_eq!(escrow.status, EscrowStatus::Refunded);
    assert_eq!(trade.status, TradeStatus::Cancelled);
}

#[tokio::test]
async fn settled_trades_cannot_be_refunded() {
    let h = TestHarness::new().await;
    h.settle_trade("trade-1008", "alice", "bob", "BTC", 120).await;
    let id = TradeId::from("trade-1008");

    let err = h.escrow.refund_funds(&id, "too late").await.expect_err("refund after release must fail");
    assert!(matches!(
        err,
        SettlementApiError::Db(SettlementDbError::InvalidEscrowState {
            actual: EscrowStatus::Released,
            ..
        })
    ));
}

#[tokio::test]
async fn can_release_and_can_refund_report_without_failing() {
    let h = TestHarness::new().await;
    let missing = TradeId::from("no-such-trade");
    assert!(!h.escrow.can_release(&missing).await.unwrap());
    assert!(!h.escrow.can_refund(&missing).await.unwrap());

    let id = TradeId::from("trade-1009");
    h.trades.create_trade(new_trade("trade-1009", "alice", "bob", "BTC", 80)).await.unwrap();
    assert!(!h.escrow.can_release(&id).await.unwrap());
    assert!(h.escrow.can_refund(&id).await.unwrap());

    h.trades.accept_trade(&id).await.unwrap();
    h.escrow.lock_funds(&id).await.unwrap();
    let artifact = h.reconciler.create_payment(&id, FiatAmount::from_reais(80), payer("alice")).await.unwrap();
    assert!(!h.escrow.can_release(&id).await.unwrap(), "unpaid trades are not releasable");

    h.gateway.fast_forward(31);
    h.reconciler.check_payment_status(&artifact.external_payment_id).await.unwrap();
    assert!(h.escrow.can_release(&id).await.unwrap());

    h.escrow.release_funds(&id).await.unwrap();
    assert!(!h.escrow.can_release(&id).await.unwrap());
    assert!(!h.escrow.can_refund(&id).await.unwrap());
}

#[tokio::test]
async fn escrow_status_for_missing_trade_is_an_error() {
    let h = TestHarness::new().await;
    let err = h.escrow.escrow_status(&TradeId::from("ghost")).await.expect_err("missing escrow must error");
    assert!(matches!(err, SettlementApiError::Db(SettlementDbError::EscrowNotFound(_))));
}

#[tokio::test]
async fn disputed_trades_can_still_be_refunded() {
    let h = TestHarness::new().await;
    let id = TradeId::from("trade-1010");
    h.trades.create_trade(new_trade("trade-1010", "alice", "bob", "BTC", 60)).await.unwrap();
    h.trades.accept_trade(&id).await.unwrap();
    h.escrow.lock_funds(&id).await.unwrap();
    h.reconciler.create_payment(&id, FiatAmount::from_reais(60), payer("alice")).await.unwrap();

    let trade = h.trades.mark_disputed(&id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Disputed);

    let (escrow, trade) = h.escrow.refund_funds(&id, "arbiter ruled for the seller").await.unwrap();
    assert_eq!(escrow.status, EscrowStatus::Refunded);
    assert_eq!(trade.status, TradeStatus::Cancelled);
}
