#![allow(dead_code)]

use log::*;
use pix_gateway::{ChargePayer, MockPixGateway};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use troca_common::{CryptoAmount, FiatAmount};
use troca_settlement::{
    db_types::{NewTrade, Trade, TradeId},
    events::EventProducers,
    EscrowApi,
    ReconcilerApi,
    ReputationApi,
    SqliteDatabase,
    TradeFlowApi,
};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://{}/troca_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    sqlx::migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

/// Everything a settlement test needs, wired against a throwaway database and the mock gateway. All components share
/// the same `EventProducers`, so hook-based tests see events from every api.
pub struct TestHarness {
    pub db: SqliteDatabase,
    pub gateway: MockPixGateway,
    pub trades: TradeFlowApi<SqliteDatabase>,
    pub escrow: EscrowApi<SqliteDatabase>,
    pub reconciler: ReconcilerApi<SqliteDatabase, MockPixGateway>,
    pub reputation: ReputationApi<SqliteDatabase>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = MockPixGateway::new();
        let trades = TradeFlowApi::new(db.clone(), producers.clone());
        let escrow = EscrowApi::new(db.clone(), producers.clone());
        let reconciler = ReconcilerApi::new(db.clone(), gateway.clone(), producers);
        let reputation = ReputationApi::new(db.clone());
        Self { db, gateway, trades, escrow, reconciler, reputation }
    }

    /// Drives a trade through the entire happy path: accept, lock, charge, simulated payment, release, complete.
    pub async fn settle_trade(&self, id: &str, buyer: &str, seller: &str, crypto: &str, reais: i64) -> Trade {
        let trade_id = TradeId::from(id);
        self.trades.create_trade(new_trade(id, buyer, seller, crypto, reais)).await.expect("create failed");
        self.trades.accept_trade(&trade_id).await.expect("accept failed");
        self.escrow.lock_funds(&trade_id).await.expect("lock failed");
        let artifact = self
            .reconciler
            .create_payment(&trade_id, FiatAmount::from_reais(reais), payer(buyer))
            .await
            .expect("create_payment failed");
        self.gateway.fast_forward(31);
        let status = self.reconciler.check_payment_status(&artifact.external_payment_id).await.expect("poll failed");
        assert!(status.is_paid, "mock charge should have settled");
        self.escrow.release_funds(&trade_id).await.expect("release failed");
        self.trades.complete_trade(&trade_id).await.expect("complete failed")
    }

    /// Creates a trade and immediately refunds it, leaving it `Cancelled`.
    pub async fn cancel_trade(&self, id: &str, buyer: &str, seller: &str, crypto: &str, reais: i64) -> Trade {
        let trade_id = TradeId::from(id);
        self.trades.create_trade(new_trade(id, buyer, seller, crypto, reais)).await.expect("create failed");
        let (_, trade) = self.escrow.refund_funds(&trade_id, "test cancellation").await.expect("refund failed");
        trade
    }
}

pub fn new_trade(id: &str, buyer: &str, seller: &str, crypto: &str, reais: i64) -> NewTrade {
    NewTrade::new(
        TradeId::from(id),
        buyer,
        seller,
        crypto,
        FiatAmount::from_reais(reais),
        CryptoAmount::from_coins(1),
    )
}

pub fn payer(user: &str) -> ChargePayer {
    ChargePayer { email: format!("{user}@example.com"), document: Some("39053344705".to_string()) }
}
