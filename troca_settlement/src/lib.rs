//! Troca Settlement Engine
//!
//! The settlement core for a peer-to-peer asset marketplace: a buyer and a seller exchange a fiat payment for a
//! digital asset, with the platform holding custody guarantees between the two legs of the trade. This library
//! contains the three components that make that safe:
//!
//! 1. The escrow state machine ([`EscrowApi`]): `Pending → Locked → {Released | Refunded}`, with fund release gated
//!    on a confirmed payment and every transition expressed as a compare-and-set in the backend.
//! 2. The payment reconciler ([`ReconcilerApi`]): creates charges at the external PIX gateway and normalizes the two
//!    ways completion can be observed — a scheduled poll and an asynchronous webhook — into one idempotent update
//!    path. First observer wins; nobody triggers release twice.
//! 3. The reputation engine ([`ReputationApi`]): rebuilds each participant's trust score and tier from completed
//!    trade history whenever a trade reaches a terminal state. Full recomputation, never incremental patching.
//!
//! Storage backends implement the traits in [`traits`]; SQLite is provided ([`SqliteDatabase`]). The engine holds no
//! global state and no in-process locks, so any number of instances can run against the same database.
//!
//! Events emitted by the engine (payment confirmed, trade settled) can be subscribed to through the hook system in
//! [`events`] — reputation recomputation is typically wired up as a trade-settled hook.

mod api;

pub mod db_types;
pub mod events;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    errors::SettlementApiError,
    escrow_api::EscrowApi,
    objects::{PaymentArtifact, PaymentStatusResult, TradeUpdate, UserStats, WebhookOutcome},
    reconciler_api::{map_gateway_status, ReconcilerApi},
    reputation_api::ReputationApi,
    trade_flow_api::TradeFlowApi,
    MAX_CAS_RETRIES,
};
