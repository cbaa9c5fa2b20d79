//! Behaviour contracts that storage backends must implement to support the settlement engine.
//!
//! The engine never talks to SQL directly; every precondition check and every state transition goes through
//! [`SettlementDatabase`], whose implementations express transitions as conditional updates so that concurrent
//! callers (poller, webhook handler, user actions) can never double-apply a transition.

mod data_objects;
mod settlement_database;

pub use data_objects::{CryptoVolume, PaymentConfirmation, RatingStats};
pub use settlement_database::{SettlementDatabase, SettlementDbError};
