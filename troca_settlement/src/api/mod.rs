//! The public face of the settlement engine.
//!
//! Each API is a thin struct generic over a [`crate::traits::SettlementDatabase`] backend (and, for the reconciler,
//! a [`pix_gateway::PixGatewayClient`]), so callers inject the real SQLite backend and live gateway in production and
//! fakes in tests. There is no global state anywhere in this crate.

pub mod errors;
pub mod escrow_api;
pub mod objects;
pub mod reconciler_api;
pub mod reputation_api;
pub mod trade_flow_api;

/// How many times an operation retries when a conditional update loses to a concurrent writer. Losing this race is
/// benign (somebody else made progress); losing it this many times in a row is suspicious enough to surface.
pub const MAX_CAS_RETRIES: usize = 3;
