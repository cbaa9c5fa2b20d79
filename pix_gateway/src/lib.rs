//! Adapter crate for the external PIX instant-payment provider.
//!
//! The settlement engine never talks to the provider directly; it goes through the [`PixGatewayClient`] trait, which
//! is implemented by the live REST client ([`PixApi`]) and by an in-process fake ([`MockPixGateway`]) so the engine
//! can run and be tested without network access.

mod api;
mod config;
mod error;
mod mock;

mod data_objects;

pub use api::PixApi;
pub use config::PixConfig;
pub use data_objects::{Charge, ChargePayer, NewCharge, WebhookData, WebhookNotification, WEBHOOK_ACTION_UPDATED};
pub use error::PixApiError;
pub use mock::MockPixGateway;

/// The contract the settlement engine consumes. Both the live client and the mock implement this.
///
/// Implementations attach a fresh idempotency key to every mutating call, so that a network-level retry never creates
/// a duplicate charge at the provider.
#[allow(async_fn_in_trait)]
pub trait PixGatewayClient {
    /// Register a payment intent with the provider. Returns the provider-assigned charge, including the displayable
    /// QR payload.
    async fn create_charge(&self, charge: NewCharge) -> Result<Charge, PixApiError>;

    /// Fetch the current state of a charge from the provider. This is the ground truth for reconciliation.
    async fn get_charge(&self, external_id: &str) -> Result<Charge, PixApiError>;
}
