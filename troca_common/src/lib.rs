mod money;

pub mod op;
mod secret;

pub use money::{CryptoAmount, FiatAmount, FiatConversionError, BRL_CURRENCY_CODE};
pub use secret::Secret;
