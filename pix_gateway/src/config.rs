use log::*;
use troca_common::Secret;

#[derive(Debug, Clone, Default)]
pub struct PixConfig {
    pub base_url: String,
    pub access_token: Secret<String>,
    /// How long a charge stays payable before the provider expires it, in minutes.
    pub expiry_minutes: i64,
}

impl PixConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("TROCA_PIX_BASE_URL").unwrap_or_else(|_| {
            warn!("TROCA_PIX_BASE_URL not set, using the sandbox endpoint");
            "https://api.pix-provider.example.com".to_string()
        });
        let access_token = Secret::new(std::env::var("TROCA_PIX_ACCESS_TOKEN").unwrap_or_else(|_| {
            warn!("TROCA_PIX_ACCESS_TOKEN not set, using (probably useless) default");
            "TEST-0000000000000000".to_string()
        }));
        let expiry_minutes = std::env::var("TROCA_PIX_EXPIRY_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        Self { base_url, access_token, expiry_minutes }
    }
}
