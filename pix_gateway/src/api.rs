use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use troca_common::BRL_CURRENCY_CODE;
use uuid::Uuid;

use crate::{Charge, NewCharge, PixApiError, PixConfig, PixGatewayClient};

/// Live REST client for the PIX provider.
#[derive(Clone)]
pub struct PixApi {
    config: PixConfig,
    client: Arc<Client>,
}

impl PixApi {
    pub fn new(config: PixConfig) -> Result<Self, PixApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = format!("Bearer {}", config.access_token.reveal());
        let val = HeaderValue::from_str(&auth).map_err(|e| PixApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PixApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        idempotency_key: Option<&str>,
        body: Option<B>,
    ) -> Result<T, PixApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if let Some(key) = idempotency_key {
            req = req.header("X-Idempotency-Key", key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| PixApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| PixApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| PixApiError::RestResponseError(e.to_string()))?;
            Err(PixApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1/payments{path}", self.config.base_url)
    }
}

/// The provider's response body for a charge. Flattened into [`Charge`] for consumers.
#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: serde_json::Value,
    status: String,
    date_approved: Option<DateTime<Utc>>,
    date_of_expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    point_of_interaction: PointOfInteraction,
}

#[derive(Debug, Default, Deserialize)]
struct PointOfInteraction {
    #[serde(default)]
    transaction_data: TransactionData,
}

#[derive(Debug, Default, Deserialize)]
struct TransactionData {
    #[serde(default)]
    qr_code: String,
    #[serde(default)]
    qr_code_base64: String,
}

impl From<ChargeResponse> for Charge {
    fn from(r: ChargeResponse) -> Self {
        // The provider has returned both numeric and string ids over API revisions; normalize to a string.
        let external_id = match &r.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Charge {
            external_id,
            status: r.status,
            qr_code: r.point_of_interaction.transaction_data.qr_code,
            qr_code_base64: r.point_of_interaction.transaction_data.qr_code_base64,
            paid_at: r.date_approved,
            expires_at: r.date_of_expiration,
        }
    }
}

impl PixGatewayClient for PixApi {
    async fn create_charge(&self, charge: NewCharge) -> Result<Charge, PixApiError> {
        if charge.amount.value() <= 0 {
            return Err(PixApiError::InvalidCurrencyAmount(charge.amount.to_string()));
        }
        let idempotency_key = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + chrono::Duration::minutes(self.config.expiry_minutes);
        let body = serde_json::json!({
            "transaction_amount": charge.amount.to_reais_f64(),
            "description": charge.description,
            "payment_method_id": "pix",
            "currency_id": BRL_CURRENCY_CODE,
            "date_of_expiration": expires_at,
            "external_reference": charge.external_reference,
            "payer": {
                "email": charge.payer.email,
                "identification": charge.payer.document.as_ref().map(|doc| serde_json::json!({
                    "type": "CPF",
                    "number": doc,
                })),
            },
        });
        debug!("Registering charge for {} (ref {})", charge.amount, charge.external_reference);
        let result: ChargeResponse =
            self.rest_query(Method::POST, "", Some(idempotency_key.as_str()), Some(body)).await?;
        let charge = Charge::from(result);
        info!("Registered charge {} with the provider", charge.external_id);
        Ok(charge)
    }

    async fn get_charge(&self, external_id: &str) -> Result<Charge, PixApiError> {
        let path = format!("/{external_id}");
        trace!("Polling charge {external_id}");
        let result: ChargeResponse =
            match self.rest_query::<ChargeResponse, ()>(Method::GET, &path, None, None).await {
                Ok(r) => r,
                Err(PixApiError::QueryError { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                    return Err(PixApiError::ChargeNotFound(external_id.to_string()))
                },
                Err(e) => return Err(e),
            };
        Ok(Charge::from(result))
    }
}
