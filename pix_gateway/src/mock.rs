use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
        Mutex,
    },
};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{Charge, NewCharge, PixApiError, PixGatewayClient};

/// How long a mock charge stays `pending` before the simulated payer "pays" it.
const SETTLE_AFTER_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct MockCharge {
    charge: Charge,
    created_at: DateTime<Utc>,
    forced_status: Option<String>,
}

#[derive(Default)]
struct Inner {
    charges: Mutex<HashMap<String, MockCharge>>,
    // Seconds added to the wall clock, so tests can cross the settle window without sleeping.
    clock_offset: AtomicI64,
    next_id: AtomicI64,
}

/// In-process stand-in for the PIX provider.
///
/// Charges report `pending` until [`SETTLE_AFTER_SECS`] simulated seconds have passed, then `approved`. Tests drive
/// the simulated clock with [`MockPixGateway::fast_forward`], or pin a charge to a specific provider status with
/// [`MockPixGateway::force_status`] for failure paths.
#[derive(Clone, Default)]
pub struct MockPixGateway {
    inner: Arc<Inner>,
}

impl MockPixGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the simulated clock. Affects every charge held by the mock.
    pub fn fast_forward(&self, secs: i64) {
        self.inner.clock_offset.fetch_add(secs, Ordering::SeqCst);
    }

    /// Pin a charge to a raw provider status, overriding the simulated-payer behaviour.
    pub fn force_status(&self, external_id: &str, status: &str) {
        let mut charges = self.inner.charges.lock().expect("mock charge store poisoned");
        if let Some(c) = charges.get_mut(external_id) {
            c.forced_status = Some(status.to_string());
        }
    }

    pub fn charge_count(&self) -> usize {
        self.inner.charges.lock().expect("mock charge store poisoned").len()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.inner.clock_offset.load(Ordering::SeqCst))
    }
}

impl PixGatewayClient for MockPixGateway {
    async fn create_charge(&self, charge: NewCharge) -> Result<Charge, PixApiError> {
        if charge.amount.value() <= 0 {
            return Err(PixApiError::InvalidCurrencyAmount(charge.amount.to_string()));
        }
        let now = self.now();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let external_id = format!("mockpix-{id}");
        let qr_code = format!("00020126580014br.gov.bcb.pix0136{external_id}-{}", charge.external_reference);
        let result = Charge {
            external_id: external_id.clone(),
            status: "pending".to_string(),
            qr_code_base64: format!("bW9ja3FyOnt7{external_id}fX0="),
            qr_code,
            paid_at: None,
            expires_at: Some(now + Duration::minutes(30)),
        };
        let mock = MockCharge { charge: result.clone(), created_at: now, forced_status: None };
        let mut charges = self.inner.charges.lock().expect("mock charge store poisoned");
        charges.insert(external_id.clone(), mock);
        debug!("🧪️ Mock charge {external_id} created for {}", charge.amount);
        Ok(result)
    }

    async fn get_charge(&self, external_id: &str) -> Result<Charge, PixApiError> {
        let charges = self.inner.charges.lock().expect("mock charge store poisoned");
        let mock = charges.get(external_id).ok_or_else(|| PixApiError::ChargeNotFound(external_id.to_string()))?;
        let mut charge = mock.charge.clone();
        if let Some(status) = &mock.forced_status {
            charge.status = status.clone();
            return Ok(charge);
        }
        let settle_at = mock.created_at + Duration::seconds(SETTLE_AFTER_SECS);
        if self.now() >= settle_at {
            charge.status = "approved".to_string();
            charge.paid_at = Some(settle_at);
        }
        Ok(charge)
    }
}
