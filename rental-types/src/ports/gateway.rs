//! Payment gateway port.
//!
//! The gateway works by signed redirects: the service hands the renter a
//! URL, the gateway calls back with signed query parameters. Both directions
//! are pure computations over the shared secret, so the port is synchronous.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::Money;
use crate::error::GatewayError;

/// Input for an outbound payment redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUrlRequest {
    pub amount: Money,
    pub order_code: String,
    pub order_info: String,
    pub client_ip: String,
    /// `vn` or `en`; `None` uses the gateway default.
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A signed redirect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUrl {
    pub url: String,
    pub order_code: String,
    pub expires_at: DateTime<Utc>,
}

/// A verified inbound callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub order_code: String,
    pub amount: Money,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub pay_date: Option<String>,
}

impl GatewayCallback {
    /// `"00"` is the only success code.
    pub fn succeeded(&self) -> bool {
        self.response_code == "00"
            && self
                .transaction_status
                .as_deref()
                .is_none_or(|status| status == "00")
    }
}

pub trait PaymentGateway: Send + Sync + 'static {
    /// Builds the signed redirect URL for a payment.
    fn payment_url(&self, req: &PaymentUrlRequest) -> Result<PaymentUrl, GatewayError>;

    /// Verifies the signature of callback parameters and decodes them.
    ///
    /// Returns `GatewayError::InvalidSignature` on any mismatch.
    fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<GatewayCallback, GatewayError>;
}
