//! VNPay Protocol Adapter
//!
//! Builds signed payment redirect URLs and verifies signed callbacks.
//! The adapter holds no state beyond its configuration, so one instance can
//! be shared freely across request handlers.
//!
//! # Signing scheme
//!
//! 1. Drop empty parameters and sort the rest by key.
//! 2. Serialize as `key=encode(value)` joined by `&`, where `encode`
//!    percent-encodes everything except `A-Z a-z 0-9 - _ . ~` and turns
//!    spaces into `+`.
//! 3. HMAC-SHA-512 the UTF-8 bytes with the merchant secret and append the
//!    lowercase hex digest as `vnp_SecureHash`.
//!
//! The gateway computes the same string on its side, so the encoding must
//! match byte for byte.
//!
//! # Example
//! ```
//! use vnpay_gateway::{VnpayConfig, VnpayGateway};
//! use rental_types::ports::{PaymentGateway, PaymentUrlRequest};
//! use rental_types::Money;
//!
//! let gateway = VnpayGateway::new(VnpayConfig {
//!     tmn_code: "DEMOTMN1".into(),
//!     hash_secret: "secret".into(),
//!     payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
//!     return_url: "http://localhost:3000/api/payments/vnpay/return".into(),
//!     api_url: "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".into(),
//!     utc_offset_hours: 7,
//! })
//! .unwrap();
//!
//! let link = gateway
//!     .payment_url(&PaymentUrlRequest {
//!         amount: Money::new(900_000).unwrap(),
//!         order_code: "BK20260301ABC123-1".into(),
//!         order_info: "Thanh toan dat xe".into(),
//!         client_ip: "::1".into(),
//!         locale: None,
//!         created_at: chrono::Utc::now(),
//!     })
//!     .unwrap();
//! assert!(link.url.contains("vnp_SecureHash="));
//! ```

mod ipn;
mod signing;

pub use ipn::IpnCode;
pub use signing::{canonical_query, encode_value, hmac_sha512_hex};

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use subtle::ConstantTimeEq;

use rental_types::GatewayError;
use rental_types::Money;
use rental_types::ports::{GatewayCallback, PaymentGateway, PaymentUrl, PaymentUrlRequest};

pub const VERSION: &str = "2.1.0";
pub const COMMAND_PAY: &str = "pay";
pub const CURRENCY: &str = "VND";
pub const ORDER_TYPE: &str = "other";
pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

/// Lifetime of a redirect URL, enforced by the gateway.
pub const PAYMENT_URL_TTL_MINUTES: i64 = 15;

const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Merchant configuration. Every field except the offset is required.
#[derive(Debug, Clone)]
pub struct VnpayConfig {
    /// Merchant (terminal) code, `vnp_TmnCode`.
    pub tmn_code: String,
    /// Shared HMAC secret.
    pub hash_secret: String,
    /// Gateway base URL the renter is redirected to.
    pub payment_url: String,
    /// Where the gateway sends the renter's browser afterwards.
    pub return_url: String,
    /// Transaction query / refund API. Those calls are not implemented;
    /// the URL is still part of the merchant configuration.
    pub api_url: String,
    /// Timezone of `vnp_CreateDate` / `vnp_ExpireDate`, in hours from UTC.
    pub utc_offset_hours: i32,
}

/// Stateless VNPay adapter.
#[derive(Debug, Clone)]
pub struct VnpayGateway {
    config: VnpayConfig,
    offset: FixedOffset,
}

impl VnpayGateway {
    pub fn new(config: VnpayConfig) -> Result<Self, GatewayError> {
        for (name, value) in [
            ("tmn_code", &config.tmn_code),
            ("hash_secret", &config.hash_secret),
            ("payment_url", &config.payment_url),
            ("return_url", &config.return_url),
            ("api_url", &config.api_url),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::Config(format!("{} must not be empty", name)));
            }
        }

        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            GatewayError::Config(format!(
                "invalid UTC offset: {} hours",
                config.utc_offset_hours
            ))
        })?;

        Ok(Self { config, offset })
    }

    pub fn config(&self) -> &VnpayConfig {
        &self.config
    }

    /// Formats an instant the way the gateway expects (`yyyyMMddHHmmss`, local time).
    pub fn format_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format(DATE_FORMAT).to_string()
    }

    /// Computes `vnp_SecureHash` for a parameter set.
    ///
    /// Hash fields in `params` are ignored.
    pub fn secure_hash(&self, params: &BTreeMap<String, String>) -> String {
        let unsigned: BTreeMap<&str, &str> = params
            .iter()
            .filter(|(k, _)| k.as_str() != SECURE_HASH && k.as_str() != SECURE_HASH_TYPE)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        hmac_sha512_hex(&self.config.hash_secret, &canonical_query(&unsigned))
    }

    fn outbound_params(
        &self,
        req: &PaymentUrlRequest,
        wire_amount: i64,
    ) -> BTreeMap<&'static str, String> {
        let expires_at = req.created_at + Duration::minutes(PAYMENT_URL_TTL_MINUTES);

        BTreeMap::from([
            ("vnp_Version", VERSION.to_string()),
            ("vnp_Command", COMMAND_PAY.to_string()),
            ("vnp_TmnCode", self.config.tmn_code.clone()),
            ("vnp_Locale", normalize_locale(req.locale.as_deref()).to_string()),
            ("vnp_CurrCode", CURRENCY.to_string()),
            ("vnp_TxnRef", req.order_code.clone()),
            ("vnp_OrderInfo", req.order_info.clone()),
            ("vnp_OrderType", ORDER_TYPE.to_string()),
            ("vnp_Amount", wire_amount.to_string()),
            ("vnp_ReturnUrl", self.config.return_url.clone()),
            ("vnp_IpAddr", normalize_ip(&req.client_ip)),
            ("vnp_CreateDate", self.format_date(req.created_at)),
            ("vnp_ExpireDate", self.format_date(expires_at)),
        ])
    }
}

impl PaymentGateway for VnpayGateway {
    fn payment_url(&self, req: &PaymentUrlRequest) -> Result<PaymentUrl, GatewayError> {
        if req.order_code.trim().is_empty() {
            return Err(GatewayError::MissingField("vnp_TxnRef"));
        }
        if req.amount.is_zero() {
            return Err(GatewayError::InvalidField {
                field: "vnp_Amount",
                value: "0".into(),
            });
        }

        // The wire amount is in hundredths of a đồng.
        let wire_amount =
            req.amount
                .amount()
                .checked_mul(100)
                .ok_or_else(|| GatewayError::InvalidField {
                    field: "vnp_Amount",
                    value: req.amount.amount().to_string(),
                })?;

        let params = self.outbound_params(req, wire_amount);
        let borrowed: BTreeMap<&str, &str> =
            params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let query = canonical_query(&borrowed);
        let hash = hmac_sha512_hex(&self.config.hash_secret, &query);

        Ok(PaymentUrl {
            url: format!(
                "{}?{}&{}={}",
                self.config.payment_url, query, SECURE_HASH, hash
            ),
            order_code: req.order_code.clone(),
            expires_at: req.created_at + Duration::minutes(PAYMENT_URL_TTL_MINUTES),
        })
    }

    fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<GatewayCallback, GatewayError> {
        let supplied = params
            .get(SECURE_HASH)
            .filter(|h| !h.is_empty())
            .ok_or(GatewayError::InvalidSignature)?;

        let expected = self.secure_hash(params);
        let matches: bool = expected
            .as_bytes()
            .ct_eq(supplied.to_ascii_lowercase().as_bytes())
            .into();
        if !matches {
            tracing::debug!(order_code = ?params.get("vnp_TxnRef"), "callback signature mismatch");
            return Err(GatewayError::InvalidSignature);
        }

        let field = |name: &'static str| params.get(name).filter(|v| !v.is_empty()).cloned();
        let required =
            |name: &'static str| field(name).ok_or(GatewayError::MissingField(name));

        if let Some(tmn) = field("vnp_TmnCode") {
            if tmn != self.config.tmn_code {
                return Err(GatewayError::InvalidField {
                    field: "vnp_TmnCode",
                    value: tmn,
                });
            }
        }

        let raw_amount = required("vnp_Amount")?;
        let scaled: i64 = raw_amount.parse().map_err(|_| GatewayError::InvalidField {
            field: "vnp_Amount",
            value: raw_amount.clone(),
        })?;
        if scaled % 100 != 0 {
            return Err(GatewayError::InvalidField {
                field: "vnp_Amount",
                value: raw_amount,
            });
        }
        let amount = Money::new(scaled / 100).map_err(|_| GatewayError::InvalidField {
            field: "vnp_Amount",
            value: raw_amount.clone(),
        })?;

        Ok(GatewayCallback {
            order_code: required("vnp_TxnRef")?,
            amount,
            response_code: required("vnp_ResponseCode")?,
            transaction_status: field("vnp_TransactionStatus"),
            transaction_no: field("vnp_TransactionNo"),
            bank_code: field("vnp_BankCode"),
            pay_date: field("vnp_PayDate"),
        })
    }
}

/// Local and IPv4-mapped addresses are reported as plain IPv4.
pub fn normalize_ip(ip: &str) -> String {
    let ip = ip.trim();
    match ip {
        "" | "::1" | "::ffff:127.0.0.1" | "localhost" => "127.0.0.1".to_string(),
        _ => ip.strip_prefix("::ffff:").unwrap_or(ip).to_string(),
    }
}

fn normalize_locale(locale: Option<&str>) -> &'static str {
    match locale {
        Some(l) if l.eq_ignore_ascii_case("en") => "en",
        _ => "vn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "TESTSECRETKEY123";

    fn gateway() -> VnpayGateway {
        VnpayGateway::new(VnpayConfig {
            tmn_code: "DEMOTMN1".into(),
            hash_secret: SECRET.into(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "http://localhost:3000/api/payments/vnpay/return".into(),
            api_url: "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".into(),
            utc_offset_hours: 7,
        })
        .unwrap()
    }

    fn request() -> PaymentUrlRequest {
        PaymentUrlRequest {
            amount: Money::new(900_000).unwrap(),
            order_code: "BK20260301ABC123-1".into(),
            order_info: "Thanh toan dat xe BK20260301ABC123".into(),
            client_ip: "::1".into(),
            locale: None,
            created_at: "2026-03-01T08:00:00Z".parse().unwrap(),
        }
    }

    fn query_params(url: &str) -> BTreeMap<String, String> {
        let query = url.split_once('?').unwrap().1;
        query
            .split('&')
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap();
                let v = urlencoding::decode(&v.replace('+', " ")).unwrap().into_owned();
                (k.to_string(), v)
            })
            .collect()
    }

    #[test]
    fn test_payment_url_matches_known_signature() {
        let link = gateway().payment_url(&request()).unwrap();

        let expected_query = "vnp_Amount=90000000&vnp_Command=pay&vnp_CreateDate=20260301150000\
            &vnp_CurrCode=VND&vnp_ExpireDate=20260301151500&vnp_IpAddr=127.0.0.1&vnp_Locale=vn\
            &vnp_OrderInfo=Thanh+toan+dat+xe+BK20260301ABC123&vnp_OrderType=other\
            &vnp_ReturnUrl=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Fpayments%2Fvnpay%2Freturn\
            &vnp_TmnCode=DEMOTMN1&vnp_TxnRef=BK20260301ABC123-1&vnp_Version=2.1.0";
        let expected_hash = "221e651fd561922a939904a07c597eae7c14c81d7bb0410984d13cdcafb5cdb0\
            dbc9e3d83ace5f025f311e12af3ef3276d42b5053e7004b1b21894dc3b8dece9";

        assert_eq!(
            link.url,
            format!(
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?{}&vnp_SecureHash={}",
                expected_query, expected_hash
            )
        );
        assert_eq!(
            link.expires_at,
            "2026-03-01T08:15:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_redirect_params_verify_as_callback() {
        let link = gateway().payment_url(&request()).unwrap();
        let mut params = query_params(&link.url);
        params.insert("vnp_ResponseCode".into(), "00".into());
        params.insert("vnp_TransactionStatus".into(), "00".into());
        let hash = gateway().secure_hash(&params);
        params.insert(SECURE_HASH.into(), hash);

        let callback = gateway().verify_callback(&params).unwrap();
        assert_eq!(callback.order_code, "BK20260301ABC123-1");
        assert_eq!(callback.amount.amount(), 900_000);
        assert!(callback.succeeded());
    }

    fn signed_callback(response_code: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::from([
            ("vnp_Amount".to_string(), "20000000".to_string()),
            ("vnp_BankCode".to_string(), "NCB".to_string()),
            ("vnp_OrderInfo".to_string(), "Thanh toan phi phat sinh".to_string()),
            ("vnp_PayDate".to_string(), "20260301170501".to_string()),
            ("vnp_ResponseCode".to_string(), response_code.to_string()),
            ("vnp_TmnCode".to_string(), "DEMOTMN1".to_string()),
            ("vnp_TransactionNo".to_string(), "14312345".to_string()),
            ("vnp_TransactionStatus".to_string(), response_code.to_string()),
            ("vnp_TxnRef".to_string(), "BK20260301ABC123-ADD".to_string()),
        ]);
        let hash = gateway().secure_hash(&params);
        params.insert(SECURE_HASH.to_string(), hash);
        params.insert(SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());
        params
    }

    #[test]
    fn test_failed_response_code_is_preserved() {
        let callback = gateway().verify_callback(&signed_callback("24")).unwrap();
        assert!(!callback.succeeded());
        assert_eq!(callback.response_code, "24");
        assert_eq!(callback.amount.amount(), 200_000);
    }

    #[test]
    fn test_uppercase_hash_is_accepted() {
        let mut params = signed_callback("00");
        let upper = params[SECURE_HASH].to_ascii_uppercase();
        params.insert(SECURE_HASH.into(), upper);
        assert!(gateway().verify_callback(&params).is_ok());
    }

    #[test]
    fn test_any_tampered_field_fails_verification() {
        let original = signed_callback("00");
        for key in original.keys().filter(|k| k.as_str() != SECURE_HASH && k.as_str() != SECURE_HASH_TYPE) {
            let mut tampered = original.clone();
            tampered.insert(key.clone(), format!("{}9", original[key]));
            assert_eq!(
                gateway().verify_callback(&tampered),
                Err(GatewayError::InvalidSignature),
                "tampering {} must be detected",
                key
            );
        }
    }

    #[test]
    fn test_missing_or_foreign_hash_fails() {
        let mut params = signed_callback("00");
        params.remove(SECURE_HASH);
        assert_eq!(
            gateway().verify_callback(&params),
            Err(GatewayError::InvalidSignature)
        );

        let other = VnpayGateway::new(VnpayConfig {
            hash_secret: "another-secret".into(),
            ..gateway().config().clone()
        })
        .unwrap();
        assert_eq!(
            other.verify_callback(&signed_callback("00")),
            Err(GatewayError::InvalidSignature)
        );
    }

    #[test]
    fn test_amount_too_large_for_wire_format_is_rejected() {
        let mut req = request();
        req.amount = Money::new(100_000_000_000_000_000).unwrap();

        let result = gateway().payment_url(&req);

        assert!(matches!(
            result,
            Err(GatewayError::InvalidField {
                field: "vnp_Amount",
                ..
            })
        ));
    }

    #[test]
    fn test_normalize_ip() {
        assert_eq!(normalize_ip("::1"), "127.0.0.1");
        assert_eq!(normalize_ip(""), "127.0.0.1");
        assert_eq!(normalize_ip("::ffff:10.0.0.7"), "10.0.0.7");
        assert_eq!(normalize_ip("203.0.113.9"), "203.0.113.9");
    }

    #[test]
    fn test_empty_config_is_rejected() {
        let result = VnpayGateway::new(VnpayConfig {
            hash_secret: " ".into(),
            ..gateway().config().clone()
        });
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}
