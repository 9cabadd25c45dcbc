//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use rental_hex::BookingPolicy;
use rental_types::domain::LateFeePolicy;
use vnpay_gateway::VnpayConfig;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub vnpay: VnpayConfig,
    pub reservation_hold: Duration,
    pub sweep_interval: Duration,
    pub refund_tolerance: i64,
    pub late_fee_multiplier_percent: i64,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = optional("PORT", 3000)?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let vnpay = VnpayConfig {
            tmn_code: required("VNP_TMN_CODE")?,
            hash_secret: required("VNP_HASH_SECRET")?,
            payment_url: required("VNP_URL")?,
            return_url: required("VNP_RETURN_URL")?,
            api_url: required("VNP_API")?,
            utc_offset_hours: optional("VNP_UTC_OFFSET_HOURS", 7)?,
        };

        let hold_secs: u64 = optional("RESERVATION_HOLD_SECS", 300)?;
        if hold_secs == 0 {
            anyhow::bail!("RESERVATION_HOLD_SECS must be positive");
        }

        let refund_tolerance: i64 = optional("REFUND_TOLERANCE", 1)?;
        if refund_tolerance < 0 {
            anyhow::bail!("REFUND_TOLERANCE cannot be negative");
        }

        let late_fee_multiplier_percent: i64 = optional("LATE_FEE_MULTIPLIER_PERCENT", 150)?;
        if late_fee_multiplier_percent < 0 {
            anyhow::bail!("LATE_FEE_MULTIPLIER_PERCENT cannot be negative");
        }

        Ok(Self {
            port,
            database_url,
            vnpay,
            reservation_hold: Duration::from_secs(hold_secs),
            sweep_interval: Duration::from_secs(optional("SWEEP_INTERVAL_SECS", 60)?),
            refund_tolerance,
            late_fee_multiplier_percent,
            rate_limit_per_minute: optional("RATE_LIMIT_PER_MINUTE", 100)?,
        })
    }

    /// Business knobs handed to the booking service.
    pub fn policy(&self) -> anyhow::Result<BookingPolicy> {
        Ok(BookingPolicy {
            reservation_hold: chrono::Duration::from_std(self.reservation_hold)?,
            refund_tolerance: self.refund_tolerance,
            late_fee: LateFeePolicy {
                multiplier_percent: self.late_fee_multiplier_percent,
            },
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} environment variable is required", name))
}

fn optional<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        Err(_) => Ok(default),
    }
}
