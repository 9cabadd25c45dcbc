//! Ledger-side mirror of a catalog vehicle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::VehicleId;
use super::money::Money;
use super::status::VehicleStatus;
use crate::error::DomainError;

/// Prices snapshotted into a booking at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VehicleRates {
    #[schema(value_type = i64, example = 100000)]
    pub price_per_hour: Money,
    #[schema(value_type = i64, example = 800000)]
    pub price_per_day: Money,
    #[schema(value_type = i64, example = 500000)]
    pub deposit: Money,
}

impl VehicleRates {
    /// Base rental price for `[start, end)`.
    ///
    /// Full days are billed at the daily price; the remaining hours at the
    /// hourly price, capped at one day.
    pub fn quote(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Money, DomainError> {
        let seconds = (end - start).num_seconds();
        if seconds <= 0 {
            return Err(DomainError::ValidationError(
                "Rental window must end after it starts".into(),
            ));
        }

        let hours = (seconds + 3599) / 3600;
        let days = hours / 24;
        let remainder = hours % 24;

        let day_part = days.saturating_mul(self.price_per_day.amount());
        let hour_part = remainder
            .saturating_mul(self.price_per_hour.amount())
            .min(self.price_per_day.amount());

        Money::new(day_part.saturating_add(hour_part))
    }
}

/// The availability flag and pricing the ledger keeps for a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Vehicle {
    pub id: VehicleId,
    pub status: VehicleStatus,
    pub rates: VehicleRates,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rates() -> VehicleRates {
        VehicleRates {
            price_per_hour: Money::new(100_000).unwrap(),
            price_per_day: Money::new(800_000).unwrap(),
            deposit: Money::new(500_000).unwrap(),
        }
    }

    #[test]
    fn test_quote_hours_and_days() {
        let start: DateTime<Utc> = "2026-03-01T08:00:00Z".parse().unwrap();

        let three_hours = rates().quote(start, start + Duration::hours(3)).unwrap();
        assert_eq!(three_hours.amount(), 300_000);

        // 10 hours would be 1,000,000 but is capped at the daily price.
        let ten_hours = rates().quote(start, start + Duration::hours(10)).unwrap();
        assert_eq!(ten_hours.amount(), 800_000);

        let day_and_two = rates().quote(start, start + Duration::hours(26)).unwrap();
        assert_eq!(day_and_two.amount(), 1_000_000);

        let partial = rates()
            .quote(start, start + Duration::minutes(61))
            .unwrap();
        assert_eq!(partial.amount(), 200_000);
    }

    #[test]
    fn test_quote_rejects_empty_window() {
        let start: DateTime<Utc> = "2026-03-01T08:00:00Z".parse().unwrap();
        assert!(rates().quote(start, start).is_err());
    }
}
