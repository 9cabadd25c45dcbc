//! Database row structs and their conversions to domain types.
//!
//! SQLite has no native timestamp or UUID type, so both are stored as text.
//! Timestamps use a fixed-width RFC 3339 form (nanoseconds, `Z` suffix) so
//! that string comparison in SQL orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::FromRow;

use rental_types::{
    Booking, BookingId, BookingStatus, Money, RepoError, StationId, UserId, Vehicle, VehicleId,
    VehicleRates, VehicleStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Column codecs
// ─────────────────────────────────────────────────────────────────────────────

pub fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepoError::Database(format!("Invalid timestamp {}: {}", value, e)))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, RepoError> {
    value.as_deref().map(parse_ts).transpose()
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, RepoError> {
    serde_json::to_string(value).map_err(|e| RepoError::Database(e.to_string()))
}

pub fn opt_to_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>, RepoError> {
    value.as_ref().map(to_json).transpose()
}

fn from_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T, RepoError> {
    serde_json::from_str(value)
        .map_err(|e| RepoError::Database(format!("Invalid {} column: {}", column, e)))
}

fn opt_from_json<T: DeserializeOwned>(
    column: &str,
    value: Option<String>,
) -> Result<Option<T>, RepoError> {
    value.as_deref().map(|v| from_json(column, v)).transpose()
}

fn parse_id<T>(column: &str, value: &str) -> Result<T, RepoError>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    value
        .parse()
        .map_err(|e| RepoError::Database(format!("Invalid {} id {}: {}", column, value, e)))
}

fn money(column: &str, value: i64) -> Result<Money, RepoError> {
    Money::new(value).map_err(|_| RepoError::Database(format!("Negative {}: {}", column, value)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Row structs
// ─────────────────────────────────────────────────────────────────────────────

/// Vehicle row from database.
#[derive(FromRow)]
pub struct DbVehicle {
    pub id: String,
    pub status: String,
    pub price_per_hour: i64,
    pub price_per_day: i64,
    pub deposit: i64,
}

impl DbVehicle {
    pub fn into_domain(self) -> Result<Vehicle, RepoError> {
        Ok(Vehicle {
            id: parse_id::<VehicleId>("vehicle", &self.id)?,
            status: self
                .status
                .parse::<VehicleStatus>()
                .map_err(RepoError::Database)?,
            rates: VehicleRates {
                price_per_hour: money("price_per_hour", self.price_per_hour)?,
                price_per_day: money("price_per_day", self.price_per_day)?,
                deposit: money("deposit", self.deposit)?,
            },
        })
    }
}

/// Booking row from database.
#[derive(FromRow)]
pub struct DbBooking {
    pub id: String,
    pub booking_number: String,
    pub renter_id: String,
    pub vehicle_id: String,
    pub pickup_station_id: String,
    pub return_station_id: String,
    pub start_date: String,
    pub end_date: String,
    pub actual_start_date: Option<String>,
    pub actual_end_date: Option<String>,
    pub base_price: i64,
    pub deposit: i64,
    pub hourly_rate: i64,
    pub total_amount: i64,
    pub additional_charges: String,
    pub payment: String,
    pub additional_payment: Option<String>,
    pub deposit_refund: Option<String>,
    pub reserved_until: Option<String>,
    pub status: String,
    pub cancellation: Option<String>,
    pub approved_by: Option<String>,
    pub handover: Option<String>,
    pub return_inspection: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Column list matching [`DbBooking`].
pub const BOOKING_COLUMNS: &str = "id, booking_number, renter_id, vehicle_id, \
    pickup_station_id, return_station_id, start_date, end_date, actual_start_date, \
    actual_end_date, base_price, deposit, hourly_rate, total_amount, additional_charges, \
    payment, additional_payment, deposit_refund, reserved_until, status, cancellation, \
    approved_by, handover, return_inspection, version, created_at, updated_at";

impl DbBooking {
    pub fn into_domain(self) -> Result<Booking, RepoError> {
        Ok(Booking {
            id: parse_id::<BookingId>("booking", &self.id)?,
            booking_number: self.booking_number,
            renter_id: parse_id::<UserId>("renter", &self.renter_id)?,
            vehicle_id: parse_id::<VehicleId>("vehicle", &self.vehicle_id)?,
            pickup_station_id: parse_id::<StationId>("station", &self.pickup_station_id)?,
            return_station_id: parse_id::<StationId>("station", &self.return_station_id)?,
            start_date: parse_ts(&self.start_date)?,
            end_date: parse_ts(&self.end_date)?,
            actual_start_date: parse_opt_ts(self.actual_start_date)?,
            actual_end_date: parse_opt_ts(self.actual_end_date)?,
            base_price: money("base_price", self.base_price)?,
            deposit: money("deposit", self.deposit)?,
            hourly_rate: money("hourly_rate", self.hourly_rate)?,
            additional_charges: from_json("additional_charges", &self.additional_charges)?,
            total_amount: money("total_amount", self.total_amount)?,
            payment: from_json("payment", &self.payment)?,
            additional_payment: opt_from_json("additional_payment", self.additional_payment)?,
            deposit_refund: opt_from_json("deposit_refund", self.deposit_refund)?,
            reserved_until: parse_opt_ts(self.reserved_until)?,
            status: self
                .status
                .parse::<BookingStatus>()
                .map_err(RepoError::Database)?,
            cancellation: opt_from_json("cancellation", self.cancellation)?,
            approved_by: self
                .approved_by
                .as_deref()
                .map(|id| parse_id::<UserId>("approved_by", id))
                .transpose()?,
            handover: opt_from_json("handover", self.handover)?,
            return_inspection: opt_from_json("return_inspection", self.return_inspection)?,
            version: self.version,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier: DateTime<Utc> = "2026-03-01T08:00:00Z".parse().unwrap();
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(fmt_ts(earlier) < fmt_ts(later));
        assert_eq!(fmt_ts(earlier), "2026-03-01T08:00:00.000000000Z");
        assert_eq!(parse_ts(&fmt_ts(later)).unwrap(), later);
    }
}
