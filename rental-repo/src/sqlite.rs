//! SQLite ledger adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction as DbTransaction};
use std::str::FromStr;

use rental_types::{
    Booking, BookingId, BookingRepository, BookingStatus, DomainError, RepoError, StationId,
    Transition, UserId, Vehicle, VehicleId, VehicleStatus,
};

use crate::types::{BOOKING_COLUMNS, DbBooking, DbVehicle, fmt_ts, opt_to_json, to_json};

const ACTIVE_STATUSES: &str = "('reserved', 'pending', 'confirmed', 'in-progress')";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.create_schema().await?;
        tracing::info!(max_connections, "SQLite booking ledger ready");
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        let ddl = include_str!("../migrations/0001_create_tables.sql");
        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(())
    }

    /// Units of work start with a write, so SQLite holds the write lock for
    /// the rest of the transaction.
    async fn begin(&self) -> Result<DbTransaction<'static, Sqlite>, RepoError> {
        self.pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))
    }

    async fn fetch_one_booking(
        &self,
        filter: &str,
        value: String,
    ) -> Result<Option<Booking>, RepoError> {
        let sql = format!("SELECT {} FROM bookings WHERE {}", BOOKING_COLUMNS, filter);
        let row: Option<DbBooking> = sqlx::query_as(&sql)
            .bind(&value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbBooking::into_domain).transpose()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl BookingRepository for SqliteRepo {
    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO vehicles (id, status, price_per_hour, price_per_day, deposit, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   status = excluded.status,
                   price_per_hour = excluded.price_per_hour,
                   price_per_day = excluded.price_per_day,
                   deposit = excluded.deposit,
                   updated_at = excluded.updated_at"#,
        )
        .bind(vehicle.id.to_string())
        .bind(vehicle.status.as_str())
        .bind(vehicle.rates.price_per_hour.amount())
        .bind(vehicle.rates.price_per_day.amount())
        .bind(vehicle.rates.deposit.amount())
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, RepoError> {
        let row: Option<DbVehicle> = sqlx::query_as(
            r#"SELECT id, status, price_per_hour, price_per_day, deposit FROM vehicles WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbVehicle::into_domain).transpose()
    }

    async fn assign_staff_station(
        &self,
        staff: UserId,
        station: StationId,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO staff_stations (staff_id, station_id, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(staff_id) DO UPDATE SET
                   station_id = excluded.station_id,
                   updated_at = excluded.updated_at"#,
        )
        .bind(staff.to_string())
        .bind(station.to_string())
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn staff_station(&self, staff: UserId) -> Result<Option<StationId>, RepoError> {
        let row: Option<(String,)> =
            sqlx::query_as(r#"SELECT station_id FROM staff_stations WHERE staff_id = ?"#)
                .bind(staff.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(|(station,)| {
            station
                .parse::<StationId>()
                .map_err(|e| RepoError::Database(e.to_string()))
        })
        .transpose()
    }

    async fn create_booking(&self, booking: &Booking) -> Result<Booking, RepoError> {
        let vehicle_id = booking.vehicle_id.to_string();
        let mut db_tx = self.begin().await?;

        // 1. Claim the vehicle flag
        let claimed = sqlx::query(
            r#"UPDATE vehicles SET status = 'reserved', updated_at = ? WHERE id = ? AND status = 'available'"#,
        )
        .bind(fmt_ts(booking.created_at))
        .bind(&vehicle_id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if claimed.rows_affected() == 0 {
            let exists: Option<(String,)> =
                sqlx::query_as(r#"SELECT status FROM vehicles WHERE id = ?"#)
                    .bind(&vehicle_id)
                    .fetch_optional(&mut *db_tx)
                    .await
                    .map_err(|e| RepoError::Database(e.to_string()))?;
            return Err(match exists {
                Some(_) => DomainError::VehicleUnavailable(booking.vehicle_id).into(),
                None => RepoError::NotFound,
            });
        }

        // 2. Insert unless an active booking overlaps [start, end)
        let sql = format!(
            r#"INSERT INTO bookings ({columns})
               SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE NOT EXISTS (
                   SELECT 1 FROM bookings
                   WHERE vehicle_id = ? AND status IN {active}
                     AND start_date < ? AND end_date > ?
               )"#,
            columns = BOOKING_COLUMNS,
            active = ACTIVE_STATUSES,
        );

        let inserted = sqlx::query(&sql)
            .bind(booking.id.to_string())
            .bind(&booking.booking_number)
            .bind(booking.renter_id.to_string())
            .bind(&vehicle_id)
            .bind(booking.pickup_station_id.to_string())
            .bind(booking.return_station_id.to_string())
            .bind(fmt_ts(booking.start_date))
            .bind(fmt_ts(booking.end_date))
            .bind(booking.actual_start_date.map(fmt_ts))
            .bind(booking.actual_end_date.map(fmt_ts))
            .bind(booking.base_price.amount())
            .bind(booking.deposit.amount())
            .bind(booking.hourly_rate.amount())
            .bind(booking.total_amount.amount())
            .bind(to_json(&booking.additional_charges)?)
            .bind(to_json(&booking.payment)?)
            .bind(opt_to_json(&booking.additional_payment)?)
            .bind(opt_to_json(&booking.deposit_refund)?)
            .bind(booking.reserved_until.map(fmt_ts))
            .bind(booking.status.as_str())
            .bind(opt_to_json(&booking.cancellation)?)
            .bind(booking.approved_by.map(|id| id.to_string()))
            .bind(opt_to_json(&booking.handover)?)
            .bind(opt_to_json(&booking.return_inspection)?)
            .bind(booking.version)
            .bind(fmt_ts(booking.created_at))
            .bind(fmt_ts(booking.updated_at))
            .bind(&vehicle_id)
            .bind(fmt_ts(booking.end_date))
            .bind(fmt_ts(booking.start_date))
            .execute(&mut *db_tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepoError::Conflict(format!(
                        "Booking number {} already exists",
                        booking.booking_number
                    ))
                } else {
                    RepoError::Database(e.to_string())
                }
            })?;

        if inserted.rows_affected() == 0 {
            tracing::debug!(vehicle_id = %booking.vehicle_id, "Rental window overlaps an active booking");
            // Dropping the transaction rolls back the vehicle claim.
            return Err(DomainError::OverlappingBooking.into());
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(booking.clone())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        self.fetch_one_booking("id = ?", id.to_string()).await
    }

    async fn find_by_order_code(&self, order_code: &str) -> Result<Option<Booking>, RepoError> {
        self.fetch_one_booking(
            "? IN (payment_order_code, additional_order_code)",
            order_code.to_string(),
        )
        .await
    }

    async fn list_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepoError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = ? AND reserved_until < ? ORDER BY reserved_until",
            BOOKING_COLUMNS
        );
        let rows: Vec<DbBooking> = sqlx::query_as(&sql)
            .bind(BookingStatus::Reserved.as_str())
            .bind(fmt_ts(now))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbBooking::into_domain).collect()
    }

    async fn commit_transition(&self, transition: &Transition) -> Result<Booking, RepoError> {
        let booking = &transition.booking;
        let id = booking.id.to_string();
        let mut db_tx = self.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE bookings SET
                   actual_start_date = ?, actual_end_date = ?, additional_charges = ?,
                   payment = ?, payment_order_code = ?,
                   additional_payment = ?, additional_order_code = ?,
                   deposit_refund = ?, reserved_until = ?, status = ?, cancellation = ?,
                   approved_by = ?, handover = ?, return_inspection = ?,
                   version = version + 1, updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(booking.actual_start_date.map(fmt_ts))
        .bind(booking.actual_end_date.map(fmt_ts))
        .bind(to_json(&booking.additional_charges)?)
        .bind(to_json(&booking.payment)?)
        .bind(booking.payment.order_code.as_deref())
        .bind(opt_to_json(&booking.additional_payment)?)
        .bind(
            booking
                .additional_payment
                .as_ref()
                .and_then(|p| p.order_code.as_deref()),
        )
        .bind(opt_to_json(&booking.deposit_refund)?)
        .bind(booking.reserved_until.map(fmt_ts))
        .bind(booking.status.as_str())
        .bind(opt_to_json(&booking.cancellation)?)
        .bind(booking.approved_by.map(|id| id.to_string()))
        .bind(opt_to_json(&booking.handover)?)
        .bind(opt_to_json(&booking.return_inspection)?)
        .bind(fmt_ts(booking.updated_at))
        .bind(&id)
        .bind(booking.version)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as(r#"SELECT version FROM bookings WHERE id = ?"#)
                .bind(&id)
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
            return Err(match exists {
                Some((stored,)) => {
                    tracing::debug!(
                        booking_id = %id,
                        expected = booking.version,
                        stored,
                        "Booking changed since it was read"
                    );
                    RepoError::VersionConflict
                }
                None => RepoError::NotFound,
            });
        }

        if let Some(flag) = transition.vehicle_effect {
            write_vehicle_flag(&mut db_tx, booking.vehicle_id, flag, booking.updated_at).await?;
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let mut stored = booking.clone();
        stored.version += 1;
        Ok(stored)
    }
}

async fn write_vehicle_flag(
    db_tx: &mut DbTransaction<'static, Sqlite>,
    vehicle: VehicleId,
    flag: VehicleStatus,
    at: DateTime<Utc>,
) -> Result<(), RepoError> {
    let result = sqlx::query(r#"UPDATE vehicles SET status = ?, updated_at = ? WHERE id = ?"#)
        .bind(flag.as_str())
        .bind(fmt_ts(at))
        .bind(vehicle.to_string())
        .execute(&mut **db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(RepoError::NotFound);
    }
    Ok(())
}
