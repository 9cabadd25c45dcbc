//! Booking ledger port.
//!
//! Adapters (SQLite, in-memory) implement this trait. Every write that
//! changes a booking also carries the vehicle flag change it implies, and
//! both land in the same atomic unit.

use chrono::{DateTime, Utc};

use crate::domain::{Booking, BookingId, StationId, Transition, UserId, Vehicle, VehicleId};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait BookingRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Reference data mirrored from the catalog / staff directory
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts or replaces the ledger's copy of a vehicle.
    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<(), RepoError>;

    async fn get_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, RepoError>;

    /// Records the station a staff member works at.
    async fn assign_staff_station(&self, staff: UserId, station: StationId)
    -> Result<(), RepoError>;

    async fn staff_station(&self, staff: UserId) -> Result<Option<StationId>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Bookings (writes MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts a freshly reserved booking and flags its vehicle `reserved`.
    ///
    /// Fails with `VehicleUnavailable` when the vehicle flag is not
    /// `available` and with `OverlappingBooking` when an active booking of
    /// the same vehicle overlaps the window. The checks and the insert are
    /// one atomic unit.
    async fn create_booking(&self, booking: &Booking) -> Result<Booking, RepoError>;

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError>;

    /// Finds the booking whose rental or additional payment carries `order_code`.
    async fn find_by_order_code(&self, order_code: &str) -> Result<Option<Booking>, RepoError>;

    /// Bookings still `reserved` whose hold ended before `now`.
    async fn list_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepoError>;

    /// Persists a transition as one unit of work.
    ///
    /// The write only succeeds if the stored version still equals
    /// `transition.booking.version`; otherwise `RepoError::VersionConflict`
    /// is returned and nothing is written. On success the stored version is
    /// incremented, the vehicle effect (if any) is applied, and the stored
    /// booking is returned.
    async fn commit_transition(&self, transition: &Transition) -> Result<Booking, RepoError>;
}
