//! # Rental Repository
//!
//! Booking ledger adapters implementing the `BookingRepository` port.
//! `sqlite://` URLs use the SQLite adapter (feature `sqlite`), `memory://`
//! uses an in-process ledger that is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_types::{
    Booking, BookingId, BookingRepository, RepoError, StationId, Transition, UserId, Vehicle,
    VehicleId,
};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
mod types;

#[cfg(feature = "sqlite")]
#[cfg(test)]
mod sqlite_tests;

pub use memory::InMemoryRepo;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepo;

/// Unified repository wrapper selected by database URL.
pub enum Repo {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteRepo),
    Memory(InMemoryRepo),
}

/// Build and initialize a repository from a database URL.
///
/// # Examples
///
/// ```ignore
/// let repo = build_repo("sqlite://data/rental.db?mode=rwc").await?;
/// let repo = build_repo("memory://").await?;
/// ```
pub async fn build_repo(database_url: &str) -> anyhow::Result<Repo> {
    Repo::new(database_url).await
}

impl Repo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        if database_url.starts_with("memory:") {
            return Ok(Repo::Memory(InMemoryRepo::new()));
        }

        #[cfg(feature = "sqlite")]
        if database_url.starts_with("sqlite:") {
            return Ok(Repo::Sqlite(SqliteRepo::new(database_url).await?));
        }

        anyhow::bail!("Unsupported DATABASE_URL scheme: {}", database_url)
    }

    fn inner(&self) -> &dyn BookingRepository {
        match self {
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(repo) => repo,
            Repo::Memory(repo) => repo,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implement BookingRepository for Repo (delegation)
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl BookingRepository for Repo {
    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<(), RepoError> {
        self.inner().upsert_vehicle(vehicle).await
    }

    async fn get_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, RepoError> {
        self.inner().get_vehicle(id).await
    }

    async fn assign_staff_station(
        &self,
        staff: UserId,
        station: StationId,
    ) -> Result<(), RepoError> {
        self.inner().assign_staff_station(staff, station).await
    }

    async fn staff_station(&self, staff: UserId) -> Result<Option<StationId>, RepoError> {
        self.inner().staff_station(staff).await
    }

    async fn create_booking(&self, booking: &Booking) -> Result<Booking, RepoError> {
        self.inner().create_booking(booking).await
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        self.inner().get_booking(id).await
    }

    async fn find_by_order_code(&self, order_code: &str) -> Result<Option<Booking>, RepoError> {
        self.inner().find_by_order_code(order_code).await
    }

    async fn list_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepoError> {
        self.inner().list_expired_reservations(now).await
    }

    async fn commit_transition(&self, transition: &Transition) -> Result<Booking, RepoError> {
        self.inner().commit_transition(transition).await
    }
}
