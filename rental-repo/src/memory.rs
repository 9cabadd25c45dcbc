//! In-memory ledger adapter.
//!
//! All state sits behind one mutex, so every method is a single atomic unit.
//! Used by the `memory://` database URL and by service tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rental_types::{
    Booking, BookingId, BookingRepository, BookingStatus, DomainError, RepoError, StationId,
    Transition, UserId, Vehicle, VehicleId, VehicleStatus,
};

#[derive(Default)]
struct State {
    vehicles: HashMap<VehicleId, Vehicle>,
    staff_stations: HashMap<UserId, StationId>,
    bookings: HashMap<BookingId, Booking>,
}

#[derive(Default)]
pub struct InMemoryRepo {
    state: Mutex<State>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepoError> {
        self.state
            .lock()
            .map_err(|_| RepoError::Database("in-memory ledger lock poisoned".into()))
    }
}

fn overlaps(a: &Booking, b: &Booking) -> bool {
    a.start_date < b.end_date && b.start_date < a.end_date
}

#[async_trait]
impl BookingRepository for InMemoryRepo {
    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<(), RepoError> {
        self.lock()?.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn get_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, RepoError> {
        Ok(self.lock()?.vehicles.get(&id).cloned())
    }

    async fn assign_staff_station(
        &self,
        staff: UserId,
        station: StationId,
    ) -> Result<(), RepoError> {
        self.lock()?.staff_stations.insert(staff, station);
        Ok(())
    }

    async fn staff_station(&self, staff: UserId) -> Result<Option<StationId>, RepoError> {
        Ok(self.lock()?.staff_stations.get(&staff).copied())
    }

    async fn create_booking(&self, booking: &Booking) -> Result<Booking, RepoError> {
        let mut state = self.lock()?;

        let vehicle = state
            .vehicles
            .get(&booking.vehicle_id)
            .ok_or(RepoError::NotFound)?;
        if vehicle.status != VehicleStatus::Available {
            return Err(DomainError::VehicleUnavailable(booking.vehicle_id).into());
        }

        let clash = state.bookings.values().any(|existing| {
            existing.vehicle_id == booking.vehicle_id
                && existing.status.is_active()
                && overlaps(existing, booking)
        });
        if clash {
            return Err(DomainError::OverlappingBooking.into());
        }

        if state
            .bookings
            .values()
            .any(|b| b.booking_number == booking.booking_number)
        {
            return Err(RepoError::Conflict(format!(
                "Booking number {} already exists",
                booking.booking_number
            )));
        }

        if let Some(vehicle) = state.vehicles.get_mut(&booking.vehicle_id) {
            vehicle.status = VehicleStatus::Reserved;
        }
        state.bookings.insert(booking.id, booking.clone());

        Ok(booking.clone())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    async fn find_by_order_code(&self, order_code: &str) -> Result<Option<Booking>, RepoError> {
        let state = self.lock()?;
        Ok(state
            .bookings
            .values()
            .find(|b| {
                b.payment.order_code.as_deref() == Some(order_code)
                    || b
                        .additional_payment
                        .as_ref()
                        .and_then(|p| p.order_code.as_deref())
                        == Some(order_code)
            })
            .cloned())
    }

    async fn list_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepoError> {
        let state = self.lock()?;
        let mut expired: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Reserved && b.reserved_until.is_some_and(|t| t < now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.reserved_until);
        Ok(expired)
    }

    async fn commit_transition(&self, transition: &Transition) -> Result<Booking, RepoError> {
        let mut state = self.lock()?;
        let booking = &transition.booking;

        let current = state
            .bookings
            .get(&booking.id)
            .ok_or(RepoError::NotFound)?;
        if current.version != booking.version {
            return Err(RepoError::VersionConflict);
        }

        if let Some(flag) = transition.vehicle_effect {
            let vehicle = state
                .vehicles
                .get_mut(&booking.vehicle_id)
                .ok_or(RepoError::NotFound)?;
            vehicle.status = flag;
        }

        let mut stored = booking.clone();
        stored.version += 1;
        state.bookings.insert(stored.id, stored.clone());

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rental_types::{Money, NewBooking, VehicleRates};

    fn vehicle() -> Vehicle {
        Vehicle {
            id: VehicleId::new(),
            status: VehicleStatus::Available,
            rates: VehicleRates {
                price_per_hour: Money::new(100_000).unwrap(),
                price_per_day: Money::new(800_000).unwrap(),
                deposit: Money::new(500_000).unwrap(),
            },
        }
    }

    fn reserve(vehicle: &Vehicle, start: DateTime<Utc>, hours: i64) -> Booking {
        let station = StationId::new();
        Booking::reserve(
            NewBooking {
                renter_id: UserId::new(),
                vehicle_id: vehicle.id,
                pickup_station_id: station,
                return_station_id: station,
                start_date: start,
                end_date: start + Duration::hours(hours),
            },
            &vehicle.rates,
            Duration::minutes(5),
            start - Duration::hours(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let repo = InMemoryRepo::new();
        let v = vehicle();
        repo.upsert_vehicle(&v).await.unwrap();
        let start = Utc::now() + Duration::hours(2);
        let booking = repo.create_booking(&reserve(&v, start, 4)).await.unwrap();

        let expire = booking.apply(rental_types::BookingEvent::Expire, start).unwrap();
        repo.commit_transition(&expire).await.unwrap();

        let again = repo.commit_transition(&expire).await;
        assert!(matches!(again, Err(RepoError::VersionConflict)));
    }

    #[tokio::test]
    async fn test_vehicle_flag_blocks_second_booking() {
        let repo = InMemoryRepo::new();
        let v = vehicle();
        repo.upsert_vehicle(&v).await.unwrap();
        let start = Utc::now() + Duration::hours(2);
        repo.create_booking(&reserve(&v, start, 4)).await.unwrap();

        let second = repo
            .create_booking(&reserve(&v, start + Duration::days(2), 4))
            .await;
        assert!(matches!(
            second,
            Err(RepoError::Domain(DomainError::VehicleUnavailable(_)))
        ));
    }
}
