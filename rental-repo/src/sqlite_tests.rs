//! SQLite ledger integration tests.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rental_types::{
        Booking, BookingEvent, BookingRepository, BookingStatus, DomainError, Money, NewBooking,
        RepoError, StationId, UserId, Vehicle, VehicleId, VehicleRates, VehicleStatus,
    };

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn t0() -> DateTime<Utc> {
        "2026-03-01T08:00:00Z".parse().unwrap()
    }

    async fn seed_vehicle(repo: &SqliteRepo) -> Vehicle {
        let vehicle = Vehicle {
            id: VehicleId::new(),
            status: VehicleStatus::Available,
            rates: VehicleRates {
                price_per_hour: Money::new(100_000).unwrap(),
                price_per_day: Money::new(800_000).unwrap(),
                deposit: Money::new(500_000).unwrap(),
            },
        };
        repo.upsert_vehicle(&vehicle).await.unwrap();
        vehicle
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
            t0(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_booking() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let booking = reserve(&vehicle, t0() + Duration::hours(1), 10);

        repo.create_booking(&booking).await.unwrap();

        let fetched = repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(fetched, booking);
        assert_eq!(fetched.total_amount.amount(), 1_300_000);

        let stored_vehicle = repo.get_vehicle(vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored_vehicle.status, VehicleStatus::Reserved);
    }

    #[tokio::test]
    async fn test_get_booking_not_found() {
        let repo = setup_repo().await;

        let result = repo.get_booking(rental_types::BookingId::new()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_for_unknown_vehicle() {
        let repo = setup_repo().await;
        let ghost = Vehicle {
            id: VehicleId::new(),
            status: VehicleStatus::Available,
            rates: VehicleRates {
                price_per_hour: Money::new(1).unwrap(),
                price_per_day: Money::new(1).unwrap(),
                deposit: Money::ZERO,
            },
        };

        let result = repo.create_booking(&reserve(&ghost, t0(), 2)).await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn test_unavailable_vehicle_is_refused() {
        let repo = setup_repo().await;
        let mut vehicle = seed_vehicle(&repo).await;
        vehicle.status = VehicleStatus::Maintenance;
        repo.upsert_vehicle(&vehicle).await.unwrap();

        let result = repo.create_booking(&reserve(&vehicle, t0(), 2)).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::VehicleUnavailable(id))) if id == vehicle.id
        ));
    }

    #[tokio::test]
    async fn test_overlapping_booking_is_refused_and_rolled_back() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let first = reserve(&vehicle, t0() + Duration::hours(1), 10);
        repo.create_booking(&first).await.unwrap();

        // The catalog flips the flag back while the first booking is active.
        repo.upsert_vehicle(&vehicle).await.unwrap();

        let second = reserve(&vehicle, t0() + Duration::hours(5), 10);
        let result = repo.create_booking(&second).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::OverlappingBooking))
        ));

        assert!(repo.get_booking(second.id).await.unwrap().is_none());
        let flag = repo.get_vehicle(vehicle.id).await.unwrap().unwrap().status;
        assert_eq!(flag, VehicleStatus::Available);
    }

    #[tokio::test]
    async fn test_adjacent_windows_do_not_overlap() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let first = reserve(&vehicle, t0() + Duration::hours(1), 10);
        repo.create_booking(&first).await.unwrap();
        repo.upsert_vehicle(&vehicle).await.unwrap();

        let second = reserve(&vehicle, first.end_date, 4);
        repo.create_booking(&second).await.unwrap();

        let stored = repo.get_booking(second.id).await.unwrap().unwrap();
        assert_eq!(stored.start_date, first.end_date);
        assert!(repo.get_booking(first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_transition_applies_vehicle_effect() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let booking = repo
            .create_booking(&reserve(&vehicle, t0() + Duration::hours(1), 10))
            .await
            .unwrap();

        let expired_at = t0() + Duration::minutes(6);
        let transition = booking.apply(BookingEvent::Expire, expired_at).unwrap();
        let stored = repo.commit_transition(&transition).await.unwrap();

        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.version, 1);
        assert_eq!(repo.get_booking(booking.id).await.unwrap().unwrap(), stored);
        let flag = repo.get_vehicle(vehicle.id).await.unwrap().unwrap().status;
        assert_eq!(flag, VehicleStatus::Available);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_writes_nothing() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let booking = repo
            .create_booking(&reserve(&vehicle, t0() + Duration::hours(1), 10))
            .await
            .unwrap();

        let paid = booking
            .apply(
                BookingEvent::PaySuccess {
                    amount: booking.total_amount,
                    transaction_ref: "14312345".into(),
                    paid_at: t0() + Duration::minutes(2),
                },
                t0() + Duration::minutes(2),
            )
            .unwrap();
        let expired = booking
            .apply(BookingEvent::Expire, t0() + Duration::minutes(6))
            .unwrap();

        repo.commit_transition(&paid).await.unwrap();
        let lost = repo.commit_transition(&expired).await;
        assert!(matches!(lost, Err(RepoError::VersionConflict)));

        let stored = repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        let flag = repo.get_vehicle(vehicle.id).await.unwrap().unwrap().status;
        assert_eq!(flag, VehicleStatus::Reserved);
    }

    #[tokio::test]
    async fn test_find_by_order_code() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let booking = repo
            .create_booking(&reserve(&vehicle, t0() + Duration::hours(1), 10))
            .await
            .unwrap();

        let order_code = format!("{}-1", booking.booking_number);
        let initiated = booking
            .apply(
                BookingEvent::PaymentInitiated {
                    order_code: order_code.clone(),
                    expires_at: t0() + Duration::minutes(16),
                },
                t0() + Duration::minutes(1),
            )
            .unwrap();
        repo.commit_transition(&initiated).await.unwrap();

        let found = repo.find_by_order_code(&order_code).await.unwrap().unwrap();
        assert_eq!(found.id, booking.id);
        assert!(repo.find_by_order_code("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_expired_reservations() {
        let repo = setup_repo().await;
        let vehicle = seed_vehicle(&repo).await;
        let other = seed_vehicle(&repo).await;
        let booking = repo
            .create_booking(&reserve(&vehicle, t0() + Duration::hours(1), 10))
            .await
            .unwrap();
        repo.create_booking(&reserve(&other, t0() + Duration::hours(1), 10))
            .await
            .unwrap();

        assert!(
            repo.list_expired_reservations(t0() + Duration::minutes(4))
                .await
                .unwrap()
                .is_empty()
        );

        let expired = repo
            .list_expired_reservations(t0() + Duration::minutes(6))
            .await
            .unwrap();
        assert_eq!(expired.len(), 2);
        assert!(expired.iter().any(|b| b.id == booking.id));
    }

    #[tokio::test]
    async fn test_staff_station_round_trip() {
        let repo = setup_repo().await;
        let staff = UserId::new();
        let first = StationId::new();
        let second = StationId::new();

        assert!(repo.staff_station(staff).await.unwrap().is_none());
        repo.assign_staff_station(staff, first).await.unwrap();
        repo.assign_staff_station(staff, second).await.unwrap();

        assert_eq!(repo.staff_station(staff).await.unwrap(), Some(second));
    }
}
