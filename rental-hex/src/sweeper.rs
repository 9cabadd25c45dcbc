//! Reservation expiry sweeper.
//!
//! Periodically cancels `reserved` bookings whose hold ran out. It goes
//! through [`BookingService::expire`], so a payment that commits first wins
//! and the sweeper's attempt is simply skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use rental_types::{AppError, BookingRepository, DomainError};

use crate::BookingService;

/// What one pass of the sweeper did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    /// Bookings that changed state before the sweeper got to them.
    pub skipped: usize,
    pub failed: usize,
}

pub struct ReservationSweeper<R: BookingRepository> {
    service: Arc<BookingService<R>>,
    interval: Duration,
}

impl<R: BookingRepository> ReservationSweeper<R> {
    pub fn new(service: Arc<BookingService<R>>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Runs one pass over the expired reservations.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.service.now();
        let mut report = SweepReport::default();

        let candidates = match self.service.repo().list_expired_reservations(now).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Failed to list expired reservations: {}", e);
                report.failed += 1;
                return report;
            }
        };

        report.scanned = candidates.len();
        for booking in candidates {
            match self.service.expire(booking.id).await {
                Ok(_) => report.expired += 1,
                Err(AppError::Rejected(
                    DomainError::InvalidTransition { .. } | DomainError::PreconditionFailed(_),
                ))
                | Err(AppError::Conflict(_)) => {
                    debug!(
                        booking_number = %booking.booking_number,
                        "Reservation changed before expiry, skipping"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(
                        booking_number = %booking.booking_number,
                        "Failed to expire reservation: {}", e
                    );
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Reservation sweep finished"
            );
        }
        report
    }

    /// Sweeps on a fixed interval until `shutdown` resolves.
    ///
    /// Missed ticks are delayed, never bursted.
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        if self.interval.is_zero() {
            warn!("Sweep interval is zero, reservation sweeper disabled");
            return;
        }

        info!("Starting reservation sweeper every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Reservation sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }
}
