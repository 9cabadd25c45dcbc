//! Booking Application Service
//!
//! Orchestrates the booking state machine, the settlement engine and the
//! payment gateway through the ledger port. Every state change goes through
//! [`BookingService::run_transition`]: read the booking, build the event,
//! apply it, and commit booking and vehicle flag as one unit of work.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use rental_types::domain::{LateFeePolicy, PaymentRecord};
use rental_types::ports::{GatewayCallback, PaymentUrl, PaymentUrlRequest};
use rental_types::{
    Actor, AppError, AssignStationRequest, Booking, BookingEvent, BookingId, BookingRepository,
    Clock, CreateBookingRequest, GatewayError, HandoverRequest, Money, NewBooking,
    PaymentGateway, PaymentLinkResponse, PaymentStatus, RefundTransferRequest, RepoError,
    ReturnRequest, Settlement, SettlementInput, StationId, UpsertVehicleRequest, UserId, Vehicle,
    VehicleId, VehicleRates,
};

/// Attempts per operation before a lost optimistic-concurrency race is
/// reported to the caller.
const MAX_ATTEMPTS: usize = 3;

/// Largest single fee staff may assess at return, in đồng.
pub const MAX_CHARGE: i64 = 1_000_000_000_000;

/// Business knobs of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// How long a new reservation holds the vehicle without payment.
    pub reservation_hold: Duration,
    /// Largest accepted difference between the recorded refund transfer and
    /// the recomputed refund, in đồng.
    pub refund_tolerance: i64,
    pub late_fee: LateFeePolicy,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            reservation_hold: Duration::minutes(5),
            refund_tolerance: 1,
            late_fee: LateFeePolicy::default(),
        }
    }
}

/// Which of a booking's payments a gateway order code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    Rental,
    Additional,
}

/// Result of processing a verified gateway callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub booking: Booking,
    pub kind: PaymentKind,
    /// False when the payment had already been settled and nothing changed.
    pub applied: bool,
    /// The payment is completed after processing.
    pub paid: bool,
    pub response_code: String,
}

/// Application service for booking operations.
///
/// Generic over `R: BookingRepository`; the gateway and clock are injected
/// as trait objects.
pub struct BookingService<R: BookingRepository> {
    repo: R,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl<R: BookingRepository> BookingService<R> {
    pub fn new(
        repo: R,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            repo,
            gateway,
            clock,
            policy,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger mirror
    // ─────────────────────────────────────────────────────────────────────────────

    /// Syncs a vehicle's availability flag and prices from the catalog.
    pub async fn upsert_vehicle(
        &self,
        id: VehicleId,
        req: UpsertVehicleRequest,
    ) -> Result<Vehicle, AppError> {
        let vehicle = Vehicle {
            id,
            status: req.status,
            rates: VehicleRates {
                price_per_hour: Money::new(req.price_per_hour)?,
                price_per_day: Money::new(req.price_per_day)?,
                deposit: Money::new(req.deposit)?,
            },
        };
        if vehicle.rates.price_per_hour.is_zero() || vehicle.rates.price_per_day.is_zero() {
            return Err(AppError::BadRequest("Prices must be positive".into()));
        }

        self.repo.upsert_vehicle(&vehicle).await?;
        Ok(vehicle)
    }

    pub async fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle, AppError> {
        self.repo
            .get_vehicle(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Vehicle {}", id))))
    }

    /// Records which station a staff member works at.
    pub async fn assign_staff_station(
        &self,
        staff: UserId,
        req: AssignStationRequest,
    ) -> Result<StationId, AppError> {
        self.repo
            .assign_staff_station(staff, req.station_id)
            .await?;
        Ok(req.station_id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reservation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reserves a vehicle for the requested window.
    ///
    /// The booking starts in `reserved` with a hold of
    /// [`BookingPolicy::reservation_hold`]; the vehicle flag turns `reserved`
    /// in the same unit of work.
    #[tracing::instrument(skip(self, req), fields(renter_id = %req.renter_id, vehicle_id = %req.vehicle_id))]
    pub async fn create(&self, req: CreateBookingRequest) -> Result<Booking, AppError> {
        let vehicle = self.get_vehicle(req.vehicle_id).await?;

        let new_booking = NewBooking {
            renter_id: req.renter_id,
            vehicle_id: req.vehicle_id,
            pickup_station_id: req.pickup_station_id,
            return_station_id: req.return_station_id.unwrap_or(req.pickup_station_id),
            start_date: req.start_date,
            end_date: req.end_date,
        };

        for _ in 0..MAX_ATTEMPTS {
            let booking = Booking::reserve(
                new_booking.clone(),
                &vehicle.rates,
                self.policy.reservation_hold,
                self.clock.now(),
            )?;

            match self.repo.create_booking(&booking).await {
                Ok(stored) => {
                    info!(
                        booking_number = %stored.booking_number,
                        total = %stored.total_amount,
                        "Booking reserved"
                    );
                    return Ok(stored);
                }
                // Booking number collision; draw a new one.
                Err(RepoError::Conflict(msg)) => debug!("{}", msg),
                Err(RepoError::NotFound) => {
                    return Err(AppError::NotFound(format!("Vehicle {}", req.vehicle_id)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict(
            "Could not allocate a unique booking number".into(),
        ))
    }

    /// Gets a booking by ID.
    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, AppError> {
        self.repo
            .get_booking(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Booking {}", id))))
    }

    /// Cancels the reservation once its hold has run out.
    ///
    /// Called by the sweeper; rejected if payment arrived first.
    #[tracing::instrument(skip(self))]
    pub async fn expire(&self, id: BookingId) -> Result<Booking, AppError> {
        self.transition(id, |_, _| Ok(BookingEvent::Expire)).await
    }

    /// Cancels a booking before pickup.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        id: BookingId,
        actor: Actor,
        reason: String,
    ) -> Result<Booking, AppError> {
        let reason = required_text(reason, "Cancellation reason")?;
        self.transition(id, |_, _| {
            Ok(BookingEvent::Cancel {
                actor,
                reason: reason.clone(),
            })
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────────

    /// Issues a gateway redirect URL for the rental total.
    ///
    /// Only while the reservation hold is running. Every call issues a new
    /// order code; callbacks for older codes no longer match.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        id: BookingId,
        client_ip: String,
        locale: Option<String>,
    ) -> Result<PaymentLinkResponse, AppError> {
        let mut link: Option<PaymentUrl> = None;

        self.transition(id, |booking, now| {
            let url = self.gateway.payment_url(&PaymentUrlRequest {
                amount: booking.payment.amount,
                order_code: format!("{}-{}", booking.booking_number, booking.version + 1),
                order_info: format!("Thanh toan dat xe {}", booking.booking_number),
                client_ip: client_ip.clone(),
                locale: locale.clone(),
                created_at: now,
            })?;
            let event = BookingEvent::PaymentInitiated {
                order_code: url.order_code.clone(),
                expires_at: url.expires_at,
            };
            link = Some(url);
            Ok(event)
        })
        .await?;

        link.map(into_link_response)
            .ok_or_else(|| AppError::Internal("payment link was not built".into()))
    }

    /// Issues a gateway redirect URL for the amount owed after return.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_additional_payment(
        &self,
        id: BookingId,
        client_ip: String,
        locale: Option<String>,
    ) -> Result<PaymentLinkResponse, AppError> {
        let mut link: Option<PaymentUrl> = None;

        self.transition(id, |booking, now| {
            let owed = booking
                .additional_payment
                .as_ref()
                .map(|p| p.amount)
                .ok_or_else(|| {
                    AppError::Rejected(rental_types::DomainError::PreconditionFailed(
                        "No additional payment is owed".into(),
                    ))
                })?;
            let url = self.gateway.payment_url(&PaymentUrlRequest {
                amount: owed,
                order_code: format!("{}-A{}", booking.booking_number, booking.version + 1),
                order_info: format!("Thanh toan phi phat sinh {}", booking.booking_number),
                client_ip: client_ip.clone(),
                locale: locale.clone(),
                created_at: now,
            })?;
            let event = BookingEvent::AdditionalPaymentInitiated {
                order_code: url.order_code.clone(),
                expires_at: url.expires_at,
            };
            link = Some(url);
            Ok(event)
        })
        .await?;

        link.map(into_link_response)
            .ok_or_else(|| AppError::Internal("payment link was not built".into()))
    }

    /// Verifies raw callback parameters and completes the matching payment.
    ///
    /// Signature failures are logged as security events and never touch the
    /// ledger.
    pub async fn handle_gateway_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, AppError> {
        let callback = self.gateway.verify_callback(params).map_err(|e| {
            if e == GatewayError::InvalidSignature {
                warn!(
                    order_code = ?params.get("vnp_TxnRef"),
                    security_event = true,
                    "Rejected gateway callback with invalid signature"
                );
            }
            AppError::from(e)
        })?;

        self.complete_payment(callback).await
    }

    /// Applies a verified callback to the payment carrying its order code.
    ///
    /// Idempotent: only a `pending` payment is acted on; anything else
    /// returns the booking unchanged with `applied == false`.
    #[tracing::instrument(skip(self, callback), fields(order_code = %callback.order_code, response_code = %callback.response_code))]
    pub async fn complete_payment(
        &self,
        callback: GatewayCallback,
    ) -> Result<CallbackOutcome, AppError> {
        let booking = self
            .repo
            .find_by_order_code(&callback.order_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", callback.order_code)))?;
        let kind = payment_kind(&booking, &callback.order_code)
            .ok_or_else(|| AppError::NotFound(format!("Order {}", callback.order_code)))?;

        let (booking, applied) = self
            .run_transition(booking.id, |current, now| {
                let Some(record) = payment_record(current, kind, &callback.order_code) else {
                    // A newer link replaced this order code.
                    return Ok(None);
                };
                if record.status != PaymentStatus::Pending {
                    return Ok(None);
                }

                let late = record.expires_at.is_some_and(|t| now > t);
                let event = if callback.succeeded() && !late {
                    let transaction_ref = callback
                        .transaction_no
                        .clone()
                        .unwrap_or_else(|| callback.order_code.clone());
                    match kind {
                        PaymentKind::Rental => BookingEvent::PaySuccess {
                            amount: callback.amount,
                            transaction_ref,
                            paid_at: now,
                        },
                        PaymentKind::Additional => BookingEvent::AdditionalPaymentOk {
                            amount: callback.amount,
                            transaction_ref,
                            paid_at: now,
                        },
                    }
                } else {
                    let reason = if late {
                        warn!(
                            booking_number = %current.booking_number,
                            "Gateway callback arrived after the payment link expired"
                        );
                        "Callback arrived after the payment link expired".to_string()
                    } else {
                        format!("Gateway declined with code {}", callback.response_code)
                    };
                    let response_code = callback.response_code.clone();
                    match kind {
                        PaymentKind::Rental => BookingEvent::PaymentFailed {
                            response_code,
                            reason: Some(reason),
                        },
                        PaymentKind::Additional => BookingEvent::AdditionalPaymentFailed {
                            response_code,
                            reason: Some(reason),
                        },
                    }
                };
                Ok(Some(event))
            })
            .await?;

        let paid = payment_record(&booking, kind, &callback.order_code)
            .is_some_and(|p| p.status == PaymentStatus::Completed);

        Ok(CallbackOutcome {
            booking,
            kind,
            applied,
            paid,
            response_code: callback.response_code,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Staff workflow
    // ─────────────────────────────────────────────────────────────────────────────

    /// Staff approves (signs) a paid booking.
    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, id: BookingId, staff_id: UserId) -> Result<Booking, AppError> {
        self.transition(id, |_, _| Ok(BookingEvent::Approve { staff_id }))
            .await
    }

    /// Staff rejects a paid booking; the vehicle is released.
    #[tracing::instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        id: BookingId,
        staff_id: UserId,
        reason: String,
    ) -> Result<Booking, AppError> {
        let reason = required_text(reason, "Rejection reason")?;
        self.transition(id, |_, _| {
            Ok(BookingEvent::Reject {
                staff_id,
                reason: reason.clone(),
            })
        })
        .await
    }

    /// Hands the vehicle over to the renter.
    #[tracing::instrument(skip(self, req), fields(staff_id = %req.staff_id))]
    pub async fn handover(&self, id: BookingId, req: HandoverRequest) -> Result<Booking, AppError> {
        validate_reading(req.odometer, req.battery_level)?;
        let staff_station = self.repo.staff_station(req.staff_id).await?;

        self.transition(id, |_, _| {
            Ok(BookingEvent::Handover {
                staff_id: req.staff_id,
                staff_station,
                odometer: req.odometer,
                battery_level: req.battery_level,
            })
        })
        .await
    }

    /// Processes a return inspection and settles the deposit.
    ///
    /// Charges within the deposit lead to `refund_pending`; charges above it
    /// lead to `pending_return` with an additional payment owed. Repeating
    /// the inspection from `pending_return` replaces the charges.
    #[tracing::instrument(skip(self, req), fields(staff_id = %req.staff_id))]
    pub async fn return_vehicle(
        &self,
        id: BookingId,
        req: ReturnRequest,
    ) -> Result<Booking, AppError> {
        validate_reading(req.odometer, req.battery_level)?;
        for (name, fee) in [
            ("Late fee", req.late_fee.unwrap_or(0)),
            ("Cleaning fee", req.cleaning_fee),
            ("Repair fee", req.repair_fee),
        ] {
            if fee > MAX_CHARGE {
                return Err(AppError::BadRequest(format!(
                    "{} exceeds {} đồng",
                    name, MAX_CHARGE
                )));
            }
        }
        let input = SettlementInput {
            late_fee_override: req.late_fee.map(Money::new).transpose()?,
            cleaning_fee: Money::new(req.cleaning_fee)?,
            repair_fee: Money::new(req.repair_fee)?,
        };
        let staff_station = self.repo.staff_station(req.staff_id).await?;
        let late_fee = self.policy.late_fee;

        let booking = self
            .transition(id, |booking, now| {
                let returned_at = booking.actual_end_date.unwrap_or(now);
                let settlement = Settlement::assess(
                    booking.deposit,
                    booking.hourly_rate,
                    booking.end_date,
                    returned_at,
                    input,
                    late_fee,
                )?;
                debug!(
                    total = %settlement.total,
                    outcome = ?settlement.outcome,
                    "Settlement assessed"
                );
                Ok(BookingEvent::Return {
                    staff_id: req.staff_id,
                    staff_station,
                    odometer: req.odometer,
                    battery_level: req.battery_level,
                    settlement,
                })
            })
            .await?;

        Ok(booking)
    }

    /// Staff records the bank transfer of the deposit refund.
    #[tracing::instrument(skip(self, req), fields(staff_id = %req.staff_id, amount = req.amount))]
    pub async fn confirm_refund_transfer(
        &self,
        id: BookingId,
        req: RefundTransferRequest,
    ) -> Result<Booking, AppError> {
        let amount = Money::new(req.amount)?;
        let reference = required_text(req.reference, "Transfer reference")?;
        let tolerance = self.policy.refund_tolerance;

        self.transition(id, |_, _| {
            Ok(BookingEvent::ConfirmTransfer {
                staff_id: req.staff_id,
                amount,
                reference: reference.clone(),
                tolerance,
            })
        })
        .await
    }

    /// Renter confirms the refund arrived; the booking completes.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_refund_received(
        &self,
        id: BookingId,
        renter_id: UserId,
    ) -> Result<Booking, AppError> {
        self.transition(id, |_, _| Ok(BookingEvent::ConfirmReceipt { renter_id }))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Unit of work
    // ─────────────────────────────────────────────────────────────────────────────

    async fn transition<F>(&self, id: BookingId, mut event_for: F) -> Result<Booking, AppError>
    where
        F: FnMut(&Booking, DateTime<Utc>) -> Result<BookingEvent, AppError>,
    {
        self.run_transition(id, |booking, now| event_for(booking, now).map(Some))
            .await
            .map(|(booking, _)| booking)
    }

    /// Read, apply, commit; retried when another writer got there first.
    ///
    /// `event_for` is re-evaluated against the fresh booking on every
    /// attempt, so a lost race is judged by the transition table on the
    /// winner's state. Returning `None` leaves the booking untouched.
    async fn run_transition<F>(
        &self,
        id: BookingId,
        mut event_for: F,
    ) -> Result<(Booking, bool), AppError>
    where
        F: FnMut(&Booking, DateTime<Utc>) -> Result<Option<BookingEvent>, AppError>,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            let booking = self.get_booking(id).await?;
            let now = self.clock.now();

            let Some(event) = event_for(&booking, now)? else {
                return Ok((booking, false));
            };

            let transition = booking.apply(event, now)?;
            match self.repo.commit_transition(&transition).await {
                Ok(stored) => {
                    info!(
                        booking_number = %stored.booking_number,
                        event = %transition.event,
                        from = %transition.from,
                        to = %stored.status,
                        vehicle = ?transition.vehicle_effect,
                        "Booking transition committed"
                    );
                    return Ok((stored, true));
                }
                Err(RepoError::VersionConflict) => {
                    debug!(attempt, booking_id = %id, "Version conflict, re-reading booking");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "Booking {} kept changing concurrently",
            id
        )))
    }
}

fn into_link_response(url: PaymentUrl) -> PaymentLinkResponse {
    PaymentLinkResponse {
        payment_url: url.url,
        order_code: url.order_code,
        expires_at: url.expires_at,
    }
}

fn payment_kind(booking: &Booking, order_code: &str) -> Option<PaymentKind> {
    if booking.payment.order_code.as_deref() == Some(order_code) {
        return Some(PaymentKind::Rental);
    }
    booking
        .additional_payment
        .as_ref()
        .filter(|p| p.order_code.as_deref() == Some(order_code))
        .map(|_| PaymentKind::Additional)
}

fn payment_record<'a>(
    booking: &'a Booking,
    kind: PaymentKind,
    order_code: &str,
) -> Option<&'a PaymentRecord> {
    let record = match kind {
        PaymentKind::Rental => Some(&booking.payment),
        PaymentKind::Additional => booking.additional_payment.as_ref(),
    }?;
    (record.order_code.as_deref() == Some(order_code)).then_some(record)
}

fn required_text(value: String, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn validate_reading(odometer: i64, battery_level: u8) -> Result<(), AppError> {
    if odometer < 0 {
        return Err(AppError::BadRequest("Odometer cannot be negative".into()));
    }
    if battery_level > 100 {
        return Err(AppError::BadRequest(
            "Battery level must be between 0 and 100".into(),
        ));
    }
    Ok(())
}
