//! Booking aggregate and its state machine.
//!
//! [`Booking::apply`] is the only way a booking changes after creation. It
//! looks the `(status, event)` pair up in the transition table, checks the
//! event's guards against a copy of the booking and returns the new booking
//! together with the vehicle flag the ledger must write in the same unit of
//! work. A rejected event leaves the original untouched.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{BookingId, StationId, UserId, VehicleId};
use super::money::Money;
use super::settlement::{AdditionalCharge, Settlement, SettlementOutcome};
use super::status::{BookingStatus, EventKind, VehicleStatus};
use super::vehicle::VehicleRates;
use crate::error::DomainError;

/// Who asked for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Renter(UserId),
    Staff(UserId),
    /// The reservation sweeper.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    /// Waiting for the renter's additional payment before anything is refunded.
    PendingPayment,
    /// Staff recorded the bank transfer.
    Refunded,
    /// Renter confirmed receipt.
    Confirmed,
}

/// A gateway payment attached to a booking.
///
/// Used both for the rental payment and for the additional settlement
/// payment. `order_code` is set when a redirect URL is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentRecord {
    pub order_code: Option<String>,
    #[schema(value_type = i64)]
    pub amount: Money,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_ref: Option<String>,
    /// Gateway response code, kept for diagnostics.
    pub response_code: Option<String>,
    pub failure_reason: Option<String>,
    /// Redirect expiry; callbacks after this instant count as failed.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    fn pending(amount: Money) -> Self {
        Self {
            order_code: None,
            amount,
            status: PaymentStatus::Pending,
            paid_at: None,
            transaction_ref: None,
            response_code: None,
            failure_reason: None,
            expires_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DepositRefund {
    #[schema(value_type = i64)]
    pub amount: Money,
    pub method: String,
    pub status: RefundStatus,
    pub refunded_by: Option<UserId>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub transfer_reference: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DepositRefund {
    fn new(amount: Money, status: RefundStatus) -> Self {
        Self {
            amount,
            method: "bank_transfer".into(),
            status,
            refunded_by: None,
            refunded_at: None,
            transfer_reference: None,
            confirmed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Cancellation {
    pub reason: String,
    pub actor: Actor,
    pub cancelled_at: DateTime<Utc>,
}

/// Odometer and battery reading taken at handover or return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Inspection {
    pub staff_id: UserId,
    pub odometer: i64,
    pub battery_level: u8,
    pub at: DateTime<Utc>,
}

/// Input for a new reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub renter_id: UserId,
    pub vehicle_id: VehicleId,
    pub pickup_station_id: StationId,
    pub return_station_id: StationId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// A rental booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: BookingId,
    /// Human-readable, unique, e.g. `BK20260301X7K2QD`.
    pub booking_number: String,
    pub renter_id: UserId,
    pub vehicle_id: VehicleId,
    pub pickup_station_id: StationId,
    pub return_station_id: StationId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
    #[schema(value_type = i64)]
    pub base_price: Money,
    #[schema(value_type = i64)]
    pub deposit: Money,
    /// Hourly price snapshot used for late fees.
    #[schema(value_type = i64)]
    pub hourly_rate: Money,
    pub additional_charges: Vec<AdditionalCharge>,
    #[schema(value_type = i64)]
    pub total_amount: Money,
    pub payment: PaymentRecord,
    pub additional_payment: Option<PaymentRecord>,
    pub deposit_refund: Option<DepositRefund>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub cancellation: Option<Cancellation>,
    pub approved_by: Option<UserId>,
    pub handover: Option<Inspection>,
    pub return_inspection: Option<Inspection>,
    /// Optimistic concurrency token, bumped by every committed transition.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Something that happened to a booking, with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    PaymentInitiated {
        order_code: String,
        expires_at: DateTime<Utc>,
    },
    PaymentFailed {
        response_code: String,
        reason: Option<String>,
    },
    PaySuccess {
        amount: Money,
        transaction_ref: String,
        paid_at: DateTime<Utc>,
    },
    Expire,
    Cancel {
        actor: Actor,
        reason: String,
    },
    Reject {
        staff_id: UserId,
        reason: String,
    },
    Approve {
        staff_id: UserId,
    },
    Handover {
        staff_id: UserId,
        staff_station: Option<StationId>,
        odometer: i64,
        battery_level: u8,
    },
    Return {
        staff_id: UserId,
        staff_station: Option<StationId>,
        odometer: i64,
        battery_level: u8,
        settlement: Settlement,
    },
    AdditionalPaymentInitiated {
        order_code: String,
        expires_at: DateTime<Utc>,
    },
    AdditionalPaymentFailed {
        response_code: String,
        reason: Option<String>,
    },
    AdditionalPaymentOk {
        amount: Money,
        transaction_ref: String,
        paid_at: DateTime<Utc>,
    },
    ConfirmTransfer {
        staff_id: UserId,
        amount: Money,
        reference: String,
        /// Largest accepted difference from the recomputed refund, in đồng.
        tolerance: i64,
    },
    ConfirmReceipt {
        renter_id: UserId,
    },
}

impl BookingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BookingEvent::PaymentInitiated { .. } => EventKind::PaymentInitiated,
            BookingEvent::PaymentFailed { .. } => EventKind::PaymentFailed,
            BookingEvent::PaySuccess { .. } => EventKind::PaySuccess,
            BookingEvent::Expire => EventKind::Expire,
            BookingEvent::Cancel { .. } => EventKind::Cancel,
            BookingEvent::Reject { .. } => EventKind::StaffReject,
            BookingEvent::Approve { .. } => EventKind::StaffApprove,
            BookingEvent::Handover { .. } => EventKind::Handover,
            BookingEvent::Return { settlement, .. } => match settlement.outcome {
                SettlementOutcome::Refund { .. } => EventKind::ReturnSettled,
                SettlementOutcome::Owing { .. } => EventKind::ReturnOwing,
            },
            BookingEvent::AdditionalPaymentInitiated { .. } => {
                EventKind::AdditionalPaymentInitiated
            }
            BookingEvent::AdditionalPaymentFailed { .. } => EventKind::AdditionalPaymentFailed,
            BookingEvent::AdditionalPaymentOk { .. } => EventKind::AdditionalPaymentOk,
            BookingEvent::ConfirmTransfer { .. } => EventKind::StaffConfirmsTransfer,
            BookingEvent::ConfirmReceipt { .. } => EventKind::RenterConfirmsReceipt,
        }
    }
}

/// Outcome of an accepted event: the booking to persist and its side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: BookingStatus,
    pub event: EventKind,
    pub booking: Booking,
    pub vehicle_effect: Option<VehicleStatus>,
}

/// Generates a booking number: `BK` + date + 6 random uppercase alphanumerics.
pub fn generate_booking_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("BK{}{}", now.format("%Y%m%d"), suffix)
}

/// How far before `now` a new booking may start, to absorb form latency.
pub const MAX_START_BACKDATE_MINUTES: i64 = 15;

impl Booking {
    /// Creates a booking in `reserved` with a hold of `hold` from `now`.
    pub fn reserve(
        req: NewBooking,
        rates: &VehicleRates,
        hold: Duration,
        now: DateTime<Utc>,
    ) -> Result<Booking, DomainError> {
        if req.end_date <= req.start_date {
            return Err(DomainError::ValidationError(
                "Rental window must end after it starts".into(),
            ));
        }
        if req.end_date <= now {
            return Err(DomainError::ValidationError(
                "Rental window is already in the past".into(),
            ));
        }
        if req.start_date < now - Duration::minutes(MAX_START_BACKDATE_MINUTES) {
            return Err(DomainError::ValidationError(
                "Rental cannot start in the past".into(),
            ));
        }
        if hold <= Duration::zero() {
            return Err(DomainError::ValidationError(
                "Reservation hold must be positive".into(),
            ));
        }

        let base_price = rates.quote(req.start_date, req.end_date)?;
        let total_amount = base_price.checked_add(rates.deposit)?;

        Ok(Booking {
            id: BookingId::new(),
            booking_number: generate_booking_number(now),
            renter_id: req.renter_id,
            vehicle_id: req.vehicle_id,
            pickup_station_id: req.pickup_station_id,
            return_station_id: req.return_station_id,
            start_date: req.start_date,
            end_date: req.end_date,
            actual_start_date: None,
            actual_end_date: None,
            base_price,
            deposit: rates.deposit,
            hourly_rate: rates.price_per_hour,
            additional_charges: Vec::new(),
            total_amount,
            payment: PaymentRecord::pending(total_amount),
            additional_payment: None,
            deposit_refund: None,
            reserved_until: Some(now + hold),
            status: BookingStatus::Reserved,
            cancellation: None,
            approved_by: None,
            handover: None,
            return_inspection: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn additional_charges_total(&self) -> Result<Money, DomainError> {
        Money::checked_sum(self.additional_charges.iter().map(|c| c.amount))
    }

    /// The refund owed to the renter as of now.
    ///
    /// Zero on the additional-payment branch: the whole deposit was consumed.
    pub fn expected_refund(&self) -> Result<Money, DomainError> {
        if self.additional_payment.is_some() {
            return Ok(Money::ZERO);
        }
        Ok(self.deposit.saturating_sub(self.additional_charges_total()?))
    }

    /// True when the renter still owes an additional payment.
    pub fn has_outstanding_payment(&self) -> bool {
        self.additional_payment
            .as_ref()
            .is_some_and(|p| p.status != PaymentStatus::Completed)
    }

    /// True while the hold is still running.
    pub fn hold_active(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Reserved && self.reserved_until.is_some_and(|t| now < t)
    }

    /// Applies `event` at `now`.
    pub fn apply(&self, event: BookingEvent, now: DateTime<Utc>) -> Result<Transition, DomainError> {
        let kind = event.kind();
        let (to, vehicle_effect) =
            self.status
                .next(kind)
                .ok_or(DomainError::InvalidTransition {
                    from: self.status,
                    event: kind,
                })?;

        let mut next = self.clone();
        next.mutate(event, now)?;
        next.status = to;
        if to != BookingStatus::Reserved {
            next.reserved_until = None;
        }
        next.updated_at = now;

        Ok(Transition {
            from: self.status,
            event: kind,
            booking: next,
            vehicle_effect,
        })
    }

    fn mutate(&mut self, event: BookingEvent, now: DateTime<Utc>) -> Result<(), DomainError> {
        match event {
            BookingEvent::PaymentInitiated {
                order_code,
                expires_at,
            } => {
                if !self.hold_active(now) {
                    return Err(precondition("Reservation hold has expired"));
                }
                self.payment.order_code = Some(order_code);
                self.payment.status = PaymentStatus::Pending;
                self.payment.expires_at = Some(expires_at);
                self.payment.response_code = None;
                self.payment.failure_reason = None;
            }

            BookingEvent::PaymentFailed {
                response_code,
                reason,
            } => {
                require_pending(&self.payment)?;
                self.payment.status = PaymentStatus::Failed;
                self.payment.response_code = Some(response_code);
                self.payment.failure_reason = reason;
            }

            BookingEvent::PaySuccess {
                amount,
                transaction_ref,
                paid_at,
            } => {
                require_pending(&self.payment)?;
                if amount != self.payment.amount {
                    return Err(DomainError::AmountMismatch {
                        expected: self.payment.amount.amount(),
                        got: amount.amount(),
                    });
                }
                self.payment.status = PaymentStatus::Completed;
                self.payment.transaction_ref = Some(transaction_ref);
                self.payment.paid_at = Some(paid_at);
                self.payment.response_code = Some("00".into());
            }

            BookingEvent::Expire => {
                if self.reserved_until.is_some_and(|t| now < t) {
                    return Err(precondition("Reservation hold has not expired yet"));
                }
                self.cancellation = Some(Cancellation {
                    reason: "Reservation hold expired without payment".into(),
                    actor: Actor::System,
                    cancelled_at: now,
                });
            }

            BookingEvent::Cancel { actor, reason } => {
                if let Actor::Renter(renter) = actor {
                    if renter != self.renter_id {
                        return Err(precondition("Only the renter may cancel this booking"));
                    }
                }
                self.cancellation = Some(Cancellation {
                    reason,
                    actor,
                    cancelled_at: now,
                });
            }

            BookingEvent::Reject { staff_id, reason } => {
                self.cancellation = Some(Cancellation {
                    reason,
                    actor: Actor::Staff(staff_id),
                    cancelled_at: now,
                });
            }

            BookingEvent::Approve { staff_id } => {
                self.approved_by = Some(staff_id);
            }

            BookingEvent::Handover {
                staff_id,
                staff_station,
                odometer,
                battery_level,
            } => {
                if let Some(station) = staff_station {
                    if station != self.pickup_station_id {
                        return Err(precondition(
                            "Handover must happen at the booking's pickup station",
                        ));
                    }
                }
                self.actual_start_date = Some(now);
                self.handover = Some(Inspection {
                    staff_id,
                    odometer,
                    battery_level,
                    at: now,
                });
            }

            BookingEvent::Return {
                staff_id,
                staff_station,
                odometer,
                battery_level,
                settlement,
            } => {
                if staff_station != Some(self.return_station_id) {
                    return Err(precondition(
                        "Return must be processed by staff of the booking's return station",
                    ));
                }
                if let Some(handover) = &self.handover {
                    if odometer < handover.odometer {
                        return Err(DomainError::ValidationError(
                            "Odometer reading is lower than at handover".into(),
                        ));
                    }
                }
                self.apply_settlement(settlement)?;
                if self.actual_end_date.is_none() {
                    self.actual_end_date = Some(now);
                }
                self.return_inspection = Some(Inspection {
                    staff_id,
                    odometer,
                    battery_level,
                    at: now,
                });
            }

            BookingEvent::AdditionalPaymentInitiated {
                order_code,
                expires_at,
            } => {
                let payment = self
                    .additional_payment
                    .as_mut()
                    .ok_or_else(|| precondition("No additional payment is owed"))?;
                if payment.status == PaymentStatus::Completed {
                    return Err(precondition("Additional payment is already completed"));
                }
                payment.order_code = Some(order_code);
                payment.status = PaymentStatus::Pending;
                payment.expires_at = Some(expires_at);
                payment.response_code = None;
                payment.failure_reason = None;
            }

            BookingEvent::AdditionalPaymentFailed {
                response_code,
                reason,
            } => {
                let payment = self
                    .additional_payment
                    .as_mut()
                    .ok_or_else(|| precondition("No additional payment is owed"))?;
                require_pending(payment)?;
                payment.status = PaymentStatus::Failed;
                payment.response_code = Some(response_code);
                payment.failure_reason = reason;
            }

            BookingEvent::AdditionalPaymentOk {
                amount,
                transaction_ref,
                paid_at,
            } => {
                let payment = self
                    .additional_payment
                    .as_mut()
                    .ok_or_else(|| precondition("No additional payment is owed"))?;
                require_pending(payment)?;
                if amount != payment.amount {
                    return Err(DomainError::AmountMismatch {
                        expected: payment.amount.amount(),
                        got: amount.amount(),
                    });
                }
                payment.status = PaymentStatus::Completed;
                payment.transaction_ref = Some(transaction_ref);
                payment.paid_at = Some(paid_at);
                payment.response_code = Some("00".into());

                if let Some(refund) = self.deposit_refund.as_mut() {
                    refund.status = RefundStatus::Pending;
                }
            }

            BookingEvent::ConfirmTransfer {
                staff_id,
                amount,
                reference,
                tolerance,
            } => {
                if self.has_outstanding_payment() {
                    return Err(precondition(
                        "Additional payment must be completed before refunding",
                    ));
                }
                let expected = self.expected_refund()?;
                let refund = self
                    .deposit_refund
                    .as_mut()
                    .ok_or_else(|| precondition("No deposit refund to confirm"))?;
                match refund.status {
                    RefundStatus::Pending => {}
                    RefundStatus::PendingPayment => {
                        return Err(precondition(
                            "Additional payment must be completed before refunding",
                        ));
                    }
                    RefundStatus::Refunded | RefundStatus::Confirmed => {
                        return Err(precondition("Refund transfer is already recorded"));
                    }
                }
                if expected.abs_diff(amount) > tolerance {
                    return Err(DomainError::AmountMismatch {
                        expected: expected.amount(),
                        got: amount.amount(),
                    });
                }
                refund.amount = expected;
                refund.status = RefundStatus::Refunded;
                refund.refunded_by = Some(staff_id);
                refund.refunded_at = Some(now);
                refund.transfer_reference = Some(reference);
            }

            BookingEvent::ConfirmReceipt { renter_id } => {
                if renter_id != self.renter_id {
                    return Err(precondition("Only the renter may confirm receipt"));
                }
                let refund = self
                    .deposit_refund
                    .as_mut()
                    .filter(|r| r.status == RefundStatus::Refunded)
                    .ok_or_else(|| {
                        DomainError::NotReady("Staff has not recorded the refund transfer".into())
                    })?;
                refund.status = RefundStatus::Confirmed;
                refund.confirmed_at = Some(now);
            }
        }

        Ok(())
    }

    fn apply_settlement(&mut self, settlement: Settlement) -> Result<(), DomainError> {
        if self
            .additional_payment
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Completed)
        {
            return Err(precondition("Settlement is already paid"));
        }

        // A re-inspection replaces the previous assessment.
        self.additional_charges = settlement.charges;

        match settlement.outcome {
            SettlementOutcome::Refund { refund } => {
                self.additional_payment = None;
                self.deposit_refund = Some(DepositRefund::new(refund, RefundStatus::Pending));
            }
            SettlementOutcome::Owing { owed } => {
                let mut payment = PaymentRecord::pending(owed);
                if let Some(previous) = &self.additional_payment {
                    if previous.amount == owed {
                        payment = previous.clone();
                    }
                }
                self.additional_payment = Some(payment);
                self.deposit_refund = Some(DepositRefund::new(
                    Money::ZERO,
                    RefundStatus::PendingPayment,
                ));
            }
        }

        Ok(())
    }
}

fn precondition(msg: &str) -> DomainError {
    DomainError::PreconditionFailed(msg.to_string())
}

fn require_pending(payment: &PaymentRecord) -> Result<(), DomainError> {
    if payment.status != PaymentStatus::Pending {
        return Err(DomainError::PreconditionFailed(format!(
            "Payment is {:?}, not pending",
            payment.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settlement::{LateFeePolicy, SettlementInput};

    fn vnd(amount: i64) -> Money {
        Money::new(amount).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        "2026-03-01T08:00:00Z".parse().unwrap()
    }

    fn rates() -> VehicleRates {
        VehicleRates {
            price_per_hour: vnd(100_000),
            price_per_day: vnd(800_000),
            deposit: vnd(500_000),
        }
    }

    fn reserved() -> Booking {
        Booking::reserve(
            NewBooking {
                renter_id: UserId::new(),
                vehicle_id: VehicleId::new(),
                pickup_station_id: StationId::new(),
                return_station_id: StationId::new(),
                start_date: t0() + Duration::hours(1),
                end_date: t0() + Duration::hours(5),
            },
            &rates(),
            Duration::minutes(5),
            t0(),
        )
        .unwrap()
    }

    fn step(booking: &Booking, event: BookingEvent, now: DateTime<Utc>) -> Booking {
        booking.apply(event, now).unwrap().booking
    }

    fn in_progress() -> Booking {
        let b = reserved();
        let b = step(
            &b,
            BookingEvent::PaySuccess {
                amount: b.total_amount,
                transaction_ref: "14012345".into(),
                paid_at: t0(),
            },
            t0(),
        );
        let b = step(
            &b,
            BookingEvent::Approve {
                staff_id: UserId::new(),
            },
            t0(),
        );
        let station = b.pickup_station_id;
        step(
            &b,
            BookingEvent::Handover {
                staff_id: UserId::new(),
                staff_station: Some(station),
                odometer: 1200,
                battery_level: 95,
            },
            t0() + Duration::hours(1),
        )
    }

    fn return_event(b: &Booking, input: SettlementInput, at: DateTime<Utc>) -> BookingEvent {
        BookingEvent::Return {
            staff_id: UserId::new(),
            staff_station: Some(b.return_station_id),
            odometer: 1300,
            battery_level: 40,
            settlement: Settlement::assess(
                b.deposit,
                b.hourly_rate,
                b.end_date,
                at,
                input,
                LateFeePolicy::default(),
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_reserve_sets_hold_and_totals() {
        let b = reserved();
        assert_eq!(b.status, BookingStatus::Reserved);
        assert_eq!(b.reserved_until, Some(t0() + Duration::minutes(5)));
        assert_eq!(b.base_price, vnd(400_000));
        assert_eq!(b.total_amount, vnd(900_000));
        assert_eq!(
            b.total_amount.amount(),
            b.base_price.amount() + b.deposit.amount()
        );
        assert!(b.booking_number.starts_with("BK20260301"));
        assert_eq!(b.booking_number.len(), 16);
    }

    #[test]
    fn test_reserve_rejects_inverted_window() {
        let result = Booking::reserve(
            NewBooking {
                renter_id: UserId::new(),
                vehicle_id: VehicleId::new(),
                pickup_station_id: StationId::new(),
                return_station_id: StationId::new(),
                start_date: t0() + Duration::hours(5),
                end_date: t0() + Duration::hours(1),
            },
            &rates(),
            Duration::minutes(5),
            t0(),
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    fn starting_at(start: DateTime<Utc>) -> Result<Booking, DomainError> {
        Booking::reserve(
            NewBooking {
                renter_id: UserId::new(),
                vehicle_id: VehicleId::new(),
                pickup_station_id: StationId::new(),
                return_station_id: StationId::new(),
                start_date: start,
                end_date: t0() + Duration::days(7),
            },
            &rates(),
            Duration::minutes(5),
            t0(),
        )
    }

    #[test]
    fn test_reserve_rejects_backdated_start() {
        let result = starting_at(t0() - Duration::days(90));
        assert!(matches!(result, Err(DomainError::ValidationError(_))));

        let result = starting_at(t0() - Duration::minutes(MAX_START_BACKDATE_MINUTES + 1));
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_reserve_allows_start_a_few_minutes_ago() {
        let b = starting_at(t0() - Duration::minutes(5)).unwrap();
        assert_eq!(b.start_date, t0() - Duration::minutes(5));
    }

    #[test]
    fn test_pay_success_moves_to_pending_and_clears_hold() {
        let b = reserved();
        let t = b
            .apply(
                BookingEvent::PaySuccess {
                    amount: b.total_amount,
                    transaction_ref: "14012345".into(),
                    paid_at: t0(),
                },
                t0(),
            )
            .unwrap();
        assert_eq!(t.booking.status, BookingStatus::Pending);
        assert_eq!(t.vehicle_effect, Some(VehicleStatus::Reserved));
        assert_eq!(t.booking.reserved_until, None);
        assert_eq!(t.booking.payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_pay_success_with_wrong_amount_is_rejected() {
        let b = reserved();
        let result = b.apply(
            BookingEvent::PaySuccess {
                amount: vnd(1),
                transaction_ref: "x".into(),
                paid_at: t0(),
            },
            t0(),
        );
        assert!(matches!(result, Err(DomainError::AmountMismatch { .. })));
    }

    #[test]
    fn test_expire_before_deadline_is_rejected() {
        let b = reserved();
        let early = b.apply(BookingEvent::Expire, t0() + Duration::minutes(4));
        assert!(matches!(early, Err(DomainError::PreconditionFailed(_))));

        let late = b
            .apply(BookingEvent::Expire, t0() + Duration::minutes(6))
            .unwrap();
        assert_eq!(late.booking.status, BookingStatus::Cancelled);
        assert_eq!(late.vehicle_effect, Some(VehicleStatus::Available));
        assert_eq!(late.booking.cancellation.unwrap().actor, Actor::System);
    }

    #[test]
    fn test_payment_cannot_be_initiated_after_hold() {
        let b = reserved();
        let result = b.apply(
            BookingEvent::PaymentInitiated {
                order_code: "X".into(),
                expires_at: t0() + Duration::minutes(21),
            },
            t0() + Duration::minutes(6),
        );
        assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
    }

    #[test]
    fn test_other_renter_cannot_cancel() {
        let b = reserved();
        let result = b.apply(
            BookingEvent::Cancel {
                actor: Actor::Renter(UserId::new()),
                reason: "changed my mind".into(),
            },
            t0(),
        );
        assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
    }

    #[test]
    fn test_handover_at_wrong_station_fails_without_mutation() {
        let b = reserved();
        let b = step(
            &b,
            BookingEvent::PaySuccess {
                amount: b.total_amount,
                transaction_ref: "t".into(),
                paid_at: t0(),
            },
            t0(),
        );
        let b = step(
            &b,
            BookingEvent::Approve {
                staff_id: UserId::new(),
            },
            t0(),
        );
        let before = b.clone();
        let result = b.apply(
            BookingEvent::Handover {
                staff_id: UserId::new(),
                staff_station: Some(StationId::new()),
                odometer: 1,
                battery_level: 90,
            },
            t0(),
        );
        assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
        assert_eq!(b, before);
    }

    #[test]
    fn test_return_without_charges_refunds_deposit() {
        let b = in_progress();
        let at = b.end_date;
        let t = b
            .apply(return_event(&b, SettlementInput::default(), at), at)
            .unwrap();
        assert_eq!(t.booking.status, BookingStatus::RefundPending);
        assert_eq!(t.vehicle_effect, Some(VehicleStatus::Available));
        let refund = t.booking.deposit_refund.unwrap();
        assert_eq!(refund.amount, vnd(500_000));
        assert_eq!(refund.status, RefundStatus::Pending);
        assert!(t.booking.additional_payment.is_none());
    }

    #[test]
    fn test_return_at_wrong_station_is_rejected() {
        let b = in_progress();
        let mut event = return_event(&b, SettlementInput::default(), b.end_date);
        if let BookingEvent::Return { staff_station, .. } = &mut event {
            *staff_station = Some(b.pickup_station_id);
        }
        let result = b.apply(event, b.end_date);
        assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
    }

    #[test]
    fn test_return_owing_then_additional_payment() {
        let b = in_progress();
        let at = b.end_date;
        let input = SettlementInput {
            late_fee_override: Some(vnd(700_000)),
            ..Default::default()
        };
        let b = step(&b, return_event(&b, input, at), at);
        assert_eq!(b.status, BookingStatus::PendingReturn);
        let owed = b.additional_payment.clone().unwrap();
        assert_eq!(owed.amount, vnd(200_000));
        assert_eq!(owed.status, PaymentStatus::Pending);
        assert_eq!(b.deposit_refund.as_ref().unwrap().amount, Money::ZERO);
        assert_eq!(
            b.deposit_refund.as_ref().unwrap().status,
            RefundStatus::PendingPayment
        );
        assert!(b.additional_charges_total().unwrap() > b.deposit);

        // Staff cannot refund while money is owed.
        let blocked = b.apply(
            BookingEvent::ConfirmTransfer {
                staff_id: UserId::new(),
                amount: Money::ZERO,
                reference: "FT1".into(),
                tolerance: 1,
            },
            at,
        );
        assert!(matches!(blocked, Err(DomainError::InvalidTransition { .. })));

        let b = step(
            &b,
            BookingEvent::AdditionalPaymentOk {
                amount: vnd(200_000),
                transaction_ref: "1402".into(),
                paid_at: at,
            },
            at,
        );
        assert_eq!(b.status, BookingStatus::RefundPending);
        assert_eq!(b.expected_refund().unwrap(), Money::ZERO);
        assert_eq!(
            b.deposit_refund.as_ref().unwrap().status,
            RefundStatus::Pending
        );
    }

    #[test]
    fn test_receipt_before_transfer_is_not_ready() {
        let b = in_progress();
        let at = b.end_date;
        let b = step(&b, return_event(&b, SettlementInput::default(), at), at);
        let renter = b.renter_id;
        let result = b.apply(BookingEvent::ConfirmReceipt { renter_id: renter }, at);
        assert!(matches!(result, Err(DomainError::NotReady(_))));
    }

    #[test]
    fn test_transfer_amount_outside_tolerance() {
        let b = in_progress();
        let at = b.end_date;
        let b = step(&b, return_event(&b, SettlementInput::default(), at), at);

        let off = b.apply(
            BookingEvent::ConfirmTransfer {
                staff_id: UserId::new(),
                amount: vnd(499_000),
                reference: "FT1".into(),
                tolerance: 1,
            },
            at,
        );
        assert!(matches!(
            off,
            Err(DomainError::AmountMismatch {
                expected: 500_000,
                got: 499_000
            })
        ));

        let within = b
            .apply(
                BookingEvent::ConfirmTransfer {
                    staff_id: UserId::new(),
                    amount: vnd(499_999),
                    reference: "FT1".into(),
                    tolerance: 1,
                },
                at,
            )
            .unwrap();
        let refund = within.booking.deposit_refund.unwrap();
        assert_eq!(refund.status, RefundStatus::Refunded);
        assert_eq!(refund.amount, vnd(500_000));
    }

    #[test]
    fn test_completed_booking_rejects_everything() {
        let b = in_progress();
        let at = b.end_date;
        let b = step(&b, return_event(&b, SettlementInput::default(), at), at);
        let b = step(
            &b,
            BookingEvent::ConfirmTransfer {
                staff_id: UserId::new(),
                amount: vnd(500_000),
                reference: "FT1".into(),
                tolerance: 1,
            },
            at,
        );
        let renter = b.renter_id;
        let b = step(&b, BookingEvent::ConfirmReceipt { renter_id: renter }, at);
        assert_eq!(b.status, BookingStatus::Completed);
        assert_eq!(
            b.deposit_refund.as_ref().unwrap().status,
            RefundStatus::Confirmed
        );

        let again = b.apply(BookingEvent::ConfirmReceipt { renter_id: renter }, at);
        assert!(matches!(
            again,
            Err(DomainError::InvalidTransition {
                from: BookingStatus::Completed,
                ..
            })
        ));
    }
}
