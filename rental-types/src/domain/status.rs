//! Booking status, vehicle availability and the transition table.
//!
//! Every status change in the system goes through [`BookingStatus::next`].
//! The table is total over `(status, event)`: pairs it does not list are
//! invalid transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BookingStatus {
    /// Hold placed, waiting for payment until `reserved_until`.
    #[serde(rename = "reserved")]
    Reserved,
    /// Paid, waiting for staff approval / contract signature.
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "confirmed")]
    Confirmed,
    /// Vehicle handed over to the renter.
    #[serde(rename = "in-progress")]
    InProgress,
    /// Returned, but charges exceed the deposit and the renter owes money.
    #[serde(rename = "pending_return")]
    PendingReturn,
    /// Waiting for the two-party deposit refund handshake.
    #[serde(rename = "refund_pending")]
    RefundPending,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "rejected")]
    Rejected,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 9] = [
        BookingStatus::Reserved,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::PendingReturn,
        BookingStatus::RefundPending,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
    ];

    /// Statuses that claim the vehicle for the booking window.
    pub const ACTIVE: [BookingStatus; 4] = [
        BookingStatus::Reserved,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Reserved => "reserved",
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in-progress",
            BookingStatus::PendingReturn => "pending_return",
            BookingStatus::RefundPending => "refund_pending",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rejected
        )
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// The transition table.
    ///
    /// Returns the next status and the vehicle flag the transition writes,
    /// or `None` when the event is not accepted in this status.
    pub fn next(self, event: EventKind) -> Option<(BookingStatus, Option<VehicleStatus>)> {
        use BookingStatus as S;
        use EventKind as E;

        let edge = match (self, event) {
            (S::Reserved, E::PaymentInitiated) => (S::Reserved, None),
            (S::Reserved, E::PaymentFailed) => (S::Reserved, None),
            (S::Reserved, E::PaySuccess) => (S::Pending, Some(VehicleStatus::Reserved)),
            (S::Reserved, E::Expire) => (S::Cancelled, Some(VehicleStatus::Available)),
            (S::Reserved, E::Cancel) => (S::Cancelled, Some(VehicleStatus::Available)),

            (S::Pending, E::StaffReject) => (S::Rejected, Some(VehicleStatus::Available)),
            (S::Pending, E::StaffApprove) => (S::Confirmed, Some(VehicleStatus::Reserved)),
            (S::Pending, E::Cancel) => (S::Cancelled, Some(VehicleStatus::Available)),

            (S::Confirmed, E::Handover) => (S::InProgress, Some(VehicleStatus::Rented)),
            (S::Confirmed, E::Cancel) => (S::Cancelled, Some(VehicleStatus::Available)),

            (S::InProgress, E::ReturnSettled) => {
                (S::RefundPending, Some(VehicleStatus::Available))
            }
            (S::InProgress, E::ReturnOwing) => (S::PendingReturn, Some(VehicleStatus::Available)),

            // Re-inspection: the vehicle was already released on the first return.
            (S::PendingReturn, E::ReturnSettled) => (S::RefundPending, None),
            (S::PendingReturn, E::ReturnOwing) => (S::PendingReturn, None),
            (S::PendingReturn, E::AdditionalPaymentInitiated) => (S::PendingReturn, None),
            (S::PendingReturn, E::AdditionalPaymentFailed) => (S::PendingReturn, None),
            (S::PendingReturn, E::AdditionalPaymentOk) => (S::RefundPending, None),

            (S::RefundPending, E::StaffConfirmsTransfer) => (S::RefundPending, None),
            (S::RefundPending, E::RenterConfirmsReceipt) => (S::Completed, None),

            _ => return None,
        };

        Some(edge)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown booking status: {}", s))
    }
}

/// Availability flag of a vehicle, kept in sync with its bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Available,
    Reserved,
    Rented,
    Maintenance,
    Unavailable,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Reserved => "reserved",
            VehicleStatus::Rented => "rented",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(VehicleStatus::Available),
            "reserved" => Ok(VehicleStatus::Reserved),
            "rented" => Ok(VehicleStatus::Rented),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            "unavailable" => Ok(VehicleStatus::Unavailable),
            _ => Err(format!("Unknown vehicle status: {}", s)),
        }
    }
}

/// Event names used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PaymentInitiated,
    PaymentFailed,
    PaySuccess,
    Expire,
    Cancel,
    StaffReject,
    StaffApprove,
    Handover,
    /// Return where the deposit covers every charge.
    ReturnSettled,
    /// Return where charges exceed the deposit.
    ReturnOwing,
    AdditionalPaymentInitiated,
    AdditionalPaymentFailed,
    AdditionalPaymentOk,
    StaffConfirmsTransfer,
    RenterConfirmsReceipt,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::PaymentInitiated => "payment_initiated",
            EventKind::PaymentFailed => "payment_failed",
            EventKind::PaySuccess => "pay_success",
            EventKind::Expire => "expire",
            EventKind::Cancel => "cancel",
            EventKind::StaffReject => "staff_reject",
            EventKind::StaffApprove => "staff_approve",
            EventKind::Handover => "handover",
            EventKind::ReturnSettled => "return",
            EventKind::ReturnOwing => "return",
            EventKind::AdditionalPaymentInitiated => "additional_payment_initiated",
            EventKind::AdditionalPaymentFailed => "additional_payment_failed",
            EventKind::AdditionalPaymentOk => "additional_payment_ok",
            EventKind::StaffConfirmsTransfer => "staff_confirms_transfer",
            EventKind::RenterConfirmsReceipt => "renter_confirms_receipt",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [EventKind; 15] = [
        EventKind::PaymentInitiated,
        EventKind::PaymentFailed,
        EventKind::PaySuccess,
        EventKind::Expire,
        EventKind::Cancel,
        EventKind::StaffReject,
        EventKind::StaffApprove,
        EventKind::Handover,
        EventKind::ReturnSettled,
        EventKind::ReturnOwing,
        EventKind::AdditionalPaymentInitiated,
        EventKind::AdditionalPaymentFailed,
        EventKind::AdditionalPaymentOk,
        EventKind::StaffConfirmsTransfer,
        EventKind::RenterConfirmsReceipt,
    ];

    #[test]
    fn test_terminal_states_accept_no_event() {
        for status in BookingStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for event in EVENTS {
                assert!(
                    status.next(event).is_none(),
                    "{} must not accept {}",
                    status,
                    event
                );
            }
        }
    }

    #[test]
    fn test_only_renter_receipt_reaches_completed() {
        for status in BookingStatus::ALL {
            for event in EVENTS {
                if let Some((BookingStatus::Completed, _)) = status.next(event) {
                    assert_eq!(status, BookingStatus::RefundPending);
                    assert_eq!(event, EventKind::RenterConfirmsReceipt);
                }
            }
        }
    }

    #[test]
    fn test_cancel_only_before_pickup() {
        let cancellable: Vec<_> = BookingStatus::ALL
            .into_iter()
            .filter(|s| s.next(EventKind::Cancel).is_some())
            .collect();
        assert_eq!(
            cancellable,
            vec![
                BookingStatus::Reserved,
                BookingStatus::Pending,
                BookingStatus::Confirmed
            ]
        );
    }

    #[test]
    fn test_status_changing_edges_carry_vehicle_effect() {
        assert_eq!(
            BookingStatus::Reserved.next(EventKind::PaySuccess),
            Some((BookingStatus::Pending, Some(VehicleStatus::Reserved)))
        );
        assert_eq!(
            BookingStatus::Reserved.next(EventKind::Expire),
            Some((BookingStatus::Cancelled, Some(VehicleStatus::Available)))
        );
        assert_eq!(
            BookingStatus::Confirmed.next(EventKind::Handover),
            Some((BookingStatus::InProgress, Some(VehicleStatus::Rented)))
        );
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&BookingStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
    }
}
