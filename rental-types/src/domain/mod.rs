//! Domain models for the booking service.

pub mod booking;
pub mod ids;
pub mod money;
pub mod settlement;
pub mod status;
pub mod vehicle;

pub use booking::{
    Actor, Booking, BookingEvent, Cancellation, DepositRefund, Inspection, NewBooking,
    PaymentRecord, PaymentStatus, RefundStatus, Transition,
};
pub use ids::{BookingId, StationId, UserId, VehicleId};
pub use money::Money;
pub use settlement::{
    AdditionalCharge, ChargeKind, LateFeePolicy, Settlement, SettlementInput, SettlementOutcome,
};
pub use status::{BookingStatus, EventKind, VehicleStatus};
pub use vehicle::{Vehicle, VehicleRates};
