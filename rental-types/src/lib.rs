//! # Rental Types
//!
//! Domain types and port traits for the EV rental booking service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Booking aggregate, transition table, settlement math
//! - `ports/` - Ledger, payment gateway and clock traits
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain, repository, gateway and application errors

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Actor, AdditionalCharge, Booking, BookingEvent, BookingId, BookingStatus, EventKind, Money,
    NewBooking, PaymentStatus, RefundStatus, Settlement, SettlementInput, StationId, Transition,
    UserId, Vehicle, VehicleId, VehicleRates, VehicleStatus,
};
pub use dto::*;
pub use error::{AppError, DomainError, GatewayError, RepoError};
pub use ports::{BookingRepository, Clock, PaymentGateway, SystemClock};
