//! # Rental Hex
//!
//! Application service layer and HTTP adapter for the EV rental service.
//!
//! ## Architecture
//!
//! - `service` - Booking service (state machine orchestration, settlement)
//! - `sweeper` - Background expiry of unpaid reservations
//! - `inbound/` - HTTP adapter (Axum server)
//! - `openapi` - OpenAPI document served at `/api-docs/openapi.json`
//!
//! The service is generic over `R: BookingRepository`, allowing
//! different ledger implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod service;
pub mod sweeper;


pub use service::{BookingPolicy, BookingService, CallbackOutcome, PaymentKind};
pub use sweeper::{ReservationSweeper, SweepReport};
