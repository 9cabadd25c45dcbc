//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use rental_types::domain::{
    Actor, AdditionalCharge, BookingId, BookingStatus, Cancellation, ChargeKind, DepositRefund,
    Inspection, PaymentRecord, PaymentStatus, RefundStatus, StationId, UserId, Vehicle,
    VehicleId, VehicleRates, VehicleStatus,
};
use rental_types::dto::{
    ApproveRequest, AssignStationRequest, CancelRequest, CreateBookingRequest, HandoverRequest,
    IpnResponse, PaymentLinkRequest, PaymentLinkResponse, PaymentReturnResponse,
    RefundReceiptRequest, RefundTransferRequest, RejectRequest, ReturnRequest,
    UpsertVehicleRequest,
};
use rental_types::Booking;
use utoipa::OpenApi;

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Reserve a vehicle
#[utoipa::path(
    post,
    path = "/api/bookings",
    tag = "bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking reserved; the hold runs for a few minutes", body = Booking),
        (status = 400, description = "Invalid rental window"),
        (status = 404, description = "Vehicle not found"),
        (status = 409, description = "Vehicle unavailable or already booked for the window")
    )
)]
async fn create_booking() {}

/// Get booking by ID
#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    tag = "bookings",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    responses(
        (status = 200, description = "Booking details", body = Booking),
        (status = 404, description = "Booking not found")
    )
)]
async fn get_booking() {}

/// Issue a payment redirect URL for the rental total
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/payment-url",
    tag = "payments",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = PaymentLinkRequest,
    responses(
        (status = 200, description = "Signed gateway URL", body = PaymentLinkResponse),
        (status = 409, description = "Booking is not reserved or its hold expired")
    )
)]
async fn payment_url() {}

/// Issue a payment redirect URL for the amount owed after return
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/additional-payment-url",
    tag = "payments",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = PaymentLinkRequest,
    responses(
        (status = 200, description = "Signed gateway URL", body = PaymentLinkResponse),
        (status = 409, description = "No additional payment is owed")
    )
)]
async fn additional_payment_url() {}

/// Browser return from the payment gateway
#[utoipa::path(
    get,
    path = "/api/payments/vnpay/return",
    tag = "payments",
    params(("vnp_TxnRef" = String, Query, description = "Order code; all signed vnp_* parameters are required")),
    responses(
        (status = 200, description = "Payment result", body = PaymentReturnResponse),
        (status = 401, description = "Invalid signature"),
        (status = 404, description = "Unknown order code")
    )
)]
async fn vnpay_return() {}

/// Gateway server-to-server notification
#[utoipa::path(
    get,
    path = "/api/payments/vnpay/ipn",
    tag = "payments",
    params(("vnp_TxnRef" = String, Query, description = "Order code; all signed vnp_* parameters are required")),
    responses(
        (status = 200, description = "Acknowledgement code for the gateway", body = IpnResponse)
    )
)]
async fn vnpay_ipn() {}

/// Staff approves a paid booking
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/approve",
    tag = "staff",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Booking confirmed", body = Booking),
        (status = 409, description = "Booking is not awaiting approval")
    )
)]
async fn approve() {}

/// Staff rejects a paid booking
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/reject",
    tag = "staff",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Booking rejected", body = Booking),
        (status = 409, description = "Booking is not awaiting approval")
    )
)]
async fn reject() {}

/// Hand the vehicle over to the renter
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/handover",
    tag = "staff",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = HandoverRequest,
    responses(
        (status = 200, description = "Rental started", body = Booking),
        (status = 409, description = "Booking not confirmed or wrong station")
    )
)]
async fn handover() {}

/// Process a return inspection and settle the deposit
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/return",
    tag = "staff",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Vehicle returned; refund pending or additional payment owed", body = Booking),
        (status = 409, description = "Booking not in progress or wrong station")
    )
)]
async fn return_vehicle() {}

/// Staff records the deposit refund transfer
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/refund/transfer",
    tag = "refunds",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = RefundTransferRequest,
    responses(
        (status = 200, description = "Refund recorded", body = Booking),
        (status = 409, description = "Refund not ready or already recorded"),
        (status = 422, description = "Amount differs from the expected refund")
    )
)]
async fn refund_transfer() {}

/// Renter confirms the refund arrived
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/refund/receipt",
    tag = "refunds",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = RefundReceiptRequest,
    responses(
        (status = 200, description = "Booking completed", body = Booking),
        (status = 409, description = "Staff has not recorded the transfer yet")
    )
)]
async fn refund_receipt() {}

/// Cancel a booking before pickup
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/cancel",
    tag = "bookings",
    params(("id" = BookingId, Path, description = "Booking ID (UUID)")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 409, description = "Booking can no longer be cancelled")
    )
)]
async fn cancel() {}

/// Sync a vehicle's availability flag and prices from the catalog
#[utoipa::path(
    put,
    path = "/api/vehicles/{id}",
    tag = "ledger",
    params(("id" = VehicleId, Path, description = "Vehicle ID (UUID)")),
    request_body = UpsertVehicleRequest,
    responses(
        (status = 200, description = "Vehicle stored", body = Vehicle),
        (status = 400, description = "Invalid prices")
    )
)]
async fn upsert_vehicle() {}

/// Record the station a staff member works at
#[utoipa::path(
    put,
    path = "/api/staff/{id}/station",
    tag = "ledger",
    params(("id" = UserId, Path, description = "Staff user ID (UUID)")),
    request_body = AssignStationRequest,
    responses(
        (status = 200, description = "Assignment stored", body = inline(serde_json::Value))
    )
)]
async fn assign_station() {}

/// OpenAPI documentation for the Booking API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "EV Rental Booking Service API",
        version = "1.0.0",
        description = "Booking lifecycle, VNPay payments and deposit settlement for an electric-vehicle rental marketplace.\n\nAmounts are integer Vietnamese đồng.",
        license(name = "MIT"),
    ),
    paths(
        health,
        create_booking,
        get_booking,
        payment_url,
        additional_payment_url,
        vnpay_return,
        vnpay_ipn,
        approve,
        reject,
        handover,
        return_vehicle,
        refund_transfer,
        refund_receipt,
        cancel,
        upsert_vehicle,
        assign_station,
    ),
    components(
        schemas(
            Booking,
            BookingStatus,
            PaymentRecord,
            PaymentStatus,
            DepositRefund,
            RefundStatus,
            AdditionalCharge,
            ChargeKind,
            Cancellation,
            Inspection,
            Actor,
            Vehicle,
            VehicleRates,
            VehicleStatus,
            BookingId,
            UserId,
            VehicleId,
            StationId,
            CreateBookingRequest,
            PaymentLinkRequest,
            PaymentLinkResponse,
            PaymentReturnResponse,
            IpnResponse,
            ApproveRequest,
            RejectRequest,
            HandoverRequest,
            ReturnRequest,
            RefundTransferRequest,
            RefundReceiptRequest,
            CancelRequest,
            UpsertVehicleRequest,
            AssignStationRequest,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "bookings", description = "Reservation and cancellation"),
        (name = "payments", description = "Gateway redirect URLs and callbacks"),
        (name = "staff", description = "Approval, handover and return inspection"),
        (name = "refunds", description = "Deposit refund handshake"),
        (name = "ledger", description = "Catalog and staff directory sync"),
    )
)]
pub struct ApiDoc;
