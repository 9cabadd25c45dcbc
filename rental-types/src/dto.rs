//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Actor, StationId, UserId, VehicleId, VehicleStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Booking DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to reserve a vehicle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub renter_id: UserId,
    pub vehicle_id: VehicleId,
    pub pickup_station_id: StationId,
    /// Defaults to the pickup station.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_station_id: Option<StationId>,
    #[schema(example = "2026-03-01T08:00:00Z")]
    pub start_date: DateTime<Utc>,
    #[schema(example = "2026-03-01T18:00:00Z")]
    pub end_date: DateTime<Utc>,
}

/// Request for a payment redirect URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PaymentLinkRequest {
    /// Falls back to the connection's address when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "vn")]
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentLinkResponse {
    pub payment_url: String,
    pub order_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApproveRequest {
    pub staff_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub staff_id: UserId,
    #[schema(example = "Driver licence could not be verified")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HandoverRequest {
    pub staff_id: UserId,
    #[schema(example = 12500)]
    pub odometer: i64,
    #[schema(example = 95)]
    pub battery_level: u8,
}

/// Return inspection. Fees are in đồng.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnRequest {
    pub staff_id: UserId,
    #[schema(example = 12740)]
    pub odometer: i64,
    #[schema(example = 38)]
    pub battery_level: u8,
    /// Overrides the computed late fee when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_fee: Option<i64>,
    #[serde(default)]
    pub cleaning_fee: i64,
    #[serde(default)]
    pub repair_fee: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundTransferRequest {
    pub staff_id: UserId,
    #[schema(example = 200000)]
    pub amount: i64,
    /// Bank transfer reference.
    #[schema(example = "FT26060123456")]
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundReceiptRequest {
    pub renter_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub actor: Actor,
    #[schema(example = "Plans changed")]
    pub reason: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger mirror DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Catalog sync of a vehicle's flag and prices.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsertVehicleRequest {
    pub status: VehicleStatus,
    #[schema(example = 100000)]
    pub price_per_hour: i64,
    #[schema(example = 800000)]
    pub price_per_day: i64,
    #[schema(example = 500000)]
    pub deposit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignStationRequest {
    pub station_id: StationId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgement body the gateway expects from the IPN endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    #[schema(example = "00")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    #[schema(example = "Confirm Success")]
    pub message: String,
}

impl IpnResponse {
    pub fn new(rsp_code: &str, message: &str) -> Self {
        Self {
            rsp_code: rsp_code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result shown to the renter after the browser comes back from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentReturnResponse {
    pub booking_number: String,
    pub success: bool,
    pub response_code: String,
    pub status: crate::domain::BookingStatus,
}
