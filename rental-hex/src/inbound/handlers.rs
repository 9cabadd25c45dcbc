//! HTTP request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use rental_types::{
    AppError, ApproveRequest, AssignStationRequest, BookingId, BookingRepository, CancelRequest,
    CreateBookingRequest, DomainError, HandoverRequest, IpnResponse, PaymentLinkRequest,
    PaymentReturnResponse, RefundReceiptRequest, RefundTransferRequest, RejectRequest,
    ReturnRequest, UpsertVehicleRequest, UserId, VehicleId,
};
use vnpay_gateway::IpnCode;

use crate::BookingService;

/// Application state shared across handlers.
pub struct AppState<R: BookingRepository> {
    pub service: Arc<BookingService<R>>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Rejected(err @ DomainError::AmountMismatch { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            AppError::Rejected(err) => (StatusCode::CONFLICT, err.to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "Invalid signature".to_string())
            }
            AppError::Gateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_booking_id(id: &str) -> Result<BookingId, AppError> {
    id.parse()
        .map_err(|_| AppError::BadRequest("Invalid booking ID".into()))
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`.
pub(crate) fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("X-Real-IP").and_then(|h| h.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bookings
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(renter_id = %req.renter_id, vehicle_id = %req.vehicle_id))]
pub async fn create_booking<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.service.create(req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Get booking by ID.
#[tracing::instrument(skip(state), fields(booking_id = %id))]
pub async fn get_booking<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.service.get_booking(parse_booking_id(&id)?).await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, headers, req), fields(booking_id = %id))]
pub async fn payment_url<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PaymentLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client_ip = forwarded_ip(&headers).or(req.client_ip).unwrap_or_default();
    let link = state
        .service
        .initiate_payment(parse_booking_id(&id)?, client_ip, req.locale)
        .await?;
    Ok(Json(link))
}

#[tracing::instrument(skip(state, headers, req), fields(booking_id = %id))]
pub async fn additional_payment_url<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PaymentLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client_ip = forwarded_ip(&headers).or(req.client_ip).unwrap_or_default();
    let link = state
        .service
        .initiate_additional_payment(parse_booking_id(&id)?, client_ip, req.locale)
        .await?;
    Ok(Json(link))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, staff_id = %req.staff_id))]
pub async fn approve<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .approve(parse_booking_id(&id)?, req.staff_id)
        .await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, staff_id = %req.staff_id))]
pub async fn reject<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .reject(parse_booking_id(&id)?, req.staff_id, req.reason)
        .await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, staff_id = %req.staff_id))]
pub async fn handover<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<HandoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .handover(parse_booking_id(&id)?, req)
        .await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, staff_id = %req.staff_id))]
pub async fn return_vehicle<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<ReturnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .return_vehicle(parse_booking_id(&id)?, req)
        .await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, staff_id = %req.staff_id, amount = req.amount))]
pub async fn refund_transfer<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundTransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .confirm_refund_transfer(parse_booking_id(&id)?, req)
        .await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, renter_id = %req.renter_id))]
pub async fn refund_receipt<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundReceiptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .confirm_refund_received(parse_booking_id(&id)?, req.renter_id)
        .await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id, actor = ?req.actor))]
pub async fn cancel<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .service
        .cancel(parse_booking_id(&id)?, req.actor, req.reason)
        .await?;
    Ok(Json(booking))
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway callbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Browser return from the gateway.
#[tracing::instrument(skip(state, params), fields(order_code = ?params.get("vnp_TxnRef")))]
pub async fn vnpay_return<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.service.handle_gateway_callback(&params).await?;
    Ok(Json(PaymentReturnResponse {
        booking_number: outcome.booking.booking_number,
        success: outcome.paid,
        response_code: outcome.response_code,
        status: outcome.booking.status,
    }))
}

/// Server-to-server notification. Always answers 200 with an IPN code.
#[tracing::instrument(skip(state, params), fields(order_code = ?params.get("vnp_TxnRef")))]
pub async fn vnpay_ipn<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<IpnResponse> {
    let code = match state.service.handle_gateway_callback(&params).await {
        Ok(outcome) if outcome.applied => IpnCode::Success,
        Ok(_) => IpnCode::AlreadyConfirmed,
        Err(AppError::InvalidSignature) => IpnCode::InvalidSignature,
        Err(AppError::NotFound(_)) => IpnCode::OrderNotFound,
        Err(AppError::Rejected(DomainError::AmountMismatch { .. })) => IpnCode::InvalidAmount,
        // The booking already left the payable state (e.g. expired first).
        Err(AppError::Rejected(e)) => {
            tracing::warn!(
                order_code = ?params.get("vnp_TxnRef"),
                transaction_no = ?params.get("vnp_TransactionNo"),
                amount = ?params.get("vnp_Amount"),
                "Verified payment could not be applied, reconcile manually: {}",
                e
            );
            IpnCode::AlreadyConfirmed
        }
        Err(e) => {
            tracing::error!("IPN processing failed: {}", e);
            IpnCode::Unknown
        }
    };
    Json(code.response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger mirror sync
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(vehicle_id = %id))]
pub async fn upsert_vehicle<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<UpsertVehicleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vehicle_id: VehicleId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid vehicle ID".into()))?;
    let vehicle = state.service.upsert_vehicle(vehicle_id, req).await?;
    Ok(Json(vehicle))
}

#[tracing::instrument(skip(state, req), fields(staff_id = %id))]
pub async fn assign_station<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<AssignStationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let staff_id: UserId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid staff ID".into()))?;
    let station_id = state.service.assign_staff_station(staff_id, req).await?;
    Ok(Json(serde_json::json!({
        "staff_id": staff_id,
        "station_id": station_id,
    })))
}

/// OpenAPI document.
pub async fn openapi_json() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::openapi::ApiDoc::openapi())
}
