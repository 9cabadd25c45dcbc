//! HTTP Server configuration and startup.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use rental_types::BookingRepository;

use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::BookingService;

/// HTTP Server for the Booking API.
pub struct HttpServer<R: BookingRepository> {
    state: Arc<AppState<R>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: BookingRepository> HttpServer<R> {
    /// Creates a new HTTP server with the given service.
    pub fn new(service: Arc<BookingService<R>>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::default()), // 100 req/min default
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: Arc<BookingService<R>>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api-docs/openapi.json", get(handlers::openapi_json))
            .route("/api/bookings", post(handlers::create_booking::<R>))
            .route("/api/bookings/{id}", get(handlers::get_booking::<R>))
            .route(
                "/api/bookings/{id}/payment-url",
                post(handlers::payment_url::<R>),
            )
            .route(
                "/api/bookings/{id}/additional-payment-url",
                post(handlers::additional_payment_url::<R>),
            )
            .route("/api/bookings/{id}/approve", post(handlers::approve::<R>))
            .route("/api/bookings/{id}/reject", post(handlers::reject::<R>))
            .route("/api/bookings/{id}/handover", post(handlers::handover::<R>))
            .route(
                "/api/bookings/{id}/return",
                post(handlers::return_vehicle::<R>),
            )
            .route(
                "/api/bookings/{id}/refund/transfer",
                post(handlers::refund_transfer::<R>),
            )
            .route(
                "/api/bookings/{id}/refund/receipt",
                post(handlers::refund_receipt::<R>),
            )
            .route("/api/bookings/{id}/cancel", post(handlers::cancel::<R>))
            .route("/api/payments/vnpay/return", get(handlers::vnpay_return::<R>))
            .route("/api/payments/vnpay/ipn", get(handlers::vnpay_ipn::<R>))
            .route("/api/vehicles/{id}", put(handlers::upsert_vehicle::<R>))
            .route(
                "/api/staff/{id}/station",
                put(handlers::assign_station::<R>),
            )
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address until `shutdown` resolves.
    pub async fn run<S>(self, addr: &str, shutdown: S) -> anyhow::Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
