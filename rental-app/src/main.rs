//! # Rental Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the booking ledger adapter
//! - Create the VNPay gateway and the booking service
//! - Start the reservation sweeper and the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rental_hex::{
    BookingService, ReservationSweeper,
    inbound::{HttpServer, shutdown_signal},
};
use rental_repo::build_repo;
use rental_types::SystemClock;
use vnpay_gateway::VnpayGateway;

fn init_tracer() -> (sdktrace::Tracer, sdktrace::SdkTracerProvider) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .expect("failed to create OTLP span exporter");

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    (provider.tracer("rental-service"), provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing
    let (otel_tracer, otel_provider) = init_tracer();
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rental_app=debug,rental_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    let policy = config.policy()?;

    tracing::info!("Starting rental server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    let gateway = VnpayGateway::new(config.vnpay.clone())?;

    let service = Arc::new(BookingService::new(
        repo,
        Arc::new(gateway),
        Arc::new(SystemClock),
        policy,
    ));

    // Reservation sweeper stops when the server does
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let sweeper = ReservationSweeper::new(service.clone(), config.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(async move {
        let _ = stop_rx.changed().await;
    }));

    // Create and run the HTTP server
    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    let result = server.run(&addr, shutdown_signal()).await;

    let _ = stop_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!("Reservation sweeper task failed: {}", e);
    }

    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    result
}
