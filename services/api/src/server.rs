use crate::cli::ServeArgs;
use crate::infra::{seed_demo_marketplace, AppState};
use crate::routes::with_booking_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rentbook::booking::{
    BookingError, BookingService, ExpirationSweeper, InMemoryBookingRepository, Money,
};
use rentbook::config::AppConfig;
use rentbook::error::AppError;
use rentbook::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

const DEMO_TENANT_FUNDS: i64 = 1_000;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryBookingRepository::default());
    seed_demo_marketplace(&repository, Money::from(DEMO_TENANT_FUNDS))
        .map_err(BookingError::from)?;
    let service = Arc::new(BookingService::new(repository, &config.booking));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::new(ExpirationSweeper::new(service.clone()));
    let sweeper_task = sweeper.spawn(config.booking.sweep_interval, shutdown_rx);

    let app = with_booking_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sweep_interval_secs = config.booking.sweep_interval.as_secs(),
        "booking service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    if shutdown_tx.send(true).is_err() {
        warn!("expiration sweeper already stopped");
    }
    if let Err(err) = sweeper_task.await {
        warn!(error = %err, "expiration sweeper did not stop cleanly");
    }
    info!("booking service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
}
