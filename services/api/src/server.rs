use crate::cli::ServeArgs;
use crate::infra::{build_repository, AppState};
use crate::routes::with_hostel_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hostel_desk::config::AppConfig;
use hostel_desk::error::AppError;
use hostel_desk::hostel::HostelService;
use hostel_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(seed) = args.seed.take() {
        config.storage.seed_path = Some(seed);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(build_repository(&config.storage)?);
    let hostel_service = Arc::new(HostelService::new(repository));

    let app = with_hostel_routes(hostel_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hostel desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
