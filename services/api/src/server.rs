use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryStores};
use crate::routes::with_membership_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use membership_lifecycle::config::AppConfig;
use membership_lifecycle::error::AppError;
use membership_lifecycle::telemetry;
use membership_lifecycle::workflows::membership::UserId;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stores = InMemoryStores::default();
    for applicant in args.applicants {
        stores.users.register(UserId(applicant), false);
    }
    for member in args.members {
        stores.users.register(UserId(member), true);
    }
    let membership_service = Arc::new(stores.service(&config.membership));

    let app = with_membership_routes(membership_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        payment_policy = ?config.membership.payment_policy,
        "membership application service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
