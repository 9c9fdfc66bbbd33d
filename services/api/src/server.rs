use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use itou::config::AppConfig;
use itou::error::AppError;
use itou::job_applications::JobApplicationService;
use itou::store::MemoryStore;
use itou::telemetry;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{AppState, TracingMailer};
use crate::routes::with_job_application_routes;

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

    let store = Arc::new(MemoryStore::open(&config.data_path)?);
    let service = Arc::new(JobApplicationService::new(
        store.clone(),
        Arc::new(TracingMailer),
        config.workflow.clone(),
        config.asp.itou_prefix.clone(),
    ));

    let app = with_job_application_routes(service)
        .layer(middleware::from_fn_with_state(store, persist_after_write))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, data_path = %config.data_path.display(), "itou service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Writes the snapshot back after every non-GET request. A failed mail
/// delivery still answers with an error once the transition is committed.
async fn persist_after_write(
    State(store): State<Arc<MemoryStore>>,
    request: Request,
    next: Next,
) -> Response {
    let writes = request.method() != Method::GET;
    let response = next.run(request).await;
    if writes {
        let persisted = tokio::task::spawn_blocking(move || store.persist()).await;
        let failure = match persisted {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(AppError::from(error)),
            Err(error) => Some(AppError::Io(io::Error::other(error))),
        };
        if let Some(error) = failure {
            return error.into_response();
        }
    }
    response
}
