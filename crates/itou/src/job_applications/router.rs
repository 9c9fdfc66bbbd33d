use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    AcceptRequest, JobApplicationId, NewJobApplication, PostponeRequest, ProcessRequest,
    RefuseRequest,
};
use super::notifications::Mailer;
use super::repository::JobApplicationRepository;
use super::service::{JobApplicationService, WorkflowError};
use crate::approvals::{ApprovalError, ApprovalRepository};
use crate::repository::RepositoryError;
use crate::users::Actor;

/// Body of a workflow action: the acting user plus the action's own fields.
#[derive(Debug, Deserialize)]
pub(crate) struct ActionBody<T> {
    actor: Actor,
    #[serde(flatten)]
    request: T,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NoPayload {}

pub fn job_application_router<R, M>(service: Arc<JobApplicationService<R, M>>) -> Router
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .route("/api/v1/job-applications", post(submit_handler::<R, M>))
        .route(
            "/api/v1/job-applications/:job_application_id",
            get(detail_handler::<R, M>),
        )
        .route(
            "/api/v1/job-applications/:job_application_id/logs",
            get(logs_handler::<R, M>),
        )
        .route(
            "/api/v1/job-applications/:job_application_id/process",
            post(process_handler::<R, M>),
        )
        .route(
            "/api/v1/job-applications/:job_application_id/postpone",
            post(postpone_handler::<R, M>),
        )
        .route(
            "/api/v1/job-applications/:job_application_id/accept",
            post(accept_handler::<R, M>),
        )
        .route(
            "/api/v1/job-applications/:job_application_id/refuse",
            post(refuse_handler::<R, M>),
        )
        .route(
            "/api/v1/job-applications/:job_application_id/cancel",
            post(cancel_handler::<R, M>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    axum::Json(submission): axum::Json<NewJobApplication>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    match service.submit(submission, Utc::now()) {
        Ok(application) => (StatusCode::CREATED, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn detail_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    match service.get(id) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn logs_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    match service.logs(id) {
        Ok(logs) => (StatusCode::OK, axum::Json(logs)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn process_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
    axum::Json(body): axum::Json<ActionBody<ProcessRequest>>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    transition_response(service.process(id, &body.actor, body.request, Utc::now()))
}

pub(crate) async fn postpone_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
    axum::Json(body): axum::Json<ActionBody<PostponeRequest>>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    transition_response(service.postpone(id, &body.actor, body.request, Utc::now()))
}

pub(crate) async fn accept_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
    axum::Json(body): axum::Json<ActionBody<AcceptRequest>>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    transition_response(service.accept(id, &body.actor, body.request, Utc::now()))
}

pub(crate) async fn refuse_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
    axum::Json(body): axum::Json<ActionBody<RefuseRequest>>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    transition_response(service.refuse(id, &body.actor, body.request, Utc::now()))
}

pub(crate) async fn cancel_handler<R, M>(
    State(service): State<Arc<JobApplicationService<R, M>>>,
    Path(job_application_id): Path<String>,
    axum::Json(body): axum::Json<ActionBody<NoPayload>>,
) -> Response
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    let Some(id) = parse_id(&job_application_id) else {
        return not_found(&job_application_id);
    };
    transition_response(service.cancel(id, &body.actor, Utc::now()))
}

fn parse_id(raw: &str) -> Option<JobApplicationId> {
    raw.parse().ok()
}

fn not_found(raw: &str) -> Response {
    let payload = json!({
        "error": format!("job application {raw} not found"),
    });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn transition_response(
    result: Result<super::domain::JobApplication, WorkflowError>,
) -> Response {
    match result {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::Transition(_) => StatusCode::CONFLICT,
        WorkflowError::Accept(_) | WorkflowError::Submission(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Repository(RepositoryError::NotFound(_))
        | WorkflowError::Approval(ApprovalError::Repository(RepositoryError::NotFound(_))) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::Repository(RepositoryError::Conflict(_) | RepositoryError::Constraint(_))
        | WorkflowError::Approval(ApprovalError::Repository(
            RepositoryError::Conflict(_) | RepositoryError::Constraint(_),
        )) => StatusCode::CONFLICT,
        WorkflowError::Approval(ApprovalError::Repository(_)) | WorkflowError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        WorkflowError::Approval(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Notification(_) => StatusCode::BAD_GATEWAY,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
