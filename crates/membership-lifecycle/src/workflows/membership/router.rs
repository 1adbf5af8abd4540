use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{ApplicationDraft, ApplicationId, NewApplication};
use super::repository::RepositoryError;
use super::service::{
    MembershipApplicationService, MembershipServiceError, TransitionRequest, TransitionResponse,
};

/// Router builder exposing intake, edits, status, and lifecycle events.
pub fn membership_router(service: Arc<MembershipApplicationService>) -> Router {
    Router::new()
        .route("/api/v1/membership/applications", post(create_handler))
        .route(
            "/api/v1/membership/applications/:application_id",
            get(status_handler).put(update_handler),
        )
        .route(
            "/api/v1/membership/applications/:application_id/resubmit",
            post(resubmit_handler),
        )
        .route(
            "/api/v1/membership/applications/:application_id/events/:event",
            post(transition_handler),
        )
        .with_state(service)
}

fn status_code(error: &MembershipServiceError) -> StatusCode {
    match error {
        MembershipServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MembershipServiceError::TransitionRejected(_) => StatusCode::CONFLICT,
        MembershipServiceError::UnknownEvent(_) => StatusCode::BAD_REQUEST,
        MembershipServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        MembershipServiceError::Repository(
            RepositoryError::Conflict | RepositoryError::StaleVersion { .. },
        ) => StatusCode::CONFLICT,
        MembershipServiceError::SideEffectFailed(_)
        | MembershipServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn error_response(error: MembershipServiceError) -> Response {
    let status = status_code(&error);
    let payload = match &error {
        MembershipServiceError::Validation(errors) => json!({
            "errorKind": error.kind(),
            "errors": errors,
        }),
        other => json!({
            "errorKind": other.kind(),
            "error": other.public_detail(),
        }),
    };
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn create_handler(
    State(service): State<Arc<MembershipApplicationService>>,
    axum::Json(request): axum::Json<NewApplication>,
) -> Response {
    match service
        .create(request)
        .and_then(|record| service.status(record.id()))
    {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<MembershipApplicationService>>,
    Path(application_id): Path<String>,
) -> Response {
    match service.status(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler(
    State(service): State<Arc<MembershipApplicationService>>,
    Path(application_id): Path<String>,
    axum::Json(draft): axum::Json<ApplicationDraft>,
) -> Response {
    let id = ApplicationId(application_id);
    match service
        .update(&id, draft)
        .and_then(|_| service.status(&id))
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resubmit_handler(
    State(service): State<Arc<MembershipApplicationService>>,
    Path(application_id): Path<String>,
    axum::Json(draft): axum::Json<ApplicationDraft>,
) -> Response {
    let result = service.resubmit(&ApplicationId(application_id), draft);
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(error) => status_code(error),
    };
    (status, axum::Json(TransitionResponse::from_result(&result))).into_response()
}

pub(crate) async fn transition_handler(
    State(service): State<Arc<MembershipApplicationService>>,
    Path((application_id, event)): Path<(String, String)>,
) -> Response {
    let request = TransitionRequest {
        application_id: ApplicationId(application_id),
        event_name: event,
    };
    let result = service.dispatch(&request);

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(error) => status_code(error),
    };
    (status, axum::Json(TransitionResponse::from_result(&result))).into_response()
}
