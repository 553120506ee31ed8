//! Subject API endpoints.

use axum::extract::{Path, State};
use serde_json::Value;

use super::{created, success, ApiResult, Json};
use crate::errors::AppError;
use crate::models::{parse_partial, CreateSubjectRequest, Subject, UpdateSubjectRequest};
use crate::AppState;

/// GET /subjects - List all subjects.
pub async fn list_subjects(State(state): State<AppState>) -> ApiResult<Vec<Subject>> {
    success(state.repo.list_subjects().await?)
}

/// GET /subjects/:id - Get a single subject.
pub async fn get_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Subject> {
    match state.repo.get_subject(&id).await? {
        Some(subject) => success(subject),
        None => Err(AppError::NotFound(format!("Subject {} not found", id))),
    }
}

/// POST /subjects - Create a subject.
pub async fn create_subject(
    State(state): State<AppState>,
    Json(mut request): Json<CreateSubjectRequest>,
) -> ApiResult<Subject> {
    request.validate()?;
    created(state.repo.create_subject(&request).await?)
}

/// PUT /subjects/:id - Edit a subject. Falsy fields in the body are ignored.
pub async fn update_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<Subject> {
    let mut request: UpdateSubjectRequest = parse_partial(payload)?;
    request.validate()?;
    success(state.repo.update_subject(&id, &request).await?)
}

/// DELETE /subjects/:id - Delete a subject.
pub async fn delete_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Subject> {
    success(state.repo.delete_subject(&id).await?)
}
