//! Course API endpoints.

use axum::extract::{Path, State};
use serde_json::Value;

use super::{created, success, ApiResult, Json};
use crate::errors::AppError;
use crate::models::{parse_partial, Course, CreateCourseRequest, UpdateCourseRequest};
use crate::AppState;

/// GET /courses - List all courses.
pub async fn list_courses(State(state): State<AppState>) -> ApiResult<Vec<Course>> {
    success(state.repo.list_courses().await?)
}

/// GET /courses/:id - Get a single course.
pub async fn get_course(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Course> {
    match state.repo.get_course(&id).await? {
        Some(course) => success(course),
        None => Err(AppError::NotFound(format!("Course {} not found", id))),
    }
}

/// POST /courses - Create a course.
pub async fn create_course(
    State(state): State<AppState>,
    Json(mut request): Json<CreateCourseRequest>,
) -> ApiResult<Course> {
    request.validate()?;
    created(state.repo.create_course(&request).await?)
}

/// PUT /courses/:id - Edit a course. Falsy fields in the body are ignored.
pub async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<Course> {
    let mut request: UpdateCourseRequest = parse_partial(payload)?;
    request.validate()?;
    success(state.repo.update_course(&id, &request).await?)
}

/// DELETE /courses/:id - Delete a course.
pub async fn delete_course(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Course> {
    success(state.repo.delete_course(&id).await?)
}
