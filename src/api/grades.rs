//! Grade API endpoints.

use axum::extract::{Path, State};
use serde_json::Value;

use super::{created, success, ApiResult, Json};
use crate::errors::AppError;
use crate::models::{parse_partial, CreateGradeRequest, Grade, UpdateGradeRequest};
use crate::AppState;

/// GET /grades - List all grades.
pub async fn list_grades(State(state): State<AppState>) -> ApiResult<Vec<Grade>> {
    success(state.repo.list_grades().await?)
}

/// GET /grades/:id - Get a single grade.
pub async fn get_grade(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Grade> {
    match state.repo.get_grade(&id).await? {
        Some(grade) => success(grade),
        None => Err(AppError::NotFound(format!("Grade {} not found", id))),
    }
}

/// GET /users/:id/grades - Grades of one user.
pub async fn list_user_grades(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Grade>> {
    success(state.repo.grades_of(&id).await?)
}

/// POST /users/:id/grades - Record a grade for a user.
pub async fn add_user_grade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateGradeRequest>,
) -> ApiResult<Grade> {
    request.validate()?;
    created(state.repo.add_grade(&id, &request).await?)
}

/// PUT /users/:id/grades/:idGrade - Edit a grade. Falsy fields in the body are ignored.
pub async fn update_user_grade(
    State(state): State<AppState>,
    Path((id, grade_id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult<Grade> {
    let request: UpdateGradeRequest = parse_partial(payload)?;
    request.validate()?;
    success(state.repo.update_grade(&id, &grade_id, &request).await?)
}

/// DELETE /users/:id/grades/:idGrade - Delete a grade.
pub async fn delete_user_grade(
    State(state): State<AppState>,
    Path((id, grade_id)): Path<(String, String)>,
) -> ApiResult<Grade> {
    success(state.repo.delete_grade(&id, &grade_id).await?)
}
