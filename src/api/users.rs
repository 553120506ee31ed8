//! User API endpoints.

use axum::{
    extract::{Path, State},
    Extension,
};
use serde_json::Value;

use super::{blocking, created, success, ApiResult, Json, Query};
use crate::auth::{hash_password, Identity};
use crate::db::Roster;
use crate::errors::AppError;
use crate::models::{
    parse_partial, AttachSubjectRequest, Subject, UpdateUserRequest, User, UserFilter, UserType,
};
use crate::AppState;

fn user_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("User {} not found", id))
}

/// GET /users - List users, optionally filtered by `?type=`.
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Vec<User>> {
    success(state.repo.list_users(&filter).await?)
}

/// GET /users/:id - Get a single user.
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<User> {
    match state.repo.get_user(&id).await? {
        Some(user) => success(user),
        None => Err(user_not_found(&id)),
    }
}

/// GET /users/:id/subjects - Subjects of a user.
pub async fn get_user_subjects(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Subject>> {
    success(state.repo.owned_subjects(Roster::Users, &id).await?)
}

/// POST /users/:id/subjects - Attach an existing or new subject to a user.
pub async fn attach_user_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AttachSubjectRequest>,
) -> ApiResult<User> {
    state
        .repo
        .attach_subject(Roster::Users, &id, &request)
        .await?;

    match state.repo.get_user(&id).await? {
        Some(user) => created(user),
        None => Err(user_not_found(&id)),
    }
}

/// PUT /users/:id - Edit a user. Falsy fields in the body are ignored.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<User> {
    let mut request: UpdateUserRequest = parse_partial(payload)?;
    request.validate()?;

    if request.user_type.is_some() && identity.role != UserType::Admin {
        return Err(AppError::Forbidden(
            "Only admins can change a user's type".to_string(),
        ));
    }

    let password_hash = match request.password.take() {
        Some(password) => Some(blocking(move || hash_password(&password)).await?),
        None => None,
    };

    let user = state
        .repo
        .update_user(&id, &request, password_hash.as_deref())
        .await?;
    success(user)
}

/// DELETE /users/:id - Delete a user.
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<User> {
    success(state.repo.delete_user(&id).await?)
}

/// DELETE /users/:id/subjects/:idSubject - Detach a subject from a user.
pub async fn detach_user_subject(
    State(state): State<AppState>,
    Path((id, subject_id)): Path<(String, String)>,
) -> ApiResult<Vec<Subject>> {
    success(
        state
            .repo
            .detach_subject(Roster::Users, &id, &subject_id)
            .await?,
    )
}
