//! Student and teacher API endpoints.
//!
//! Both resources share one set of handlers, instantiated per roster:
//! `get(list_people::<Students>)`.

use axum::extract::{Path, State};
use serde_json::Value;

use super::{created, success, ApiResult, Json};
use crate::db::Roster;
use crate::models::{
    parse_partial, AttachSubjectRequest, CreatePersonRequest, Person, Subject, UpdatePersonRequest,
};
use crate::AppState;

/// Selects the table a set of person handlers operates on.
pub trait RosterScope: Send + Sync + 'static {
    const ROSTER: Roster;
}

/// `/students` handlers.
pub struct Students;

/// `/teachers` handlers.
pub struct Teachers;

impl RosterScope for Students {
    const ROSTER: Roster = Roster::Students;
}

impl RosterScope for Teachers {
    const ROSTER: Roster = Roster::Teachers;
}

/// GET /{roster} - List all records.
pub async fn list_people<R: RosterScope>(State(state): State<AppState>) -> ApiResult<Vec<Person>> {
    success(state.repo.list_people(R::ROSTER).await?)
}

/// GET /{roster}/:id - Get a single record.
pub async fn get_person<R: RosterScope>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Person> {
    match state.repo.get_person(R::ROSTER, &id).await? {
        Some(person) => success(person),
        None => Err(R::ROSTER.not_found(&id)),
    }
}

/// POST /{roster} - Create a record.
pub async fn create_person<R: RosterScope>(
    State(state): State<AppState>,
    Json(mut request): Json<CreatePersonRequest>,
) -> ApiResult<Person> {
    request.validate()?;
    created(state.repo.create_person(R::ROSTER, &request).await?)
}

/// PUT /{roster}/:id - Edit a record. Falsy fields in the body are ignored.
pub async fn update_person<R: RosterScope>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<Person> {
    let mut request: UpdatePersonRequest = parse_partial(payload)?;
    request.validate()?;
    success(state.repo.update_person(R::ROSTER, &id, &request).await?)
}

/// DELETE /{roster}/:id - Delete a record.
pub async fn delete_person<R: RosterScope>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Person> {
    success(state.repo.delete_person(R::ROSTER, &id).await?)
}

/// GET /{roster}/:id/subjects - Subjects of a record.
pub async fn person_subjects<R: RosterScope>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Subject>> {
    success(state.repo.owned_subjects(R::ROSTER, &id).await?)
}

/// POST /{roster}/:id/subjects - Attach an existing or new subject.
pub async fn attach_person_subject<R: RosterScope>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AttachSubjectRequest>,
) -> ApiResult<Person> {
    state.repo.attach_subject(R::ROSTER, &id, &request).await?;

    match state.repo.get_person(R::ROSTER, &id).await? {
        Some(person) => created(person),
        None => Err(R::ROSTER.not_found(&id)),
    }
}

/// DELETE /{roster}/:id/subjects/:idSubject - Detach a subject.
pub async fn detach_person_subject<R: RosterScope>(
    State(state): State<AppState>,
    Path((id, subject_id)): Path<(String, String)>,
) -> ApiResult<Vec<Subject>> {
    success(
        state
            .repo
            .detach_subject(R::ROSTER, &id, &subject_id)
            .await?,
    )
}
