//! Bearer-token authentication and role-based route guards.
//!
//! `require_auth` validates the token and attaches an [`Identity`] to the request;
//! the remaining guards read it and apply one policy. Guards run in the order the
//! route table lists them and reject before the handler is reached.

mod password;
mod policy;
mod token;

pub use password::{hash_password, verify_password};
pub use policy::{is_admin, is_at_least_teacher, is_current_user};
pub use token::{issue_token, validate_token, Claims};

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::UserType;
use crate::AppState;

/// Header carrying the admin pre-shared key on signup.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated caller, decoded from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: UserType,
}

/// A role check applied after `require_auth`, in route-table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Admin,
    CurrentUser,
    AtLeastTeacher,
}

/// Guard: a valid bearer token is required.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match bearer_token(request.headers())
        .and_then(|token| validate_token(&state.config.jwt_secret, token))
    {
        Ok(claims) => Identity::from(claims),
        Err(e) => {
            tracing::debug!("Rejected request to {}: {}", request.uri().path(), e);
            return e.into_response();
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Guard: the caller must be an admin.
pub async fn require_admin(request: Request, next: Next) -> Response {
    let verdict = identity(&request).and_then(is_admin);
    match verdict {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, e),
    }
}

/// Guard: the caller must own the `{id}` in the path, or be an admin.
pub async fn require_current_user(
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let target = params.get("id").map(String::as_str).unwrap_or_default();
    let verdict = identity(&request).and_then(|identity| is_current_user(identity, target));
    match verdict {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, e),
    }
}

/// Guard: the caller must be a teacher or an admin.
pub async fn require_at_least_teacher(request: Request, next: Next) -> Response {
    let verdict = identity(&request).and_then(is_at_least_teacher);
    match verdict {
        Ok(()) => next.run(request).await,
        Err(e) => reject(&request, e),
    }
}

/// Check the admin pre-shared key in `headers`. Without a configured key nothing matches.
pub fn admin_key_matches(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| constant_time_compare(provided, expected))
}

/// Extract the token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AppError::Unauthorized(
            "Authorization header must use the Bearer scheme".to_string(),
        )),
    }
}

/// The identity attached by `require_auth`. Missing means the route table put a
/// role guard in front of authentication.
fn identity(request: &Request) -> Result<&Identity, AppError> {
    request
        .extensions()
        .get::<Identity>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
}

fn reject(request: &Request, error: AppError) -> Response {
    tracing::debug!("Rejected request to {}: {}", request.uri().path(), error);
    error.into_response()
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
