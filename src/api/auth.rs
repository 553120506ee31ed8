//! Signup and login endpoints.

use axum::{extract::State, http::HeaderMap};

use super::{blocking, created, success, ApiResult, Json};
use crate::auth::{admin_key_matches, hash_password, issue_token, verify_password, Claims};
use crate::errors::AppError;
use crate::models::{normalize_email, LoginRequest, LoginResponse, SignupRequest, User, UserType};
use crate::AppState;

/// POST /auth/signup - Create a user account.
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<SignupRequest>,
) -> ApiResult<User> {
    request.validate()?;

    if request.user_type == UserType::Admin
        && !admin_key_matches(state.config.admin_psk.as_deref(), &headers)
    {
        tracing::warn!("Refused admin signup for {}", request.email);
        return Err(AppError::Forbidden(
            "Admin signup requires a valid admin key".to_string(),
        ));
    }

    let password = std::mem::take(&mut request.password);
    let password_hash = blocking(move || hash_password(&password)).await?;

    let user = state.repo.create_user(&request, &password_hash).await?;
    created(user)
}

/// POST /auth/login - Exchange e-mail and password for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(&request.email).map_err(|_| invalid())?;
    let credentials = state
        .repo
        .find_credentials(&email)
        .await?
        .ok_or_else(invalid)?;

    let password = request.password;
    let stored_hash = credentials.password_hash.clone();
    let verified = blocking(move || Ok(verify_password(&password, &stored_hash))).await?;
    if !verified {
        tracing::debug!("Failed login for {}", email);
        return Err(invalid());
    }

    let ttl = state.config.token_ttl_secs;
    let claims = Claims::new(credentials.id.clone(), credentials.user_type, ttl)?;
    let token = issue_token(&state.config.jwt_secret, &claims)?;

    tracing::info!("User {} logged in", credentials.id);
    success(LoginResponse {
        token,
        expires_in: ttl,
        id: credentials.id,
    })
}
