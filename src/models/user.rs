//! User model: an authenticated account with a role.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{CreatePersonRequest, Person, UpdatePersonRequest};
use crate::errors::AppError;

/// Minimum accepted password length on signup.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Role tag carried by every user and embedded in its bearer token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::Teacher => "teacher",
            UserType::Student => "student",
            UserType::Parent => "parent",
        }
    }

}

impl FromStr for UserType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserType::Admin),
            "teacher" => Ok(UserType::Teacher),
            "student" => Ok(UserType::Student),
            "parent" => Ok(UserType::Parent),
            _ => Err(AppError::Validation(format!("Unknown user type '{}'", s))),
        }
    }
}

/// A user account. The password hash never leaves the repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub person: Person,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Compact user reference used when a grade or course expands its users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub fiscal_code: String,
    pub name: String,
    pub surname: String,
}

/// Query filter for `GET /users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    #[serde(default, rename = "type")]
    pub user_type: Option<UserType>,
}

/// Request body for `POST /auth/signup`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(flatten)]
    pub person: CreatePersonRequest,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        self.person.validate()?;
        self.email = normalize_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response body for a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub id: String,
}

/// Request body for editing a user. Falsy fields are stripped before parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(flatten)]
    pub person: UpdatePersonRequest,
    #[serde(default, rename = "type")]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl UpdateUserRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        self.person.validate()?;
        if let Some(email) = &self.email {
            self.email = Some(normalize_email(email)?);
        }
        if let Some(password) = &self.password {
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(AppError::Validation(format!(
                    "password must be at least {} characters",
                    MIN_PASSWORD_LEN
                )));
            }
        }
        Ok(())
    }
}

/// Lower-case an e-mail address after a minimal shape check.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_ascii_lowercase())
        }
        _ => Err(AppError::Validation(format!(
            "'{}' is not a valid email",
            email
        ))),
    }
}
