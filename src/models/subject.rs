//! Subject model: a named course unit with a weekly hour count.

use serde::{Deserialize, Serialize};

use super::require_text;
use crate::errors::AppError;

/// A course unit referenced by users, students, teachers, courses and grades.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub hours: i64,
}

/// Request body for creating a subject.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubjectRequest {
    pub name: String,
    #[serde(default)]
    pub hours: i64,
}

impl CreateSubjectRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        self.name = require_text("name", &self.name)?;
        validate_hours(self.hours)
    }
}

/// Request body for editing a subject. Falsy fields are stripped before parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hours: Option<i64>,
}

impl UpdateSubjectRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        if let Some(hours) = self.hours {
            validate_hours(hours)?;
        }
        Ok(())
    }
}

/// Request body for attaching a subject to a user, student or teacher.
///
/// When `id` names an existing subject it is reused; otherwise a new subject is
/// created from `name` and `hours`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachSubjectRequest {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hours: i64,
}

impl AttachSubjectRequest {
    /// The payload used when no existing subject matches `id`.
    pub fn to_create(&self) -> Result<CreateSubjectRequest, AppError> {
        let name = self.name.as_deref().unwrap_or_default();
        let mut request = CreateSubjectRequest {
            name: name.to_string(),
            hours: self.hours,
        };
        request
            .validate()
            .map_err(|_| AppError::Validation(
                "Subject not found; a name is required to create it".to_string(),
            ))?;
        Ok(request)
    }
}

fn validate_hours(hours: i64) -> Result<(), AppError> {
    if hours < 0 {
        return Err(AppError::Validation(
            "hours must not be negative".to_string(),
        ));
    }
    Ok(())
}
