//! Grade model: a 0–10 score a user received in a subject.

use serde::{Deserialize, Serialize};

use super::{Subject, UserSummary};
use crate::errors::AppError;

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 10.0;

/// A grade with its subject and user expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub grade: f64,
    pub subject: Subject,
    pub user: UserSummary,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for `POST /users/{id}/grades`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGradeRequest {
    /// Subject id
    pub subject: String,
    pub grade: f64,
}

impl CreateGradeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.subject.trim().is_empty() {
            return Err(AppError::Validation("subject is required".to_string()));
        }
        validate_grade(self.grade)
    }
}

/// Request body for editing a grade. Falsy fields are stripped before parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGradeRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade: Option<f64>,
}

impl UpdateGradeRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match self.grade {
            Some(grade) => validate_grade(grade),
            None => Ok(()),
        }
    }
}

/// Grades must be finite and within [0, 10].
pub fn validate_grade(grade: f64) -> Result<(), AppError> {
    if !grade.is_finite() || !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
        return Err(AppError::Validation(format!(
            "grade must be between {} and {}, got {}",
            MIN_GRADE, MAX_GRADE, grade
        )));
    }
    Ok(())
}
