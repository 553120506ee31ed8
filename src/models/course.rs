//! Course model: a year-scoped offering with enrolled users and subjects.

use serde::{Deserialize, Serialize};

use super::{require_text, Subject, UserSummary};
use crate::errors::AppError;

fn default_status() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub year: i64,
    pub status: String,
    pub students: Vec<UserSummary>,
    pub teachers: Vec<UserSummary>,
    pub subjects: Vec<Subject>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a course. Member lists hold user and subject ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub name: String,
    pub year: i64,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub students: Vec<String>,
    #[serde(default)]
    pub teachers: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl CreateCourseRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        self.name = require_text("name", &self.name)?;
        self.status = require_text("status", &self.status)?;
        validate_year(self.year)?;
        dedup(&mut self.students);
        dedup(&mut self.teachers);
        dedup(&mut self.subjects);
        Ok(())
    }
}

/// Request body for editing a course. Falsy fields are stripped before parsing;
/// a member list that is present, even empty, replaces the stored one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub students: Option<Vec<String>>,
    #[serde(default)]
    pub teachers: Option<Vec<String>>,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
}

impl UpdateCourseRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        if let Some(status) = &self.status {
            self.status = Some(require_text("status", status)?);
        }
        if let Some(year) = self.year {
            validate_year(year)?;
        }
        for ids in [&mut self.students, &mut self.teachers, &mut self.subjects]
            .into_iter()
            .flatten()
        {
            dedup(ids);
        }
        Ok(())
    }
}

fn validate_year(year: i64) -> Result<(), AppError> {
    if year <= 0 {
        return Err(AppError::Validation("year must be positive".to_string()));
    }
    Ok(())
}

fn dedup(ids: &mut Vec<String>) {
    ids.sort();
    ids.dedup();
}
