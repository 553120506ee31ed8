//! Data models for the school registry.
//!
//! JSON field names are camelCase to match the single-page front end.

mod course;
mod grade;
mod partial;
mod person;
mod subject;
mod user;

pub use course::*;
pub use grade::*;
pub use partial::*;
pub use person::*;
pub use subject::*;
pub use user::*;

use crate::errors::AppError;

/// Trim a required text field, rejecting blank values.
pub(crate) fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}
