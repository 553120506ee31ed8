//! Subject operations.

use super::repository::{new_id, subject_from_row};
use super::Repository;
use crate::errors::AppError;
use crate::models::{CreateSubjectRequest, Subject, UpdateSubjectRequest};

impl Repository {
    // ==================== SUBJECT OPERATIONS ====================

    /// List all subjects.
    pub async fn list_subjects(&self) -> Result<Vec<Subject>, AppError> {
        let rows = sqlx::query("SELECT id, name, hours FROM subjects ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(subject_from_row).collect())
    }

    /// Get a subject by ID.
    pub async fn get_subject(&self, id: &str) -> Result<Option<Subject>, AppError> {
        let row = sqlx::query("SELECT id, name, hours FROM subjects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(subject_from_row))
    }

    /// Create a new subject.
    pub async fn create_subject(&self, request: &CreateSubjectRequest) -> Result<Subject, AppError> {
        let id = new_id();

        sqlx::query("INSERT INTO subjects (id, name, hours) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&request.name)
            .bind(request.hours)
            .execute(&self.pool)
            .await?;

        tracing::info!("Created subject {}", id);
        Ok(Subject {
            id,
            name: request.name.clone(),
            hours: request.hours,
        })
    }

    /// Merge the provided fields over a subject.
    pub async fn update_subject(
        &self,
        id: &str,
        request: &UpdateSubjectRequest,
    ) -> Result<Subject, AppError> {
        let row = sqlx::query(
            "UPDATE subjects SET name = COALESCE(?, name), hours = COALESCE(?, hours) \
             WHERE id = ? RETURNING id, name, hours",
        )
        .bind(&request.name)
        .bind(request.hours)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(subject_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Subject {} not found", id)))
    }

    /// Delete a subject. Links and grades referencing it are removed with it.
    pub async fn delete_subject(&self, id: &str) -> Result<Subject, AppError> {
        let row = sqlx::query("DELETE FROM subjects WHERE id = ? RETURNING id, name, hours")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let subject = row
            .as_ref()
            .map(subject_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Subject {} not found", id)))?;

        tracing::info!("Deleted subject {}", id);
        Ok(subject)
    }
}
