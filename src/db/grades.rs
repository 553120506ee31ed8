//! Grade operations. Grades belong to a user and reference a subject.

use sqlx::{sqlite::SqliteRow, Row};

use super::people::Roster;
use super::repository::{new_id, now, user_summary_from_row};
use super::Repository;
use crate::errors::AppError;
use crate::models::{CreateGradeRequest, Grade, Subject, UpdateGradeRequest};

const GRADE_SELECT: &str = r#"
    SELECT g.id, g.grade, g.created_at, g.updated_at,
           s.id AS subject_id, s.name AS subject_name, s.hours AS subject_hours,
           u.id AS user_id, u.fiscal_code AS user_fiscal_code,
           u.name AS user_name, u.surname AS user_surname
    FROM grades g
    JOIN subjects s ON s.id = g.subject_id
    JOIN users u ON u.id = g.user_id
"#;

fn grade_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Grade {} not found", id))
}

impl Repository {
    // ==================== GRADE OPERATIONS ====================

    /// List all grades.
    pub async fn list_grades(&self) -> Result<Vec<Grade>, AppError> {
        let rows = sqlx::query(&format!("{} ORDER BY g.created_at, g.id", GRADE_SELECT))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(grade_from_row).collect())
    }

    /// List the grades of one user.
    pub async fn grades_of(&self, user_id: &str) -> Result<Vec<Grade>, AppError> {
        if !self.exists(Roster::Users.table(), user_id).await? {
            return Err(Roster::Users.not_found(user_id));
        }

        let rows = sqlx::query(&format!(
            "{} WHERE g.user_id = ? ORDER BY g.created_at, g.id",
            GRADE_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(grade_from_row).collect())
    }

    /// Get a grade by ID.
    pub async fn get_grade(&self, id: &str) -> Result<Option<Grade>, AppError> {
        let row = sqlx::query(&format!("{} WHERE g.id = ?", GRADE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(grade_from_row))
    }

    /// Record a grade for a user. A missing subject is a validation error.
    pub async fn add_grade(
        &self,
        user_id: &str,
        request: &CreateGradeRequest,
    ) -> Result<Grade, AppError> {
        if !self.exists(Roster::Users.table(), user_id).await? {
            return Err(Roster::Users.not_found(user_id));
        }

        let id = new_id();
        let now = now();

        sqlx::query(
            "INSERT INTO grades (id, grade, subject_id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.grade)
        .bind(&request.subject)
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Recorded grade {} for user {}", id, user_id);
        self.get_grade(&id).await?.ok_or_else(|| grade_not_found(&id))
    }

    /// Merge the provided fields over a grade owned by `user_id`.
    pub async fn update_grade(
        &self,
        user_id: &str,
        grade_id: &str,
        request: &UpdateGradeRequest,
    ) -> Result<Grade, AppError> {
        let result = sqlx::query(
            "UPDATE grades SET grade = COALESCE(?, grade), subject_id = COALESCE(?, subject_id), \
             updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(request.grade)
        .bind(&request.subject)
        .bind(now())
        .bind(grade_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(grade_not_found(grade_id));
        }

        self.get_grade(grade_id)
            .await?
            .ok_or_else(|| grade_not_found(grade_id))
    }

    /// Delete a grade owned by `user_id` and return it.
    pub async fn delete_grade(&self, user_id: &str, grade_id: &str) -> Result<Grade, AppError> {
        let existing = self
            .get_grade(grade_id)
            .await?
            .filter(|grade| grade.user.id == user_id)
            .ok_or_else(|| grade_not_found(grade_id))?;

        let result = sqlx::query("DELETE FROM grades WHERE id = ? AND user_id = ?")
            .bind(grade_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(grade_not_found(grade_id));
        }

        tracing::info!("Deleted grade {} of user {}", grade_id, user_id);
        Ok(existing)
    }
}

fn grade_from_row(row: &SqliteRow) -> Grade {
    Grade {
        id: row.get("id"),
        grade: row.get("grade"),
        subject: Subject {
            id: row.get("subject_id"),
            name: row.get("subject_name"),
            hours: row.get("subject_hours"),
        },
        user: user_summary_from_row(row, "user_"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
