//! Course operations. Membership rows are written in the same transaction as the course.

use std::collections::HashMap;

use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use super::repository::{new_id, now, user_summary_from_row};
use super::Repository;
use crate::errors::AppError;
use crate::models::{Course, CreateCourseRequest, Subject, UpdateCourseRequest, UserSummary};

const COURSE_SUBJECTS: &str = "course_subjects";

/// Membership role of a user in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberRole {
    Student,
    Teacher,
}

impl MemberRole {
    fn as_str(self) -> &'static str {
        match self {
            MemberRole::Student => "student",
            MemberRole::Teacher => "teacher",
        }
    }
}

#[derive(Default)]
struct Members {
    students: Vec<UserSummary>,
    teachers: Vec<UserSummary>,
}

fn course_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Course {} not found", id))
}

impl Repository {
    // ==================== COURSE OPERATIONS ====================

    /// List all courses with members and subjects expanded.
    pub async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, year, status, created_at, updated_at FROM courses ORDER BY year DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut members = self.course_members(None).await?;
        let mut subjects = self.subjects_by_owner(COURSE_SUBJECTS, None).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let owned_members = members.remove(&id).unwrap_or_default();
                let owned_subjects = subjects.remove(&id).unwrap_or_default();
                course_from_row(row, owned_members, owned_subjects)
            })
            .collect())
    }

    /// Get a course by ID.
    pub async fn get_course(&self, id: &str) -> Result<Option<Course>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, year, status, created_at, updated_at FROM courses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let members = self
            .course_members(Some(id))
            .await?
            .remove(id)
            .unwrap_or_default();
        let subjects = self
            .subjects_by_owner(COURSE_SUBJECTS, Some(id))
            .await?
            .remove(id)
            .unwrap_or_default();
        Ok(Some(course_from_row(&row, members, subjects)))
    }

    /// Create a course together with its members and subjects.
    pub async fn create_course(&self, request: &CreateCourseRequest) -> Result<Course, AppError> {
        let id = new_id();
        let now = now();

        let mut tx = self.begin_write().await?;

        sqlx::query(
            "INSERT INTO courses (id, name, year, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(request.year)
        .bind(&request.status)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        replace_members(&mut tx, &id, MemberRole::Student, &request.students).await?;
        replace_members(&mut tx, &id, MemberRole::Teacher, &request.teachers).await?;
        replace_subjects(&mut tx, &id, &request.subjects).await?;

        tx.commit().await?;

        tracing::info!("Created course {}", id);
        self.get_course(&id)
            .await?
            .ok_or_else(|| course_not_found(&id))
    }

    /// Merge the provided fields over a course; present member lists replace the stored ones.
    pub async fn update_course(
        &self,
        id: &str,
        request: &UpdateCourseRequest,
    ) -> Result<Course, AppError> {
        let mut tx = self.begin_write().await?;

        let result = sqlx::query(
            "UPDATE courses SET name = COALESCE(?, name), year = COALESCE(?, year), \
             status = COALESCE(?, status), updated_at = ? WHERE id = ?",
        )
        .bind(&request.name)
        .bind(request.year)
        .bind(&request.status)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(course_not_found(id));
        }

        if let Some(students) = &request.students {
            replace_members(&mut tx, id, MemberRole::Student, students).await?;
        }
        if let Some(teachers) = &request.teachers {
            replace_members(&mut tx, id, MemberRole::Teacher, teachers).await?;
        }
        if let Some(subjects) = &request.subjects {
            replace_subjects(&mut tx, id, subjects).await?;
        }

        tx.commit().await?;

        self.get_course(id)
            .await?
            .ok_or_else(|| course_not_found(id))
    }

    /// Delete a course and return it as it was before removal.
    pub async fn delete_course(&self, id: &str) -> Result<Course, AppError> {
        let existing = self
            .get_course(id)
            .await?
            .ok_or_else(|| course_not_found(id))?;

        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(course_not_found(id));
        }

        tracing::info!("Deleted course {}", id);
        Ok(existing)
    }

    /// Expanded members grouped by course.
    async fn course_members(
        &self,
        course_id: Option<&str>,
    ) -> Result<HashMap<String, Members>, AppError> {
        let filter = if course_id.is_some() {
            "WHERE cm.course_id = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT cm.course_id, cm.role, u.id AS user_id, u.fiscal_code AS user_fiscal_code, \
             u.name AS user_name, u.surname AS user_surname \
             FROM course_members cm JOIN users u ON u.id = cm.user_id {} \
             ORDER BY u.surname, u.name",
            filter
        );

        let mut query = sqlx::query(&sql);
        if let Some(course_id) = course_id {
            query = query.bind(course_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut grouped: HashMap<String, Members> = HashMap::new();
        for row in &rows {
            let role: String = row.get("role");
            let members = grouped.entry(row.get("course_id")).or_default();
            let summary = user_summary_from_row(row, "user_");
            if role == MemberRole::Teacher.as_str() {
                members.teachers.push(summary);
            } else {
                members.students.push(summary);
            }
        }
        Ok(grouped)
    }
}

/// Replace one role's member set. Every id must name a user of the matching type.
async fn replace_members(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: &str,
    role: MemberRole,
    user_ids: &[String],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM course_members WHERE course_id = ? AND role = ?")
        .bind(course_id)
        .bind(role.as_str())
        .execute(&mut **tx)
        .await?;

    for user_id in user_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO course_members (course_id, user_id, role) \
             SELECT ?, id, ? FROM users WHERE id = ? AND type = ?",
        )
        .bind(course_id)
        .bind(role.as_str())
        .bind(user_id)
        .bind(role.as_str())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Validation(format!(
                "User {} is not a {}",
                user_id,
                role.as_str()
            )));
        }
    }
    Ok(())
}

async fn replace_subjects(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: &str,
    subject_ids: &[String],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM course_subjects WHERE owner_id = ?")
        .bind(course_id)
        .execute(&mut **tx)
        .await?;

    for subject_id in subject_ids {
        sqlx::query("INSERT OR IGNORE INTO course_subjects (owner_id, subject_id) VALUES (?, ?)")
            .bind(course_id)
            .bind(subject_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

fn course_from_row(row: &SqliteRow, members: Members, subjects: Vec<Subject>) -> Course {
    Course {
        id: row.get("id"),
        name: row.get("name"),
        year: row.get("year"),
        status: row.get("status"),
        students: members.students,
        teachers: members.teachers,
        subjects,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
