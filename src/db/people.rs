//! Operations shared by every personal record table (users, students, teachers):
//! CRUD for students and teachers, and subject attach/detach for all three.

use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};

use super::repository::{new_id, now, subject_from_row};
use super::Repository;
use crate::errors::AppError;
use crate::models::{AttachSubjectRequest, CreatePersonRequest, Person, Subject, UpdatePersonRequest};

/// Columns common to every personal record table.
pub(super) const PERSON_COLUMNS: &str =
    "id, fiscal_code, name, surname, date_of_birth, created_at, updated_at";

/// A table of personal records that owns a set of subject references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Roster {
    Users,
    Students,
    Teachers,
}

impl Roster {
    pub(super) fn table(self) -> &'static str {
        match self {
            Roster::Users => "users",
            Roster::Students => "students",
            Roster::Teachers => "teachers",
        }
    }

    pub(super) fn link_table(self) -> &'static str {
        match self {
            Roster::Users => "user_subjects",
            Roster::Students => "student_subjects",
            Roster::Teachers => "teacher_subjects",
        }
    }

    /// Human-readable record name used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Roster::Users => "User",
            Roster::Students => "Student",
            Roster::Teachers => "Teacher",
        }
    }

    pub fn not_found(self, id: &str) -> AppError {
        AppError::NotFound(format!("{} {} not found", self.label(), id))
    }
}

impl Repository {
    // ==================== STUDENT / TEACHER OPERATIONS ====================

    /// List all records of a roster with their subjects expanded.
    pub async fn list_people(&self, roster: Roster) -> Result<Vec<Person>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} ORDER BY surname, name",
            PERSON_COLUMNS,
            roster.table()
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut subjects = self.subjects_by_owner(roster.link_table(), None).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let owned = subjects.remove(&id).unwrap_or_default();
                person_from_row(row, owned)
            })
            .collect())
    }

    /// Get a record by ID with its subjects expanded.
    pub async fn get_person(&self, roster: Roster, id: &str) -> Result<Option<Person>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE id = ?",
            PERSON_COLUMNS,
            roster.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let subjects = self.subjects_of(roster, id).await?;
        Ok(Some(person_from_row(&row, subjects)))
    }

    /// Create a student or teacher, linking the given subjects in the same transaction.
    pub async fn create_person(
        &self,
        roster: Roster,
        request: &CreatePersonRequest,
    ) -> Result<Person, AppError> {
        let id = new_id();
        let now = now();

        let mut tx = self.begin_write().await?;

        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            roster.table(),
            PERSON_COLUMNS
        ))
        .bind(&id)
        .bind(&request.fiscal_code)
        .bind(&request.name)
        .bind(&request.surname)
        .bind(request.date_of_birth)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for subject_id in &request.subjects {
            sqlx::query(&format!(
                "INSERT OR IGNORE INTO {} (owner_id, subject_id) VALUES (?, ?)",
                roster.link_table()
            ))
            .bind(&id)
            .bind(subject_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!("Created {} {}", roster.label().to_lowercase(), id);
        self.get_person(roster, &id)
            .await?
            .ok_or_else(|| roster.not_found(&id))
    }

    /// Merge the provided fields over a record in a single statement.
    pub async fn update_person(
        &self,
        roster: Roster,
        id: &str,
        request: &UpdatePersonRequest,
    ) -> Result<Person, AppError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET fiscal_code = COALESCE(?, fiscal_code), name = COALESCE(?, name), \
             surname = COALESCE(?, surname), date_of_birth = COALESCE(?, date_of_birth), \
             updated_at = ? WHERE id = ?",
            roster.table()
        ))
        .bind(&request.fiscal_code)
        .bind(&request.name)
        .bind(&request.surname)
        .bind(request.date_of_birth)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(roster.not_found(id));
        }

        self.get_person(roster, id)
            .await?
            .ok_or_else(|| roster.not_found(id))
    }

    /// Delete a record and return it as it was before removal.
    pub async fn delete_person(&self, roster: Roster, id: &str) -> Result<Person, AppError> {
        let existing = self
            .get_person(roster, id)
            .await?
            .ok_or_else(|| roster.not_found(id))?;

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", roster.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        // Lost a race with a concurrent delete
        if result.rows_affected() == 0 {
            return Err(roster.not_found(id));
        }

        tracing::info!("Deleted {} {}", roster.label().to_lowercase(), id);
        Ok(existing)
    }

    // ==================== SUBJECT LINKS ====================

    /// Subjects referenced by one record, ordered by name.
    pub async fn subjects_of(&self, roster: Roster, id: &str) -> Result<Vec<Subject>, AppError> {
        let mut grouped = self
            .subjects_by_owner(roster.link_table(), Some(id))
            .await?;
        Ok(grouped.remove(id).unwrap_or_default())
    }

    /// Subjects of a record that must exist.
    pub async fn owned_subjects(&self, roster: Roster, id: &str) -> Result<Vec<Subject>, AppError> {
        if !self.exists(roster.table(), id).await? {
            return Err(roster.not_found(id));
        }
        self.subjects_of(roster, id).await
    }

    /// Link a subject to a record, creating the subject first when `request.id`
    /// does not name an existing one. Both steps share one transaction and the
    /// link has set semantics.
    pub async fn attach_subject(
        &self,
        roster: Roster,
        owner_id: &str,
        request: &AttachSubjectRequest,
    ) -> Result<Subject, AppError> {
        let mut tx = self.begin_write().await?;

        let owner = sqlx::query(&format!("SELECT id FROM {} WHERE id = ?", roster.table()))
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            return Err(roster.not_found(owner_id));
        }

        let existing = match &request.id {
            Some(subject_id) => sqlx::query("SELECT id, name, hours FROM subjects WHERE id = ?")
                .bind(subject_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| subject_from_row(&row)),
            None => None,
        };

        let subject = match existing {
            Some(subject) => subject,
            None => {
                let create = request.to_create()?;
                let subject = Subject {
                    id: new_id(),
                    name: create.name,
                    hours: create.hours,
                };
                sqlx::query("INSERT INTO subjects (id, name, hours) VALUES (?, ?, ?)")
                    .bind(&subject.id)
                    .bind(&subject.name)
                    .bind(subject.hours)
                    .execute(&mut *tx)
                    .await?;
                tracing::info!("Created subject {} while attaching", subject.id);
                subject
            }
        };

        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (owner_id, subject_id) VALUES (?, ?)",
            roster.link_table()
        ))
        .bind(owner_id)
        .bind(&subject.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(subject)
    }

    /// Remove a subject link. Detaching a subject that is not attached is not an error.
    pub async fn detach_subject(
        &self,
        roster: Roster,
        owner_id: &str,
        subject_id: &str,
    ) -> Result<Vec<Subject>, AppError> {
        if !self.exists(roster.table(), owner_id).await? {
            return Err(roster.not_found(owner_id));
        }

        sqlx::query(&format!(
            "DELETE FROM {} WHERE owner_id = ? AND subject_id = ?",
            roster.link_table()
        ))
        .bind(owner_id)
        .bind(subject_id)
        .execute(&self.pool)
        .await?;

        self.subjects_of(roster, owner_id).await
    }
}

pub(super) fn person_from_row(row: &SqliteRow, subjects: Vec<Subject>) -> Person {
    let date_of_birth: Option<NaiveDate> = row.get("date_of_birth");
    Person {
        id: row.get("id"),
        fiscal_code: row.get("fiscal_code"),
        name: row.get("name"),
        surname: row.get("surname"),
        date_of_birth,
        subjects,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
