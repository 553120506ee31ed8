//! User account operations.

use sqlx::{sqlite::SqliteRow, Row};

use super::people::{person_from_row, Roster, PERSON_COLUMNS};
use super::repository::{new_id, now};
use super::Repository;
use crate::errors::AppError;
use crate::models::{SignupRequest, Subject, UpdateUserRequest, User, UserFilter, UserType};

/// Stored login material for one account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub id: String,
    pub user_type: UserType,
    pub password_hash: String,
}

impl Repository {
    // ==================== USER OPERATIONS ====================

    /// List users, optionally restricted to one type.
    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let user_type = filter.user_type.map(|t| t.as_str());
        let rows = sqlx::query(&format!(
            "SELECT {}, type, email FROM users WHERE (? IS NULL OR type = ?) ORDER BY surname, name",
            PERSON_COLUMNS
        ))
        .bind(user_type)
        .bind(user_type)
        .fetch_all(&self.pool)
        .await?;

        let mut subjects = self
            .subjects_by_owner(Roster::Users.link_table(), None)
            .await?;
        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let owned = subjects.remove(&id).unwrap_or_default();
                user_from_row(row, owned)
            })
            .collect()
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {}, type, email FROM users WHERE id = ?",
            PERSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let subjects = self.subjects_of(Roster::Users, id).await?;
        user_from_row(&row, subjects).map(Some)
    }

    /// Create a user from a signup request. `password_hash` is the PHC string of the password.
    pub async fn create_user(
        &self,
        request: &SignupRequest,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let id = new_id();
        let now = now();
        let person = &request.person;

        let mut tx = self.begin_write().await?;

        sqlx::query(&format!(
            "INSERT INTO users ({}, type, email, password_hash) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PERSON_COLUMNS
        ))
        .bind(&id)
        .bind(&person.fiscal_code)
        .bind(&person.name)
        .bind(&person.surname)
        .bind(person.date_of_birth)
        .bind(&now)
        .bind(&now)
        .bind(request.user_type.as_str())
        .bind(&request.email)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        for subject_id in &person.subjects {
            sqlx::query("INSERT OR IGNORE INTO user_subjects (owner_id, subject_id) VALUES (?, ?)")
                .bind(&id)
                .bind(subject_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!("Created {} user {}", request.user_type.as_str(), id);
        self.get_user(&id)
            .await?
            .ok_or_else(|| Roster::Users.not_found(&id))
    }

    /// Look up login material by e-mail.
    pub async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, AppError> {
        let row = sqlx::query(
            "SELECT id, type, password_hash FROM users WHERE email = ? AND password_hash IS NOT NULL",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Credentials {
                id: row.get("id"),
                user_type: user_type_from_row(&row)?,
                password_hash: row.get("password_hash"),
            })
        })
        .transpose()
    }

    /// Merge the provided fields over a user. `password_hash` replaces the stored hash when set.
    pub async fn update_user(
        &self,
        id: &str,
        request: &UpdateUserRequest,
        password_hash: Option<&str>,
    ) -> Result<User, AppError> {
        let person = &request.person;
        let result = sqlx::query(
            "UPDATE users SET fiscal_code = COALESCE(?, fiscal_code), name = COALESCE(?, name), \
             surname = COALESCE(?, surname), date_of_birth = COALESCE(?, date_of_birth), \
             type = COALESCE(?, type), email = COALESCE(?, email), \
             password_hash = COALESCE(?, password_hash), updated_at = ? WHERE id = ?",
        )
        .bind(&person.fiscal_code)
        .bind(&person.name)
        .bind(&person.surname)
        .bind(person.date_of_birth)
        .bind(request.user_type.map(|t| t.as_str()))
        .bind(&request.email)
        .bind(password_hash)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Roster::Users.not_found(id));
        }

        self.get_user(id)
            .await?
            .ok_or_else(|| Roster::Users.not_found(id))
    }

    /// Delete a user and return it as it was before removal. Grades, subject links
    /// and course memberships of the user are removed with it.
    pub async fn delete_user(&self, id: &str) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| Roster::Users.not_found(id))?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Roster::Users.not_found(id));
        }

        tracing::info!("Deleted user {}", id);
        Ok(existing)
    }
}

fn user_type_from_row(row: &SqliteRow) -> Result<UserType, AppError> {
    let raw: String = row.get("type");
    raw.parse()
        .map_err(|_| AppError::Internal(format!("Unknown user type '{}' in store", raw)))
}

fn user_from_row(row: &SqliteRow, subjects: Vec<Subject>) -> Result<User, AppError> {
    Ok(User {
        person: person_from_row(row, subjects),
        user_type: user_type_from_row(row)?,
        email: row.get("email"),
    })
}
