//! Database repository shared by all resource operations.
//!
//! Each entity's operations live in their own `impl Repository` block; this file
//! holds the pool and the row helpers used to expand references.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};

use crate::errors::AppError;
use crate::models::{Subject, UserSummary};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a transaction that takes the write lock on its first statement.
    ///
    /// A deferred transaction that reads before writing cannot upgrade its lock
    /// after another connection commits in WAL mode; it fails with SQLITE_BUSY
    /// without waiting on the busy timeout.
    pub(super) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Check whether a row with `id` exists in `table`.
    pub(super) async fn exists(&self, table: &str, id: &str) -> Result<bool, AppError> {
        let row = sqlx::query(&format!("SELECT 1 FROM {} WHERE id = ?", table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Expand the subject references stored in a link table, grouped by owner.
    ///
    /// With `owner_id` set only that owner's links are read.
    pub(super) async fn subjects_by_owner(
        &self,
        link_table: &str,
        owner_id: Option<&str>,
    ) -> Result<HashMap<String, Vec<Subject>>, AppError> {
        let filter = if owner_id.is_some() {
            "WHERE l.owner_id = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT l.owner_id, s.id, s.name, s.hours FROM {} l \
             JOIN subjects s ON s.id = l.subject_id {} ORDER BY s.name, s.id",
            link_table, filter
        );

        let mut query = sqlx::query(&sql);
        if let Some(owner_id) = owner_id {
            query = query.bind(owner_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut grouped: HashMap<String, Vec<Subject>> = HashMap::new();
        for row in &rows {
            grouped
                .entry(row.get("owner_id"))
                .or_default()
                .push(subject_from_row(row));
        }
        Ok(grouped)
    }
}

/// Current time as an RFC 3339 string.
pub(super) fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(super) fn subject_from_row(row: &SqliteRow) -> Subject {
    Subject {
        id: row.get("id"),
        name: row.get("name"),
        hours: row.get("hours"),
    }
}

/// Read a user summary from columns named `{prefix}id`, `{prefix}fiscal_code`, ...
pub(super) fn user_summary_from_row(row: &SqliteRow, prefix: &str) -> UserSummary {
    UserSummary {
        id: row.get(format!("{}id", prefix).as_str()),
        fiscal_code: row.get(format!("{}fiscal_code", prefix).as_str()),
        name: row.get(format!("{}name", prefix).as_str()),
        surname: row.get(format!("{}surname", prefix).as_str()),
    }
}
