//! Personal record shared by students, teachers and users.

use chrono::{DateTime, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize};

use super::{require_text, Subject};
use crate::errors::AppError;

/// Length of an Italian fiscal code.
pub const FISCAL_CODE_LEN: usize = 16;

/// A person enrolled in the registry together with their subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub fiscal_code: String,
    pub name: String,
    pub surname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    pub subjects: Vec<Subject>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a student or teacher.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonRequest {
    pub fiscal_code: String,
    pub name: String,
    pub surname: String,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date_of_birth: Option<NaiveDate>,
    /// Ids of existing subjects to link on creation
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl CreatePersonRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        self.fiscal_code = normalize_fiscal_code(&self.fiscal_code)?;
        self.name = require_text("name", &self.name)?;
        self.surname = require_text("surname", &self.surname)?;
        self.subjects.sort();
        self.subjects.dedup();
        Ok(())
    }
}

/// Request body for editing a student or teacher. Falsy fields are stripped before parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePersonRequest {
    #[serde(default)]
    pub fiscal_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date_of_birth: Option<NaiveDate>,
}

impl UpdatePersonRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        if let Some(code) = &self.fiscal_code {
            self.fiscal_code = Some(normalize_fiscal_code(code)?);
        }
        if let Some(name) = &self.name {
            self.name = Some(require_text("name", name)?);
        }
        if let Some(surname) = &self.surname {
            self.surname = Some(require_text("surname", surname)?);
        }
        Ok(())
    }
}

/// Check the shape of a fiscal code and return it upper-cased.
pub fn normalize_fiscal_code(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if code.len() != FISCAL_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(format!(
            "fiscalCode must be {} alphanumeric characters",
            FISCAL_CODE_LEN
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// Parse a calendar date sent by a browser client.
///
/// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp (the date in the timestamp's own
/// offset is kept) and the `Sat May 20 1995` form of `Date.toDateString()`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%a %b %d %Y").ok())
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| {
            parse_date(&raw).ok_or_else(|| de::Error::custom(format!("invalid date '{}'", raw)))
        })
        .transpose()
}
