//! Route policies. Each is a pure check over the authenticated identity and the
//! request's path parameters.

use super::Identity;
use crate::errors::AppError;
use crate::models::UserType;

/// Only admins pass.
pub fn is_admin(identity: &Identity) -> Result<(), AppError> {
    if identity.role == UserType::Admin {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin role required".to_string()))
    }
}

/// The owner of `target_id`, or an admin, passes.
pub fn is_current_user(identity: &Identity, target_id: &str) -> Result<(), AppError> {
    if identity.role == UserType::Admin || identity.user_id == target_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Access limited to the account owner".to_string(),
        ))
    }
}

/// Teachers and admins pass.
pub fn is_at_least_teacher(identity: &Identity) -> Result<(), AppError> {
    match identity.role {
        UserType::Admin | UserType::Teacher => Ok(()),
        _ => Err(AppError::Forbidden("Teacher role required".to_string())),
    }
}
