//! User account DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{
    email, max_items, optional_range, require_text, timezone, Validate, ValidationError,
};

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 256;
pub const MAX_DISPLAY_NAME_CHARS: usize = 80;
pub const MAX_HOUSEHOLD_SIZE: i64 = 20;
pub const MAX_DIETARY_PREFERENCES: usize = 20;

/// Public view of a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub household_size: i64,
    pub dietary_preferences: Vec<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// POST /api/auth/register request
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        email("email", &self.email)?;
        validate_password(&self.password)?;
        require_text("display_name", &self.display_name, MAX_DISPLAY_NAME_CHARS)
    }
}

/// POST /api/auth/login request
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("email", &self.email, 254)?;
        require_text("password", &self.password, MAX_PASSWORD_CHARS)
    }
}

/// Register/login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// PATCH /api/users/me request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub household_size: Option<i64>,
    pub dietary_preferences: Option<Vec<String>>,
    pub timezone: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.display_name {
            require_text("display_name", name, MAX_DISPLAY_NAME_CHARS)?;
        }
        optional_range("household_size", self.household_size, 1, MAX_HOUSEHOLD_SIZE)?;
        if let Some(prefs) = &self.dietary_preferences {
            max_items("dietary_preferences", prefs, MAX_DIETARY_PREFERENCES)?;
            for (index, pref) in prefs.iter().enumerate() {
                require_text(&format!("dietary_preferences[{}]", index), pref, 60)?;
            }
        }
        if let Some(tz) = &self.timezone {
            timezone("timezone", tz)?;
        }
        Ok(())
    }
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_CHARS {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_CHARS),
        ));
    }
    if len > MAX_PASSWORD_CHARS {
        return Err(ValidationError::new(
            "password",
            format!("must be at most {} characters", MAX_PASSWORD_CHARS),
        ));
    }
    Ok(())
}
