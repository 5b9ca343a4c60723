use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(mut self) -> Result<Self, ApiError> {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        if self.name.is_empty() {
            return Err(ApiError::Validation("Name is required".into()));
        }
        if !is_valid_email(&self.email) {
            return Err(ApiError::Validation("Please include a valid email".into()));
        }
        if self.password.chars().count() < 6 {
            return Err(ApiError::Validation(
                "Please enter a password with 6 or more characters".into(),
            ));
        }
        Ok(self)
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Returns the trimmed email and the password.
    pub fn validate(self) -> Result<(String, String), ApiError> {
        let email = self.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(ApiError::Validation("Please include a valid email".into()));
        }
        let password = self
            .password
            .ok_or_else(|| ApiError::Validation("Password is required".into()))?;
        Ok((email, password))
    }
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

impl TokenResponse {
    pub fn new(token: String) -> Self {
        Self {
            success: true,
            token,
        }
    }
}
