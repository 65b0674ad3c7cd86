//! User account models.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Permission level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "moderator" => Some(Role::Moderator),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// A stored account. Never serialized directly; see [`UserResponse`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Role,
    pub created_at: String,
}

/// Public view of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
            created_at: user.created_at.clone(),
        }
    }
}

/// Request body for registering a new account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSchema {
    pub username: String,
    pub email: String,
    pub password: String,
}

const USERNAME_MIN: usize = 2;
const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 6;
// bcrypt ignores input past 72 bytes
const PASSWORD_MAX: usize = 72;

impl UserSchema {
    /// Validate the body and return it with trimmed username and lowercased email.
    pub fn normalized(&self) -> Result<UserSchema, AppError> {
        let username = self.username.trim();
        let len = username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
            return Err(AppError::Validation(format!(
                "Username must be between {} and {} characters",
                USERNAME_MIN, USERNAME_MAX
            )));
        }

        let email = normalize_email(&self.email);
        if !is_valid_email(&email) {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }

        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&self.password.len()) {
            return Err(AppError::Validation(format!(
                "Password must be between {} and {} bytes",
                PASSWORD_MIN, PASSWORD_MAX
            )));
        }

        Ok(UserSchema {
            username: username.to_string(),
            email,
            password: self.password.clone(),
        })
    }
}

/// Request body for logging in.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Request body for changing an account's role.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
