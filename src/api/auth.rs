//! Signup, login and token refresh endpoints.

use axum::{extract::State, http::HeaderMap, Json};

use super::{created, success, ApiResult};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{bearer_token, constant_time_eq, CurrentUser};
use crate::errors::AppError;
use crate::models::{LoginRequest, TokenResponse, User, UserResponse, UserSchema};
use crate::AppState;

/// POST /api/auth/signup - Register a new account.
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<UserSchema>,
) -> ApiResult<UserResponse> {
    let body = body.normalized()?;

    if state.repo.get_user_by_email(&body.email).await?.is_some() {
        return Err(AppError::Conflict("Account already exists".to_string()));
    }

    let password_hash = hash_password(&body.password, state.config.bcrypt_cost).await?;
    let user = state.repo.create_user(&body, &password_hash).await?;

    created(UserResponse::from(&user))
}

/// POST /api/auth/login - Exchange email and password for a token pair.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<TokenResponse> {
    let user = state
        .repo
        .get_user_by_email(&body.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&body.password, &user.password_hash).await? {
        tracing::info!(user_id = %user.id, "Rejected login with wrong password");
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let tokens = issue_tokens(&state, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    success(tokens)
}

/// GET /api/auth/refresh_token - Rotate the token pair using the refresh token.
///
/// A refresh token that does not match the stored one revokes the stored token,
/// so a leaked token can be used at most until its owner refreshes again.
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<TokenResponse> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
    let email = state.tokens.decode_refresh_token(token)?;

    let user = state
        .repo
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".to_string()))?;

    let matches = user
        .refresh_token
        .as_deref()
        .is_some_and(|stored| constant_time_eq(stored, token));
    if !matches {
        tracing::warn!(user_id = %user.id, "Refresh token mismatch; revoking stored token");
        state.repo.update_token(&user.id, None).await?;
        return Err(AppError::Unauthorized("Invalid refresh token".to_string()));
    }

    success(issue_tokens(&state, &user).await?)
}

/// POST /api/auth/logout - Revoke the stored refresh token.
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<()> {
    state.repo.update_token(&user.id, None).await?;
    tracing::info!(user_id = %user.id, "User logged out");
    success(())
}

async fn issue_tokens(state: &AppState, user: &User) -> Result<TokenResponse, AppError> {
    let access_token = state.tokens.create_access_token(&user.email)?;
    let refresh_token = state.tokens.create_refresh_token(&user.email)?;
    state
        .repo
        .update_token(&user.id, Some(&refresh_token))
        .await?;
    Ok(TokenResponse::bearer(access_token, refresh_token))
}
