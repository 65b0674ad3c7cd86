//! Account endpoints.

use axum::{
    extract::{Multipart, Path, State},
    Json,
};

use super::{read_upload_form, success, ApiResult};
use crate::auth::{require_role, CurrentUser};
use crate::errors::AppError;
use crate::models::{Role, UpdateRoleRequest, UserResponse};
use crate::storage::AVATAR_FOLDER;
use crate::AppState;

/// GET /api/users/me - The authenticated account.
pub async fn get_me(CurrentUser(user): CurrentUser) -> ApiResult<UserResponse> {
    success(UserResponse::from(&user))
}

/// GET /api/users/count - Number of registered accounts.
pub async fn count_users(State(state): State<AppState>) -> ApiResult<i64> {
    success(state.repo.count_users().await?)
}

/// PATCH /api/users/avatar - Replace the avatar with an uploaded image.
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<UserResponse> {
    let mut form = read_upload_form(multipart, state.config.max_upload_bytes).await?;
    let file = form.require_file()?;

    tracing::info!(
        user_id = %user.id,
        file_name = ?file.file_name,
        size = file.data.len(),
        "Received avatar upload"
    );

    let stored = state
        .storage
        .upload(
            AVATAR_FOLDER,
            &format!("avatar_{}", user.id),
            file.data,
            &file.content_type,
        )
        .await?;
    let avatar_url = state.storage.avatar_url(&stored);

    let updated = state
        .repo
        .update_avatar_url(&user.email, Some(&avatar_url))
        .await?;

    // A new extension means a new local file; drop the one it replaces
    let previous = user
        .avatar
        .as_deref()
        .and_then(|url| state.storage.public_id_from_url(url))
        .filter(|public_id| *public_id != stored.public_id);
    if let Some(public_id) = previous {
        if let Err(e) = state.storage.delete(&public_id).await {
            tracing::warn!("Failed to delete previous avatar {}: {}", public_id, e);
        }
    }

    success(UserResponse::from(&updated))
}

/// PATCH /api/users/:id/role - Change an account's role (admins only).
pub async fn update_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<UserResponse> {
    require_role(&user, &[Role::Admin])?;

    if id == user.id {
        return Err(AppError::Validation(
            "Admins cannot change their own role".to_string(),
        ));
    }

    let updated = state.repo.update_role(&id, request.role).await?;
    tracing::info!(
        admin_id = %user.id,
        user_id = %updated.id,
        role = updated.role.as_str(),
        "Changed user role"
    );

    success(UserResponse::from(&updated))
}
