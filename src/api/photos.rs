//! Photo API endpoints.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};

use super::{created, read_upload_form, success, ApiResult};
use crate::auth::{require_role, CurrentUser};
use crate::errors::AppError;
use crate::models::{
    normalize_description, normalize_tags, parse_tag_field, Photo, PhotoListQuery, Role,
    UpdatePhotoRequest, User,
};
use crate::storage::{image_extension, PHOTO_FOLDER};
use crate::AppState;

/// POST /api/photos - Upload a photo with optional description and tags.
pub async fn upload_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<Photo> {
    let mut form = read_upload_form(multipart, state.config.max_upload_bytes).await?;
    let file = form.require_file()?;

    // Validate everything before touching the media store
    image_extension(&file.content_type)?;
    let description =
        normalize_description(form.fields.get("description").map(String::as_str))?;
    let tags = match form.fields.get("tags") {
        Some(field) => parse_tag_field(field)?,
        None => Vec::new(),
    };

    tracing::info!(
        user_id = %user.id,
        file_name = ?file.file_name,
        size = file.data.len(),
        "Received photo upload"
    );

    let name = uuid::Uuid::new_v4().simple().to_string();
    let stored = state
        .storage
        .upload(PHOTO_FOLDER, &name, file.data, &file.content_type)
        .await?;

    let photo = match state
        .repo
        .create_photo(
            &user.id,
            &stored.url,
            &stored.public_id,
            description.as_deref(),
            &tags,
        )
        .await
    {
        Ok(photo) => photo,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&stored.public_id).await {
                tracing::warn!("Failed to remove orphaned media {}: {}", stored.public_id, cleanup);
            }
            return Err(e);
        }
    };

    if let Err(e) = state.search.index_photo(&photo).await {
        tracing::warn!("Failed to index photo: {}", e);
    }

    created(photo)
}

/// GET /api/photos - List photos, newest first.
pub async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotoListQuery>,
) -> ApiResult<Vec<Photo>> {
    success(state.repo.list_photos(&query).await?)
}

/// GET /api/photos/:id - Get a single photo.
pub async fn get_photo(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Photo> {
    match state.repo.get_photo(&id).await? {
        Some(photo) => success(photo),
        None => Err(AppError::NotFound(format!("Photo {} not found", id))),
    }
}

/// PUT /api/photos/:id - Update description and tags.
///
/// Allowed for the owner, moderators and admins. A blank description clears it.
pub async fn update_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdatePhotoRequest>,
) -> ApiResult<Photo> {
    let existing = find_photo(&state, &id).await?;
    if existing.owner_id != user.id {
        require_role(&user, &[Role::Admin, Role::Moderator])?;
    }

    let request = UpdatePhotoRequest {
        description: request
            .description
            .as_deref()
            .map(|text| normalize_description(Some(text)).map(Option::unwrap_or_default))
            .transpose()?,
        tags: request.tags.map(normalize_tags).transpose()?,
        expected_version: request.expected_version,
    };

    let photo = state.repo.update_photo(&id, &request).await?;

    // Re-index the updated photo
    if let Err(e) = state.search.index_photo(&photo).await {
        tracing::warn!("Failed to re-index photo: {}", e);
    }

    success(photo)
}

/// DELETE /api/photos/:id - Delete a photo and its media.
///
/// Allowed for the owner and admins.
pub async fn delete_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let existing = find_photo(&state, &id).await?;
    ensure_can_delete(&user, &existing)?;

    state.repo.delete_photo(&id).await?;

    if let Err(e) = state.storage.delete(&existing.public_id).await {
        tracing::warn!("Failed to delete media {}: {}", existing.public_id, e);
    }

    // Remove from search index
    if let Err(e) = state.search.remove_photo(&id).await {
        tracing::warn!("Failed to remove photo from index: {}", e);
    }

    tracing::info!(user_id = %user.id, photo_id = %id, "Deleted photo");
    success(())
}

async fn find_photo(state: &AppState, id: &str) -> Result<Photo, AppError> {
    state
        .repo
        .get_photo(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Photo {} not found", id)))
}

fn ensure_can_delete(user: &User, photo: &Photo) -> Result<(), AppError> {
    if photo.owner_id == user.id {
        return Ok(());
    }
    require_role(user, &[Role::Admin])
}
