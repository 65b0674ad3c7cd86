//! Database repository for CRUD operations.
//!
//! Uses prepared statements and conditional updates for data integrity.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{normalize_email, Photo, PhotoListQuery, Role, UpdatePhotoRequest, User, UserSchema};

/// Largest page returned by [`Repository::list_photos`].
pub const MAX_PAGE_SIZE: i64 = 100;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, avatar, refresh_token, role, created_at";

const PHOTO_SELECT: &str = r#"
    SELECT p.id, p.owner_id, u.username AS owner_username, p.url, p.public_id,
           p.description, p.tags, p.created_at, p.updated_at, p.version
    FROM photos p
    JOIN users u ON u.id = p.owner_id
"#;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Count registered users.
    pub async fn count_users(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(id) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Get a user by email. Emails are stored lowercased.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user by ID.
    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Create a new user. The first account ever created becomes an admin.
    ///
    /// The role is decided inside the INSERT so two concurrent signups on an
    /// empty table cannot both become admin.
    pub async fn create_user(
        &self,
        body: &UserSchema,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, created_at)
            SELECT ?, ?, ?, ?,
                   CASE WHEN (SELECT COUNT(id) FROM users) = 0 THEN ? ELSE ? END,
                   ?
            "#,
        )
        .bind(&id)
        .bind(&body.username)
        .bind(normalize_email(&body.email))
        .bind(password_hash)
        .bind(Role::Admin.as_str())
        .bind(Role::User.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let user = self
            .get_user_by_id(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", id)))?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "Created user");
        Ok(user)
    }

    /// Set or clear the stored refresh token for a user.
    pub async fn update_token(&self, user_id: &str, token: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ?")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    /// Set or clear the avatar URL of the user with this email.
    pub async fn update_avatar_url(&self, email: &str, url: Option<&str>) -> Result<User, AppError> {
        let result = sqlx::query("UPDATE users SET avatar = ? WHERE email = ?")
            .bind(url)
            .bind(normalize_email(email))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", email)));
        }

        self.get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", email)))
    }

    /// Change a user's role.
    pub async fn update_role(&self, user_id: &str, role: Role) -> Result<User, AppError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        self.get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    // ==================== PHOTO OPERATIONS ====================

    /// Insert a photo record for media that is already stored.
    pub async fn create_photo(
        &self,
        owner_id: &str,
        url: &str,
        public_id: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<Photo, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO photos (id, owner_id, url, public_id, description, tags, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)"
        )
        .bind(&id)
        .bind(owner_id)
        .bind(url)
        .bind(public_id)
        .bind(description)
        .bind(serde_json::to_string(tags)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_photo(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Photo {} vanished after insert", id)))
    }

    /// Get a photo by ID.
    pub async fn get_photo(&self, id: &str) -> Result<Option<Photo>, AppError> {
        let row = sqlx::query(&format!("{} WHERE p.id = ?", PHOTO_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(photo_from_row))
    }

    /// List photos newest first, optionally filtered by owner and tag.
    pub async fn list_photos(&self, query: &PhotoListQuery) -> Result<Vec<Photo>, AppError> {
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.max(0);
        let tag = query.tag.as_deref().map(|t| t.trim().to_lowercase());

        let rows = sqlx::query(&format!(
            r#"{}
            WHERE (?1 IS NULL OR p.owner_id = ?1)
              AND (?2 IS NULL OR EXISTS (SELECT 1 FROM json_each(p.tags) WHERE json_each.value = ?2))
            ORDER BY p.created_at DESC, p.id
            LIMIT ?3 OFFSET ?4"#,
            PHOTO_SELECT
        ))
        .bind(&query.owner_id)
        .bind(&tag)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    /// List every photo, used to rebuild the search index.
    pub async fn list_all_photos(&self) -> Result<Vec<Photo>, AppError> {
        let rows = sqlx::query(&format!("{} ORDER BY p.created_at", PHOTO_SELECT))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(photo_from_row).collect())
    }

    /// Update a photo's description and tags with optimistic concurrency control.
    ///
    /// `request.tags` and `request.description` must already be normalized.
    pub async fn update_photo(
        &self,
        id: &str,
        request: &UpdatePhotoRequest,
    ) -> Result<Photo, AppError> {
        let existing = self
            .get_photo(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Photo {} not found", id)))?;

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::VersionMismatch {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;
        // An empty description clears it; an absent one keeps the current text
        let description = match request.description.as_deref() {
            Some("") => None,
            Some(text) => Some(text.to_string()),
            None => existing.description.clone(),
        };
        let tags = request.tags.clone().unwrap_or(existing.tags.clone());

        // Conditional UPDATE with version check to prevent lost updates
        let result = sqlx::query(
            "UPDATE photos SET description = ?, tags = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?"
        )
        .bind(&description)
        .bind(serde_json::to_string(&tags)?)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            let current = self.get_photo(id).await?;
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|p| p.version).unwrap_or(0),
            });
        }

        Ok(Photo {
            description,
            tags,
            updated_at: now,
            version: new_version,
            ..existing
        })
    }

    /// Delete a photo record.
    pub async fn delete_photo(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Photo {} not found", id)));
        }
        Ok(())
    }
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let role: String = row.get("role");
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        avatar: row.get("avatar"),
        refresh_token: row.get("refresh_token"),
        role: Role::from_str(&role).unwrap_or(Role::User),
        created_at: row.get("created_at"),
    }
}

fn photo_from_row(row: &sqlx::sqlite::SqliteRow) -> Photo {
    let tags_str: String = row.get("tags");
    Photo {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        owner_username: row.get("owner_username"),
        url: row.get("url"),
        public_id: row.get("public_id"),
        description: row.get("description"),
        tags: parse_json_array(&tags_str),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
