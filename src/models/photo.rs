//! Photo models.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Maximum number of tags attached to one photo.
pub const MAX_TAGS: usize = 5;
/// Maximum length of a single tag, in characters.
pub const MAX_TAG_LEN: usize = 25;
/// Maximum length of a description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// A photo uploaded by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub owner_id: String,
    pub owner_username: String,
    pub url: String,
    pub public_id: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Request body for updating a photo.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePhotoRequest {
    /// New description; an empty string clears it
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Query parameters for listing photos.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListQuery {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for PhotoListQuery {
    fn default() -> Self {
        Self {
            owner_id: None,
            tag: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> i64 {
    20
}

/// Normalize a tag list: trim, lowercase, drop empties and duplicates (keeping
/// the first occurrence), then enforce the count and length limits.
pub fn normalize_tags<I, S>(raw: I) -> Result<Vec<String>, AppError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(AppError::Validation(format!(
                "Tag '{}' exceeds {} characters",
                tag, MAX_TAG_LEN
            )));
        }
        tags.push(tag);
    }

    if tags.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "A photo can have at most {} tags",
            MAX_TAGS
        )));
    }

    Ok(tags)
}

/// Split a comma separated tag field from a multipart form.
pub fn parse_tag_field(field: &str) -> Result<Vec<String>, AppError> {
    normalize_tags(field.split(','))
}

/// Trim a description, mapping blank text to `None`.
pub fn normalize_description(description: Option<&str>) -> Result<Option<String>, AppError> {
    let Some(text) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::Validation(format!(
            "Description exceeds {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(Some(text.to_string()))
}
