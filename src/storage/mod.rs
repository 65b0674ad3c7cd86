//! Media storage for uploaded images.
//!
//! Two backends share one interface: Cloudinary when credentials are
//! configured, otherwise a directory on disk served under `/media`.

mod cloudinary;
mod local;

pub use cloudinary::CloudinaryStore;
pub use local::{LocalStore, MEDIA_ROUTE};

use crate::config::Config;
use crate::errors::AppError;

/// Folder for profile pictures.
pub const AVATAR_FOLDER: &str = "photoshare/avatars";
/// Folder for shared photos.
pub const PHOTO_FOLDER: &str = "photoshare/photos";

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    /// Publicly reachable URL of the original image
    pub url: String,
    /// Backend identifier used for transformations and deletion
    pub public_id: String,
    /// Backend revision of the object, if the backend versions objects
    pub version: Option<i64>,
}

/// Configured media backend.
#[derive(Debug, Clone)]
pub enum MediaStore {
    Cloudinary(CloudinaryStore),
    Local(LocalStore),
}

impl MediaStore {
    /// Pick the backend from configuration.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        match &config.cloudinary {
            Some(cloudinary) => {
                tracing::info!(cloud = %cloudinary.cloud_name, "Using Cloudinary media store");
                Ok(MediaStore::Cloudinary(CloudinaryStore::new(cloudinary.clone())?))
            }
            None => {
                tracing::info!(path = %config.media_path.display(), "Using local media store");
                Ok(MediaStore::Local(
                    LocalStore::new(config.media_path.clone(), &config.public_url).await?,
                ))
            }
        }
    }

    /// Store `data` as `{folder}/{name}`, replacing any previous object with that name.
    pub async fn upload(
        &self,
        folder: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredMedia, AppError> {
        let extension = image_extension(content_type)?;
        match self {
            MediaStore::Cloudinary(store) => store.upload(folder, name, data, content_type).await,
            MediaStore::Local(store) => store.upload(folder, name, extension, data).await,
        }
    }

    /// URL of a 250x250 cropped rendition suitable for avatars.
    pub fn avatar_url(&self, media: &StoredMedia) -> String {
        match self {
            MediaStore::Cloudinary(store) => store.avatar_url(media),
            MediaStore::Local(_) => media.url.clone(),
        }
    }

    /// Public id of an object previously stored as `url`, when it can be told apart.
    ///
    /// Cloudinary avatars keep a fixed public id and are overwritten in place, so
    /// only the local store reports one.
    pub fn public_id_from_url(&self, url: &str) -> Option<String> {
        match self {
            MediaStore::Cloudinary(_) => None,
            MediaStore::Local(store) => store.public_id_from_url(url).map(str::to_string),
        }
    }

    /// Remove a stored object. Missing objects are not an error.
    pub async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        match self {
            MediaStore::Cloudinary(store) => store.delete(public_id).await,
            MediaStore::Local(store) => store.delete(public_id).await,
        }
    }
}

/// Map an accepted image content type to a file extension.
pub fn image_extension(content_type: &str) -> Result<&'static str, AppError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        "image/bmp" => Ok("bmp"),
        "image/tiff" => Ok("tiff"),
        "image/heic" => Ok("heic"),
        _ => Err(AppError::UnsupportedMediaType(format!(
            "Content type {} is not an accepted image format",
            content_type
        ))),
    }
}
