//! Filesystem media store.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::StoredMedia;
use crate::errors::AppError;

/// URL prefix under which the router serves the media directory.
pub const MEDIA_ROUTE: &str = "/media";

/// Stores images below a root directory and serves them over HTTP.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    base_url: String,
}

impl LocalStore {
    /// Create the store, creating the root directory if needed.
    pub async fn new(root: PathBuf, public_url: &str) -> Result<Self, AppError> {
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            base_url: format!("{}{}", public_url.trim_end_matches('/'), MEDIA_ROUTE),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn upload(
        &self,
        folder: &str,
        name: &str,
        extension: &str,
        data: Vec<u8>,
    ) -> Result<StoredMedia, AppError> {
        let public_id = format!("{}/{}.{}", folder.trim_matches('/'), name, extension);
        let path = self.resolve(&public_id)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file and rename so readers never see a partial image
        let tmp_path = path.with_extension(format!("{}.tmp", extension));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &path).await?;

        info!(public_id = %public_id, size = data.len(), "Stored media locally");

        Ok(StoredMedia {
            url: format!("{}/{}", self.base_url, public_id),
            public_id,
            version: None,
        })
    }

    pub async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        let path = self.resolve(public_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(public_id = %public_id, "Deleted local media");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Recover the public id from a URL this store produced.
    pub fn public_id_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.base_url.as_str())?
            .strip_prefix('/')
            .filter(|id| !id.is_empty())
    }

    /// Map a public id to a path inside the root, refusing anything that could escape it.
    fn resolve(&self, public_id: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(public_id);
        let safe = !public_id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AppError::BadRequest(format!(
                "Invalid media identifier: {}",
                public_id
            )));
        }
        Ok(self.root.join(relative))
    }
}
