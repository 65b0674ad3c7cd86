//! Cloudinary upload API client.
//!
//! Requests are signed with SHA-256 over the alphabetically sorted parameters
//! followed by the API secret; the product environment must be set to
//! SHA-256 signatures.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::StoredMedia;
use crate::config::CloudinaryConfig;
use crate::errors::AppError;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";
const AVATAR_TRANSFORMATION: &str = "c_fill,h_250,w_250";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    version: Option<i64>,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Signed client for one Cloudinary product environment.
#[derive(Debug, Clone)]
pub struct CloudinaryStore {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { config, client })
    }

    pub async fn upload(
        &self,
        folder: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredMedia, AppError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("folder", folder.to_string());
        params.insert("overwrite", "true".to_string());
        params.insert("public_id", name.to_string());
        params.insert("timestamp", timestamp);
        let signature = sign(&params, &self.config.api_secret);

        let file = Part::bytes(data)
            .file_name(name.to_string())
            .mime_str(content_type)?;
        let mut form = Form::new().part("file", file);
        for (key, value) in params {
            form = form.text(key, value);
        }
        form = form
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: UploadResponse = response.json().await?;
        info!(public_id = %body.public_id, version = ?body.version, "Uploaded media to Cloudinary");

        Ok(StoredMedia {
            url: body.secure_url,
            public_id: body.public_id,
            version: body.version,
        })
    }

    pub async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", timestamp);
        let signature = sign(&params, &self.config.api_secret);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: DestroyResponse = response.json().await?;
        match body.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => {
                warn!(public_id = %public_id, result = %other, "Unexpected destroy result");
                Err(AppError::Storage(format!(
                    "Cloudinary refused to delete {}: {}",
                    public_id, other
                )))
            }
        }
    }

    pub fn avatar_url(&self, media: &StoredMedia) -> String {
        delivery_url(&self.config.cloud_name, AVATAR_TRANSFORMATION, media)
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", API_BASE, self.config.cloud_name, action)
    }
}

fn delivery_url(cloud_name: &str, transformation: &str, media: &StoredMedia) -> String {
    let version = media
        .version
        .map(|v| format!("v{}/", v))
        .unwrap_or_default();
    format!(
        "{}/{}/image/upload/{}/{}{}",
        DELIVERY_BASE, cloud_name, transformation, version, media.public_id
    )
}

/// SHA-256 hex digest of `k1=v1&k2=v2...` (keys sorted) with the secret appended.
fn sign(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

async fn api_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error.message,
        Err(_) => "no error message".to_string(),
    };
    warn!(status = %status, message = %message, "Cloudinary request failed");
    AppError::Storage(format!("Cloudinary returned {}: {}", status, message))
}
