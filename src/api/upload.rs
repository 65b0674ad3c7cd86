//! Multipart upload parsing shared by the avatar and photo endpoints.

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;

use crate::errors::AppError;

/// An image received in a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Parsed multipart upload: the `file` field plus any text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

/// Read a multipart body, enforcing `max_bytes` on the `file` field while streaming.
pub async fn read_upload_form(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<UploadForm, AppError> {
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(format!("Upload exceeds {} bytes", max_bytes))
        } else {
            AppError::BadRequest(format!("Invalid multipart data: {}", e))
        }
    };

    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let mut data = Vec::new();
            while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                if data.len() + chunk.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "Upload exceeds {} bytes",
                        max_bytes
                    )));
                }
                data.extend_from_slice(&chunk);
            }

            form.file = Some(UploadedFile {
                file_name,
                content_type,
                data,
            });
        } else if !name.is_empty() {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

impl UploadForm {
    /// Take the `file` field, failing if it is missing or empty.
    pub fn require_file(&mut self) -> Result<UploadedFile, AppError> {
        match self.file.take() {
            Some(file) if !file.data.is_empty() => Ok(file),
            Some(_) => Err(AppError::Validation(
                "Uploaded file is empty".to_string(),
            )),
            None => Err(AppError::Validation(
                "No file field found in multipart request".to_string(),
            )),
        }
    }
}
