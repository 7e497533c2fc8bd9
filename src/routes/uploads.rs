use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::AuthUser;
use crate::state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpeg", "jpg", "png", "gif", "webp", "mp4", "mov", "avi", "mp3", "wav", "pdf", "doc", "docx",
    "txt",
];

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub url: String,
    pub file_name: String,
    pub original_name: String,
    pub size: i64,
    pub mime: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub file: UploadedFile,
}

fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Allow-list check on the file extension, with the declared media type
/// as a second gate when the client sends one.
pub(crate) fn is_allowed(file_name: &str, content_type: Option<&str>) -> bool {
    let ext_ok = extension(file_name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    if !ext_ok {
        return false;
    }
    match content_type {
        Some(ct) => {
            ct.starts_with("image/")
                || ct.starts_with("video/")
                || ct.starts_with("audio/")
                || ct.starts_with("text/")
                || ct == "application/pdf"
                || ct == "application/msword"
                || ct == "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                || ct == "application/octet-stream"
        }
        None => true,
    }
}

/// Accept a single `file` field, store it under a collision-free name
/// and hand back the public URL for use in a file message.
pub async fn upload_file(
    State(state): State<AppState>,
    _user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        if !is_allowed(&original_name, content_type.as_deref()) {
            return Err(AppError::BadRequest("File type not allowed".into()));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?;
        if data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".into()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::BadRequest("File exceeds the 10MB limit".into()));
        }

        // is_allowed guarantees the extension exists
        let ext = extension(&original_name).unwrap_or_default();
        let stored_name = format!(
            "{}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>(),
            ext
        );
        let path = state.config.upload_dir.join(&stored_name);
        tokio::fs::write(&path, &data).await.map_err(|e| {
            tracing::error!(error = %e, path = %path.display(), "failed to persist upload");
            AppError::Internal
        })?;

        tracing::info!(file = %stored_name, size = data.len(), "file uploaded");

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully",
            file: UploadedFile {
                url: format!("/uploads/{stored_name}"),
                file_name: stored_name,
                original_name,
                size: data.len() as i64,
                mime: content_type,
            },
        }));
    }

    Err(AppError::BadRequest("No file uploaded".into()))
}
