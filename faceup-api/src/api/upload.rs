//! POST /upload-image
//!
//! Multipart upload of a single `image` field to object storage.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::{AppState, MAX_UPLOAD_BYTES};

const IMAGE_FIELD: &str = "image";

/// POST /upload-image response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub image_url: String,
    pub filename: String,
}

pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ApiError::Validation(format!(
                "Only image files are allowed (got '{}')",
                content_type
            )));
        }
        let original_name = field.file_name().map(str::to_string);

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        if bytes.is_empty() {
            return Err(ApiError::Validation("Image file is empty".to_string()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::Validation(format!(
                "Image exceeds {} MB limit",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        let filename = storage_filename(&content_type, original_name.as_deref());
        let path = format!("uploads/{}", filename);
        let image_url = state
            .image_store
            .upload(&path, &content_type, bytes.to_vec())
            .await?;

        return Ok(Json(UploadResponse {
            success: true,
            image_url,
            filename,
        }));
    }

    Err(ApiError::Validation("No image file provided".to_string()))
}

/// Random object name keeping a recognisable extension
fn storage_filename(content_type: &str, original_name: Option<&str>) -> String {
    let from_name = original_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    let ext = from_name.unwrap_or_else(|| match content_type {
        "image/png" => "png".to_string(),
        "image/webp" => "webp".to_string(),
        "image/gif" => "gif".to_string(),
        _ => "jpg".to_string(),
    });

    format!("{}.{}", Uuid::new_v4(), ext)
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload-image", post(upload_image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_filename_extension() {
        assert!(storage_filename("image/png", Some("Me.PNG")).ends_with(".png"));
        assert!(storage_filename("image/webp", None).ends_with(".webp"));
        assert!(storage_filename("image/jpeg", Some("noext")).ends_with(".jpg"));
        assert!(storage_filename("image/jpeg", Some("evil.../x")).ends_with(".jpg"));
    }
}
