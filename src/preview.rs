use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::s3::gateway::ObjectStore;

const MAX_IMAGE_PREVIEW_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const MAX_TEXT_PREVIEW_SIZE: u64 = 1024 * 1024; // 1MB, truncated beyond
const MAX_PDF_SIZE: u64 = 20 * 1024 * 1024; // 20MB

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PreviewContent {
    Text { content: String, truncated: bool },
    Image {
        base64: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Json { content: serde_json::Value },
    Pdf { base64: String },
    Unsupported { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    pub content_type: String,
    pub size: u64,
    pub data: PreviewContent,
}

/// Metadata shown in the file details dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    pub key: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_folder: bool,
}

/// Stored content type, or a guess from the key's extension when the backend
/// has none or only the generic octet-stream.
pub fn resolve_content_type(stored: Option<&str>, key: &str) -> String {
    match stored {
        Some(ct) if !ct.is_empty() && ct != OCTET_STREAM => ct.to_string(),
        _ => mime_guess::from_path(key)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string(),
    }
}

pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type == "application/pdf"
}

pub fn is_text_content_type(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || matches!(
            content_type,
            "application/json"
                | "application/javascript"
                | "application/typescript"
                | "application/xml"
                | "application/yaml"
                | "application/x-yaml"
                | "application/toml"
        )
}

pub fn is_image_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

pub async fn file_details(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<FileDetails> {
    let meta = store.get_object_metadata(bucket, key).await?;
    let trimmed = key.trim_end_matches('/');
    Ok(FileDetails {
        key: key.to_string(),
        name: trimmed.rsplit('/').next().unwrap_or(trimmed).to_string(),
        size: meta.size,
        content_type: resolve_content_type(meta.content_type.as_deref(), key),
        updated_at: meta.last_modified,
        is_folder: key.ends_with('/'),
    })
}

pub async fn get_preview(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<PreviewData> {
    let meta = store.get_object_metadata(bucket, key).await?;
    let size = meta.size;
    let content_type = resolve_content_type(meta.content_type.as_deref(), key);

    let unsupported = |message: String| PreviewData {
        content_type: content_type.clone(),
        size,
        data: PreviewContent::Unsupported { message },
    };

    if is_image_content_type(&content_type) {
        if size > MAX_IMAGE_PREVIEW_SIZE {
            return Ok(unsupported(format!("Image too large for preview ({} bytes)", size)));
        }
        let bytes = store.get_object_head(bucket, key, size).await?;
        return Ok(PreviewData {
            data: PreviewContent::Image {
                base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
                mime_type: content_type.clone(),
            },
            content_type,
            size,
        });
    }

    if is_pdf_content_type(&content_type) {
        if size > MAX_PDF_SIZE {
            return Ok(unsupported(format!("PDF too large for preview ({} bytes)", size)));
        }
        let bytes = store.get_object_head(bucket, key, size).await?;
        return Ok(PreviewData {
            data: PreviewContent::Pdf {
                base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            },
            content_type,
            size,
        });
    }

    if !is_text_content_type(&content_type) {
        return Ok(unsupported("This file type cannot be previewed".to_string()));
    }

    let truncated = size > MAX_TEXT_PREVIEW_SIZE;
    let bytes = store
        .get_object_head(bucket, key, size.min(MAX_TEXT_PREVIEW_SIZE))
        .await?;
    log::debug!("Previewing {} bytes of {}/{}", bytes.len(), bucket, key);

    // Truncated JSON would not parse, so it is shown as text
    let data = match (content_type.as_str(), truncated) {
        ("application/json", false) => match serde_json::from_slice(&bytes) {
            Ok(json) => PreviewContent::Json { content: json },
            Err(_) => PreviewContent::Text {
                content: String::from_utf8_lossy(&bytes).to_string(),
                truncated,
            },
        },
        _ => PreviewContent::Text {
            content: String::from_utf8_lossy(&bytes).to_string(),
            truncated,
        },
    };

    Ok(PreviewData {
        content_type,
        size,
        data,
    })
}
